//! Desired-state reconciliation for the platform's backing services.
//!
//! A [`Profile`] declares buckets, broker topology and vector classes. The
//! [`Reconciler`] converges the world toward it through three ports:
//! [`ObjectStorage`], [`EventBus`] and [`VectorIndex`]. Every `ensure_*`
//! call is idempotent, and errors are collected rather than short-circuited
//! so one bad bucket does not block the broker.
//!
//! [`tenancy::plan_for`] maps a runtime profile and cluster size to the
//! storage and queue shape a tenant should get.

pub mod adapters;
pub mod error;
pub mod ports;
pub mod profile;
pub mod reconciler;
pub mod tenancy;

pub use error::PortError;
pub use error::ReconcileError;
pub use ports::Binding;
pub use ports::ClassSpec;
pub use ports::EventBus;
pub use ports::Exchange;
pub use ports::LifecycleRule;
pub use ports::ObjectStorage;
pub use ports::PropertySpec;
pub use ports::Queue;
pub use ports::Subscription;
pub use ports::VectorIndex;
pub use ports::VectorMeta;
pub use profile::BrokerSpec;
pub use profile::IndexSpec;
pub use profile::Profile;
pub use profile::StorageBucket;
pub use reconciler::BrokerReconciler;
pub use reconciler::IndexReconciler;
pub use reconciler::Reconciler;
pub use reconciler::StorageReconciler;
pub use tenancy::plan_for;
pub use tenancy::ClusterState;
pub use tenancy::TenancyPlan;
pub use tenancy::TenancyProfile;
