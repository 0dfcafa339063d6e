use snafu::Snafu;

/// Errors raised by the claim store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClaimError {
    /// The store already holds its maximum number of claims.
    #[snafu(display("claim store full: {count} claims held, maximum is {max}"))]
    CapacityExceeded { count: usize, max: usize },
}
