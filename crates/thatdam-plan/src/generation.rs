//! Plan generation hash.
//!
//! The node records the generation of the last plan it applied and skips
//! re-applying an identical plan. Env maps are ordered so the JSON form is
//! canonical.

use sha2::Digest;
use sha2::Sha256;

use crate::model::DesiredPlan;

/// Hex SHA-256 of the plan's JSON encoding.
pub fn plan_generation(plan: &DesiredPlan) -> String {
    let json = serde_json::to_vec(plan).unwrap_or_default();
    hex::encode(Sha256::digest(&json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppSpec;

    #[test]
    fn test_generation_is_stable_across_env_insert_order() {
        let mut a = AppSpec::new("api");
        a.env.insert("A".into(), "1".into());
        a.env.insert("B".into(), "2".into());
        let mut b = AppSpec::new("api");
        b.env.insert("B".into(), "2".into());
        b.env.insert("A".into(), "1".into());

        let pa = DesiredPlan::new(1, "n", vec![a]);
        let pb = DesiredPlan::new(1, "n", vec![b]);
        assert_eq!(plan_generation(&pa), plan_generation(&pb));
        assert_eq!(plan_generation(&pa).len(), 64);
    }

    #[test]
    fn test_generation_changes_with_content() {
        let p1 = DesiredPlan::new(1, "n", vec![AppSpec::new("api")]);
        let p2 = DesiredPlan::new(2, "n", vec![AppSpec::new("api")]);
        assert_ne!(plan_generation(&p1), plan_generation(&p2));
    }
}
