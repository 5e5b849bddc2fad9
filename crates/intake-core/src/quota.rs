//! Upload quota decisions
//!
//! The server reads the subscription and usage count from its store; this
//! module only decides. A user without a subscription row falls back to the
//! free plan.

use serde::{Deserialize, Serialize};

/// A purchasable plan and its upload allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub name: &'static str,
    pub upload_limit: u32,
}

/// Plan catalog, cheapest first
pub const PLANS: &[Plan] = &[
    Plan {
        name: "free",
        upload_limit: 10,
    },
    Plan {
        name: "basic",
        upload_limit: 50,
    },
    Plan {
        name: "premium",
        upload_limit: 200,
    },
    Plan {
        name: "enterprise",
        upload_limit: 500,
    },
];

/// Upload limit for users that have no subscription record yet
pub const DEFAULT_UPLOAD_LIMIT: u32 = 5;

pub fn plan(name: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Read-only view of a user's subscription and usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub plan_name: String,
    pub upload_limit: u32,
    pub uploads_used: u32,
}

/// Outcome of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum QuotaDecision {
    Allowed { remaining: u32 },
    Exhausted { limit: u32 },
}

impl SubscriptionSnapshot {
    /// Snapshot for a user with no subscription row
    pub fn free(upload_limit: u32, uploads_used: u32) -> Self {
        Self {
            plan_name: "free".to_string(),
            upload_limit,
            uploads_used,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.upload_limit.saturating_sub(self.uploads_used)
    }

    pub fn check(&self) -> QuotaDecision {
        match self.remaining() {
            0 => QuotaDecision::Exhausted {
                limit: self.upload_limit,
            },
            remaining => QuotaDecision::Allowed { remaining },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plan_catalog() {
        assert_eq!(plan("premium").map(|p| p.upload_limit), Some(200));
        assert_eq!(plan("Enterprise").map(|p| p.upload_limit), Some(500));
        assert_eq!(plan("gold"), None);
    }

    #[test]
    fn test_exhausted_at_limit() {
        let snapshot = SubscriptionSnapshot::free(DEFAULT_UPLOAD_LIMIT, 5);
        assert_eq!(snapshot.remaining(), 0);
        assert_eq!(snapshot.check(), QuotaDecision::Exhausted { limit: 5 });
    }

    #[test]
    fn test_over_limit_saturates() {
        let snapshot = SubscriptionSnapshot {
            plan_name: "basic".to_string(),
            upload_limit: 50,
            uploads_used: 73,
        };
        assert_eq!(snapshot.remaining(), 0);
    }

    proptest! {
        #[test]
        fn allowed_iff_under_limit(limit in 0u32..1000, used in 0u32..1000) {
            let snapshot = SubscriptionSnapshot::free(limit, used);
            match snapshot.check() {
                QuotaDecision::Allowed { remaining } => {
                    prop_assert!(used < limit);
                    prop_assert_eq!(remaining, limit - used);
                }
                QuotaDecision::Exhausted { limit: l } => {
                    prop_assert!(used >= limit);
                    prop_assert_eq!(l, limit);
                }
            }
        }
    }
}
