use bardly_types::api::QuotaStatus;
use bardly_types::models::SubscriptionTier;

/// Tokens a free-tier user may consume before the relay refuses new turns.
pub const DEFAULT_FREE_TOKEN_LIMIT: i64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub free_token_limit: i64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            free_token_limit: DEFAULT_FREE_TOKEN_LIMIT,
        }
    }
}

impl QuotaPolicy {
    pub fn new(free_token_limit: i64) -> Self {
        Self { free_token_limit }
    }

    /// Reaching the limit exactly already blocks. Paid tiers never block.
    pub fn is_exhausted(&self, token_usage: i64, tier: SubscriptionTier) -> bool {
        !tier.is_paid() && token_usage >= self.free_token_limit
    }

    pub fn status(&self, token_usage: i64, tier: SubscriptionTier) -> QuotaStatus {
        QuotaStatus {
            limit: self.free_token_limit,
            remaining: (self.free_token_limit - token_usage).max(0),
            blocked: self.is_exhausted(token_usage, tier),
        }
    }
}
