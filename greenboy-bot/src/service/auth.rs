//! Operator authorization

use std::collections::BTreeSet;

use greenboy_core::domain::monitor::SubscriberId;

/// Allowlist of chat users trusted to operate the bot
///
/// An empty allowlist authorizes everyone.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    allowed: BTreeSet<SubscriberId>,
}

impl Authorizer {
    pub fn new(allowed: impl IntoIterator<Item = SubscriberId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn is_authorized(&self, user: SubscriberId) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&user)
    }

    pub fn allows_everyone(&self) -> bool {
        self.allowed.is_empty()
    }
}
