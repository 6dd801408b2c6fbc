use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub private_key: String,
    pub public_key: String,
    pub subject: String,
}

/// One browser/device registration for Web Push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

impl PushSubscription {
    pub(crate) fn is_complete(&self) -> bool {
        !self.endpoint.trim().is_empty()
            && !self.p256dh.trim().is_empty()
            && !self.auth.trim().is_empty()
    }
}
