use crate::adapters::{PushOptions, WebPushSender};
use crate::config;

pub mod store;
pub(crate) mod vapid;

pub use store::LocalSubscriptionStore;
pub(crate) use vapid::{VapidConfigStatus, load_vapid_config};
pub use vapid::VapidCredentials;

/// Builds the push sender, or `None` when push is not (correctly) configured.
pub fn build_sender(config: &config::AppConfig) -> Option<WebPushSender> {
    let vapid = match load_vapid_config(config) {
        VapidConfigStatus::Ready(vapid) => vapid,
        VapidConfigStatus::Incomplete => {
            tracing::warn!("push notifications disabled: incomplete VAPID configuration");
            return None;
        }
        VapidConfigStatus::Invalid(reason) => {
            tracing::warn!(reason, "push notifications disabled: invalid VAPID configuration");
            return None;
        }
        VapidConfigStatus::Missing => {
            tracing::info!("push notifications disabled: no VAPID configuration");
            return None;
        }
    };

    let options = PushOptions {
        ttl: config.push_ttl,
        timeout: config.push_timeout,
    };
    match WebPushSender::new(vapid, options) {
        Ok(sender) => Some(sender),
        Err(err) => {
            tracing::warn!(error = %err, "push notifications disabled: failed to init web-push");
            None
        }
    }
}
