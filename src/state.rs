use crate::adapters::{UtcTimeProvider, WebPushSender};
use crate::auth::IdentityVerifier;
use crate::config::AppConfig;
use crate::notify::Notifier;
use crate::push::LocalSubscriptionStore;

use std::sync::Arc;

pub type AppNotifier = Notifier<LocalSubscriptionStore, WebPushSender, UtcTimeProvider>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub identity: Option<IdentityVerifier>,
    pub notifier: Arc<AppNotifier>,
}
