use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subscription store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid subscription file: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("failed to encode subscriptions: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Outcome of a single push attempt that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushDeliveryError {
    /// The push service no longer knows the endpoint.
    #[error("push endpoint is gone (status {status})")]
    Gone { status: u16 },

    #[error("push delivery failed: {0}")]
    Transient(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("push notifications are not configured")]
    PushNotConfigured,

    #[error("invalid push subscription: {0}")]
    InvalidSubscription(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid auth configuration: {0}")]
    Auth(#[from] crate::auth::AuthError),

    #[error("failed to open subscription store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind address: {0}")]
    Bind(#[source] std::io::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
