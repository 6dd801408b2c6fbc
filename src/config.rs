use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub subscriptions_path: Option<PathBuf>,
    pub replay_capacity: usize,
    pub stream_buffer: usize,
    pub push_timeout: Duration,
    /// Seconds the push service keeps an undelivered message.
    pub push_ttl: u32,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: Option<String>,
    pub auth: Option<AuthConfig>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub key: String,
    pub cookie_name: String,
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "PadelClub".to_string(),
            subscriptions_path: None,
            replay_capacity: crate::notify::DEFAULT_REPLAY_CAPACITY,
            stream_buffer: crate::notify::DEFAULT_STREAM_BUFFER,
            push_timeout: Duration::from_secs(10),
            push_ttl: 24 * 60 * 60,
            vapid_private_key: None,
            vapid_public_key: None,
            vapid_subject: None,
            auth: None,
        }
    }
}
