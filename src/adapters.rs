use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::error::PushDeliveryError;
use crate::ports;
use crate::types::push::{PushSubscription, VapidConfig};

#[derive(Debug, Clone, Copy, Default)]
pub struct UtcTimeProvider;

impl ports::TimeProvider for UtcTimeProvider {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PushOptions {
    pub ttl: u32,
    pub timeout: Duration,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            ttl: 24 * 60 * 60,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct WebPushSender {
    vapid: VapidConfig,
    options: PushOptions,
    client: Arc<web_push::WebPushClient>,
}

impl WebPushSender {
    pub fn new(vapid: VapidConfig, options: PushOptions) -> Result<Self, web_push::WebPushError> {
        let client = web_push::WebPushClient::new()?;
        Ok(Self {
            vapid,
            options,
            client: Arc::new(client),
        })
    }

    async fn send_message(
        &self,
        subscription: &PushSubscription,
        payload: &str,
    ) -> Result<(), web_push::WebPushError> {
        let subscription_info = web_push::SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.p256dh.clone(),
            subscription.auth.clone(),
        );
        let mut builder = web_push::WebPushMessageBuilder::new(&subscription_info)?;
        builder.set_payload(web_push::ContentEncoding::Aes128Gcm, payload.as_bytes());
        builder.set_ttl(self.options.ttl);
        let mut signature_builder = web_push::VapidSignatureBuilder::from_base64(
            &self.vapid.private_key,
            web_push::URL_SAFE_NO_PAD,
            &subscription_info,
        )?;
        signature_builder.add_claim("sub", self.vapid.subject.as_str());
        builder.set_vapid_signature(signature_builder.build()?);
        self.client.send(builder.build()?).await
    }
}

impl ports::PushSender for WebPushSender {
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<(), PushDeliveryError>> + Send + 'a>>
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a PushSubscription, payload: &'a str) -> Self::Fut<'a> {
        Box::pin(async move {
            match tokio::time::timeout(
                self.options.timeout,
                self.send_message(subscription, payload),
            )
            .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(classify_web_push_error(err)),
                Err(_) => Err(PushDeliveryError::Transient(format!(
                    "timed out after {}s",
                    self.options.timeout.as_secs()
                ))),
            }
        })
    }
}

/// 404 and 410 from the push service mean the registration is dead.
fn classify_web_push_error(err: web_push::WebPushError) -> PushDeliveryError {
    match err {
        web_push::WebPushError::EndpointNotFound { .. } => PushDeliveryError::Gone { status: 404 },
        web_push::WebPushError::EndpointNotValid { .. } => PushDeliveryError::Gone { status: 410 },
        other => PushDeliveryError::Transient(other.to_string()),
    }
}
