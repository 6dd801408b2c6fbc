use crate::error::PushDeliveryError;
use crate::types::push::PushSubscription;

/// Sends one encrypted message to one push endpoint.
pub trait PushSender: Clone + Send + Sync + 'static {
    type Fut<'a>: Future<Output = Result<(), PushDeliveryError>> + Send + 'a
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a PushSubscription, payload: &'a str) -> Self::Fut<'a>;
}
