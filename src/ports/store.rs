use crate::error::StoreError;
use crate::types::push::PushSubscription;

/// Durable per-user push registrations.
///
/// Every mutation is a single operation keyed by `(user, endpoint)`, so a
/// subscribe from one device never races a prune for another.
pub trait PushSubscriptionStore: Send + Sync + 'static {
    type ListFut<'a>: Future<Output = Result<Vec<PushSubscription>, StoreError>> + Send + 'a
    where
        Self: 'a;
    type WriteFut<'a>: Future<Output = Result<bool, StoreError>> + Send + 'a
    where
        Self: 'a;

    fn get_all<'a>(&'a self, user: &'a str) -> Self::ListFut<'a>;

    /// Inserts the record unless the user already has one for the same
    /// endpoint. Resolves to `true` when something was inserted.
    fn upsert<'a>(&'a self, user: &'a str, subscription: PushSubscription) -> Self::WriteFut<'a>;

    /// Resolves to `true` when a record was removed.
    fn delete<'a>(&'a self, user: &'a str, endpoint: &'a str) -> Self::WriteFut<'a>;
}
