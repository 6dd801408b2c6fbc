use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::ports::PushSubscriptionStore;
use crate::types::push::PushSubscription;

type Records = BTreeMap<String, Vec<PushSubscription>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscriptionFile {
    #[serde(default)]
    subscriptions: Vec<StoredSubscription>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSubscription {
    user: String,
    endpoint: String,
    p256dh: String,
    auth: String,
}

/// Push subscriptions held in memory and, when a path is given, mirrored to
/// a TOML file after every change.
#[derive(Debug, Default)]
pub struct LocalSubscriptionStore {
    path: Option<PathBuf>,
    records: Mutex<Records>,
}

impl LocalSubscriptionStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads `path` if it exists; a missing file starts an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(contents) => decode(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Records::new(),
            Err(err) => return Err(err.into()),
        };
        let count: usize = records.values().map(Vec::len).sum();
        tracing::info!(path = %path.display(), count, "loaded push subscriptions");
        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    async fn persist(&self, records: &Records) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let contents = encode(records)?;
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn insert(&self, user: &str, subscription: PushSubscription) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        let existing = records.entry(user.to_string()).or_default();
        if existing
            .iter()
            .any(|record| record.endpoint == subscription.endpoint)
        {
            return Ok(false);
        }
        let endpoint = subscription.endpoint.clone();
        existing.push(subscription);

        if let Err(err) = self.persist(&records).await {
            remove_endpoint(&mut records, user, &endpoint);
            return Err(err);
        }
        Ok(true)
    }

    async fn remove(&self, user: &str, endpoint: &str) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        let Some(removed) = remove_endpoint(&mut records, user, endpoint) else {
            return Ok(false);
        };

        if let Err(err) = self.persist(&records).await {
            records.entry(user.to_string()).or_default().push(removed);
            return Err(err);
        }
        Ok(true)
    }
}

impl PushSubscriptionStore for LocalSubscriptionStore {
    type ListFut<'a>
        = Pin<Box<dyn Future<Output = Result<Vec<PushSubscription>, StoreError>> + Send + 'a>>
    where
        Self: 'a;
    type WriteFut<'a>
        = Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + 'a>>
    where
        Self: 'a;

    fn get_all<'a>(&'a self, user: &'a str) -> Self::ListFut<'a> {
        Box::pin(async move {
            let records = self.records.lock().await;
            Ok(records.get(user).cloned().unwrap_or_default())
        })
    }

    fn upsert<'a>(&'a self, user: &'a str, subscription: PushSubscription) -> Self::WriteFut<'a> {
        Box::pin(self.insert(user, subscription))
    }

    fn delete<'a>(&'a self, user: &'a str, endpoint: &'a str) -> Self::WriteFut<'a> {
        Box::pin(self.remove(user, endpoint))
    }
}

fn remove_endpoint(records: &mut Records, user: &str, endpoint: &str) -> Option<PushSubscription> {
    let existing = records.get_mut(user)?;
    let index = existing
        .iter()
        .position(|record| record.endpoint == endpoint)?;
    let removed = existing.remove(index);
    if existing.is_empty() {
        records.remove(user);
    }
    Some(removed)
}

fn decode(contents: &str) -> Result<Records, StoreError> {
    let file: SubscriptionFile = toml::from_str(contents)?;
    let mut records = Records::new();
    for stored in file.subscriptions {
        let existing = records.entry(stored.user).or_default();
        if existing.iter().any(|record| record.endpoint == stored.endpoint) {
            continue;
        }
        existing.push(PushSubscription {
            endpoint: stored.endpoint,
            p256dh: stored.p256dh,
            auth: stored.auth,
        });
    }
    Ok(records)
}

fn encode(records: &Records) -> Result<String, StoreError> {
    let subscriptions = records
        .iter()
        .flat_map(|(user, subscriptions)| {
            subscriptions.iter().map(move |subscription| StoredSubscription {
                user: user.clone(),
                endpoint: subscription.endpoint.clone(),
                p256dh: subscription.p256dh.clone(),
                auth: subscription.auth.clone(),
            })
        })
        .collect();
    Ok(toml::to_string(&SubscriptionFile { subscriptions })?)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
