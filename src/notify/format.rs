use time::OffsetDateTime;

use crate::types::notification::{DEFAULT_KIND, DEFAULT_TITLE, Notification, RawNotification};

/// Fills every missing field so downstream channels always see the same shape.
pub fn format(raw: RawNotification, now: OffsetDateTime) -> Notification {
    Notification {
        id: non_blank(raw.id).unwrap_or_else(|| timestamp_id(now)),
        title: raw.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        message: raw.message.unwrap_or_default(),
        kind: non_blank(raw.kind).unwrap_or_else(|| DEFAULT_KIND.to_string()),
        link: raw.link,
        route: raw.route,
        timestamp: now,
        data: raw.data,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn timestamp_id(now: OffsetDateTime) -> String {
    (now.unix_timestamp_nanos() / 1_000_000).to_string()
}
