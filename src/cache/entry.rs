use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A stored value together with the bookkeeping needed for expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub stored_at: DateTime<Utc>,
    #[serde(default, rename = "ttlMs", with = "ttl_millis")]
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    pub fn new(value: serde_json::Value, stored_at: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            stored_at,
            ttl,
        }
    }

    /// Instant after which the entry stops being live, if it ever does.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = self.ttl?;
        // A ttl too large for chrono never expires in practice
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.stored_at.checked_add_signed(ttl))
    }

    /// Live iff there is no ttl or `now - stored_at < ttl`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

mod ttl_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match ttl {
            Some(ttl) => serializer.serialize_some(&(ttl.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_entry_without_ttl_is_always_live() {
        let entry = CacheEntry::new(json!(1), at(0), None);
        assert!(entry.is_live(at(10_000_000)));
        assert_eq!(entry.expires_at(), None);
    }

    #[test]
    fn test_entry_expires_exactly_at_ttl() {
        let entry = CacheEntry::new(json!("v"), at(0), Some(Duration::from_secs(60)));
        assert!(entry.is_live(at(59)));
        assert!(!entry.is_live(at(60)));
        assert!(!entry.is_live(at(61)));
    }

    #[test]
    fn test_entry_serializes_ttl_as_millis() {
        let entry = CacheEntry::new(json!({"a": 1}), at(0), Some(Duration::from_millis(1500)));
        let encoded = serde_json::to_value(&entry).unwrap();
        assert_eq!(encoded["ttlMs"], json!(1500));

        let decoded: CacheEntry = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_entry_missing_ttl_field_decodes_as_none() {
        let decoded: CacheEntry = serde_json::from_value(json!({
            "value": [1, 2],
            "storedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(decoded.ttl, None);
    }
}
