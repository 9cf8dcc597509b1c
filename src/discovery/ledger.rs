use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::core::{ApplicationTag, DeviceId, ObjectId};

/// Key of one subscription
pub type SubscriptionKey = (DeviceId, ObjectId);

/// State of one change-of-value subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionEntry {
    /// Time the remote end stops sending notifications
    pub expires_at: SystemTime,
    /// Tag of the last present-value seen
    pub tag: Option<ApplicationTag>,
}

impl SubscriptionEntry {
    fn expired() -> Self {
        SubscriptionEntry {
            expires_at: UNIX_EPOCH,
            tag: None,
        }
    }
}

/// Ledger of monitored objects
///
/// Seeded entries start out expired so the first renewal sweep subscribes
/// them again should the initial request get lost. Keys are kept ordered,
/// which makes renewal order deterministic.
#[derive(Debug, Default)]
pub struct SubscriptionLedger {
    entries: BTreeMap<SubscriptionKey, SubscriptionEntry>,
}

impl SubscriptionLedger {
    /// Creates an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an expired entry unless one already exists
    ///
    /// Returns whether an entry was inserted.
    pub fn seed(&mut self, device_id: DeviceId, object_id: ObjectId) -> bool {
        if self.entries.contains_key(&(device_id, object_id)) {
            return false;
        }
        self.entries.insert((device_id, object_id), SubscriptionEntry::expired());
        true
    }

    /// Records a present-value notification
    pub fn record_notification(
        &mut self,
        device_id: DeviceId,
        object_id: ObjectId,
        tag: ApplicationTag,
        time_remaining: Duration,
        now: SystemTime,
    ) {
        let entry = self.entry(device_id, object_id);
        entry.expires_at = now + time_remaining;
        entry.tag = Some(tag);
    }

    /// Pushes the expiry forward without touching the tag
    pub fn refresh_expiry(
        &mut self,
        device_id: DeviceId,
        object_id: ObjectId,
        time_remaining: Duration,
        now: SystemTime,
    ) {
        self.entry(device_id, object_id).expires_at = now + time_remaining;
    }

    /// Keys whose expiry is at or before `threshold`
    pub fn entries_expiring_before(&self, threshold: SystemTime) -> Vec<SubscriptionKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= threshold)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn lookup_tag(&self, device_id: DeviceId, object_id: ObjectId) -> Option<ApplicationTag> {
        self.entries.get(&(device_id, object_id)).and_then(|entry| entry.tag)
    }

    pub fn get(&self, device_id: DeviceId, object_id: ObjectId) -> Option<&SubscriptionEntry> {
        self.entries.get(&(device_id, object_id))
    }

    pub fn contains(&self, device_id: DeviceId, object_id: ObjectId) -> bool {
        self.entries.contains_key(&(device_id, object_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&mut self, device_id: DeviceId, object_id: ObjectId) -> &mut SubscriptionEntry {
        self.entries
            .entry((device_id, object_id))
            .or_insert_with(SubscriptionEntry::expired)
    }
}
