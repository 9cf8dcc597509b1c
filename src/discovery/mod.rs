//! Device discovery and subscription lifecycle
//!
//! This module tracks the devices seen on the field bus, walks each one
//! through discovery and keeps its change-of-value subscriptions alive.

pub mod directory;
pub mod ledger;
pub mod orchestrator;
pub mod renewal;

pub use self::directory::{DeviceDirectory, DeviceEntry};
pub use self::ledger::{SubscriptionEntry, SubscriptionKey, SubscriptionLedger};
pub use self::orchestrator::{DiscoveryOrchestrator, DiscoveryState, DiscoveryStats};
pub use self::renewal::{RenewalReport, RenewalScheduler};

use crate::core::{DeviceId, ObjectId};
use crate::protocol::SubscribeCov;

/// SubscribeCOV parameters used for both the first subscription and renewals
pub fn subscribe_request(device_id: DeviceId, object: ObjectId, lifetime: u32) -> SubscribeCov {
    SubscribeCov {
        subscriber_process_id: device_id.0,
        monitored_object: object,
        cancellation: false,
        confirmed_notifications: true,
        lifetime,
    }
}
