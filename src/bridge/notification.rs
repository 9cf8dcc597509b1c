use std::time::{Duration, SystemTime};

use tracing::{debug, trace};

use super::topic::ValueUpdate;
use crate::core::PropertyId;
use crate::discovery::SubscriptionLedger;
use crate::protocol::{to_canonical_string, CovNotification};

/// Applies a change-of-value notification to the ledger
///
/// The subscription expiry is always refreshed. The first present-value
/// entry also records its tag and yields the update to publish; other
/// properties are ignored. Notifications about a device object are dropped,
/// since device objects are never monitored.
pub fn apply_notification(
    ledger: &mut SubscriptionLedger,
    notification: &CovNotification,
    now: SystemTime,
) -> Option<ValueUpdate> {
    let device_id = notification.initiating_device;
    let object = notification.monitored_object;
    if object.object_type.is_device() {
        debug!(device = %device_id, object = %object, "ignoring notification for device object");
        return None;
    }
    let time_remaining = Duration::from_secs(u64::from(notification.time_remaining));

    let Some(present_value) = notification
        .values
        .iter()
        .find(|entry| entry.property == PropertyId::PRESENT_VALUE)
    else {
        debug!(device = %device_id, object = %object, "notification without present-value");
        ledger.refresh_expiry(device_id, object, time_remaining, now);
        return None;
    };

    ledger.record_notification(device_id, object, present_value.value.tag(), time_remaining, now);
    let value = to_canonical_string(&present_value.value);
    trace!(device = %device_id, object = %object, value = %value, "present-value changed");

    Some(ValueUpdate {
        device_id,
        object_type: object.object_type.name().into_owned(),
        instance: object.instance,
        value,
    })
}
