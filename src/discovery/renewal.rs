use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::ledger::SubscriptionLedger;
use super::subscribe_request;
use crate::core::{BridgeConfig, DeviceId};
use crate::protocol::ProtocolEngine;

/// Outcome of one renewal sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalReport {
    /// Subscriptions re-sent
    pub sent: usize,
    /// Subscriptions the engine refused
    pub rejected: usize,
    /// Due subscriptions left for a later sweep
    pub deferred: usize,
}

/// Re-subscribes entries that are about to expire
///
/// At most one subscription per device is renewed per sweep so a device is
/// never flooded with requests.
#[derive(Debug, Clone)]
pub struct RenewalScheduler {
    margin: Duration,
    lifetime: u32,
}

impl RenewalScheduler {
    pub fn new(config: &BridgeConfig) -> Self {
        RenewalScheduler {
            margin: config.renewal_margin,
            lifetime: config.lifetime_secs(),
        }
    }

    /// Runs one sweep over the ledger
    pub fn sweep<E: ProtocolEngine>(
        &self,
        engine: &mut E,
        ledger: &SubscriptionLedger,
        now: SystemTime,
    ) -> RenewalReport {
        let mut report = RenewalReport::default();
        let mut attempted: HashSet<DeviceId> = HashSet::new();

        for (device_id, object) in ledger.entries_expiring_before(now + self.margin) {
            if !attempted.insert(device_id) {
                report.deferred += 1;
                continue;
            }

            let request = subscribe_request(device_id, object, self.lifetime);
            match engine.subscribe_cov(device_id, &request) {
                Ok(invoke_id) => {
                    report.sent += 1;
                    debug!(device = %device_id, object = %object, invoke_id, "subscription renewed");
                }
                Err(err) => {
                    report.rejected += 1;
                    warn!(device = %device_id, object = %object, error = %err, "renewal rejected");
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ApplicationTag, ObjectId, ObjectType};
    use crate::protocol::mock::MockEngine;
    use std::time::UNIX_EPOCH;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn ai(instance: u32) -> ObjectId {
        ObjectId::new(ObjectType::ANALOG_INPUT, instance)
    }

    #[test]
    fn test_one_renewal_per_device() {
        let mut ledger = SubscriptionLedger::new();
        ledger.seed(DeviceId(1), ai(1));
        ledger.seed(DeviceId(1), ai(2));
        ledger.seed(DeviceId(1), ai(3));
        ledger.seed(DeviceId(2), ai(1));

        let mut engine = MockEngine::new();
        let scheduler = RenewalScheduler::new(&BridgeConfig::default());
        let report = scheduler.sweep(&mut engine, &ledger, at(0));

        assert_eq!(
            report,
            RenewalReport {
                sent: 2,
                rejected: 0,
                deferred: 2
            }
        );
        assert_eq!(engine.subscriptions(), vec![(DeviceId(1), ai(1)), (DeviceId(2), ai(1))]);
    }

    #[test]
    fn test_margin_selects_due_entries() {
        let mut ledger = SubscriptionLedger::new();
        ledger.record_notification(DeviceId(1), ai(1), ApplicationTag::Real, Duration::from_secs(300), at(0));
        ledger.record_notification(DeviceId(2), ai(1), ApplicationTag::Real, Duration::from_secs(50), at(0));

        let mut engine = MockEngine::new();
        let scheduler = RenewalScheduler::new(&BridgeConfig::default());
        let report = scheduler.sweep(&mut engine, &ledger, at(0));

        assert_eq!(report.sent, 1);
        assert_eq!(engine.subscriptions(), vec![(DeviceId(2), ai(1))]);

        // Device 1 comes due once within a minute of expiry
        let mut engine = MockEngine::new();
        scheduler.sweep(&mut engine, &ledger, at(240));
        assert_eq!(engine.subscriptions().len(), 2);
    }

    #[test]
    fn test_rejected_renewal_not_retried_in_sweep() {
        let mut ledger = SubscriptionLedger::new();
        ledger.seed(DeviceId(1), ai(1));
        ledger.seed(DeviceId(1), ai(2));

        let mut engine = MockEngine::new();
        engine.reject = true;
        let scheduler = RenewalScheduler::new(&BridgeConfig::default());
        let report = scheduler.sweep(&mut engine, &ledger, at(0));

        assert_eq!(report.rejected, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(report.sent, 0);
        assert!(engine.requests.is_empty());
    }

    #[test]
    fn test_renewal_uses_subscribe_parameters() {
        let mut ledger = SubscriptionLedger::new();
        ledger.seed(DeviceId(1001), ai(1));

        let mut engine = MockEngine::new();
        RenewalScheduler::new(&BridgeConfig::default()).sweep(&mut engine, &ledger, at(0));

        match &engine.requests[0] {
            crate::protocol::mock::Request::Subscribe { request, .. } => {
                assert_eq!(request.subscriber_process_id, 1001);
                assert_eq!(request.lifetime, 300);
                assert!(request.confirmed_notifications);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_empty_ledger() {
        let mut engine = MockEngine::new();
        let report = RenewalScheduler::new(&BridgeConfig::default()).sweep(&mut engine, &SubscriptionLedger::new(), at(0));
        assert_eq!(report, RenewalReport::default());
    }
}
