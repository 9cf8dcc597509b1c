use tracing::debug;

use super::topic::WriteCommand;
use crate::core::{ArrayIndex, Error, InvokeId, ObjectId, ObjectType, PropertyId, Result};
use crate::discovery::SubscriptionLedger;
use crate::protocol::{parse_value, ProtocolEngine};

/// Issues a present-value write for a command from the messaging fabric
///
/// The value is parsed against the tag of the last notification seen for
/// the object, so only subscribed objects that have reported at least once
/// can be written. The request is not awaited.
pub fn write_present_value<E: ProtocolEngine>(
    engine: &mut E,
    ledger: &SubscriptionLedger,
    command: &WriteCommand,
) -> Result<InvokeId> {
    let object_type = ObjectType::from_name(&command.object_type)
        .ok_or_else(|| Error::UnknownObjectType(command.object_type.clone()))?;
    let object = ObjectId::new(object_type, command.instance);

    let tag = ledger
        .lookup_tag(command.device_id, object)
        .ok_or(Error::UnknownSubscription {
            device: command.device_id,
            object,
        })?;
    let value = parse_value(tag, &command.value)?;

    let invoke_id = engine.write_property(
        command.device_id,
        object,
        PropertyId::PRESENT_VALUE,
        &value,
        None,
        ArrayIndex::All,
    )?;
    debug!(device = %command.device_id, object = %object, invoke_id, "write requested");
    Ok(invoke_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ApplicationTag, ApplicationValue, DeviceId};
    use crate::protocol::mock::{MockEngine, Request};
    use std::time::{Duration, UNIX_EPOCH};

    fn command(object_type: &str, instance: u32, value: &str) -> WriteCommand {
        WriteCommand {
            device_id: DeviceId(1001),
            object_type: object_type.to_string(),
            instance,
            value: value.to_string(),
        }
    }

    fn ledger() -> SubscriptionLedger {
        let mut ledger = SubscriptionLedger::new();
        ledger.record_notification(
            DeviceId(1001),
            ObjectId::new(ObjectType::ANALOG_VALUE, 3),
            ApplicationTag::Real,
            Duration::from_secs(300),
            UNIX_EPOCH,
        );
        ledger.seed(DeviceId(1001), ObjectId::new(ObjectType::BINARY_VALUE, 1));
        ledger
    }

    #[test]
    fn test_write_issued() {
        let mut engine = MockEngine::new();
        write_present_value(&mut engine, &ledger(), &command("analog-value", 3, "21.5")).unwrap();

        assert_eq!(
            engine.requests,
            vec![Request::Write {
                device: DeviceId(1001),
                object: ObjectId::new(ObjectType::ANALOG_VALUE, 3),
                property: PropertyId::PRESENT_VALUE,
                value: ApplicationValue::Real(21.5),
                priority: None,
                array_index: ArrayIndex::All,
            }]
        );
    }

    #[test]
    fn test_type_name_case_insensitive() {
        let mut engine = MockEngine::new();
        assert!(write_present_value(&mut engine, &ledger(), &command("Analog-Value", 3, "1")).is_ok());
    }

    #[test]
    fn test_unknown_object_type() {
        let mut engine = MockEngine::new();
        let err = write_present_value(&mut engine, &ledger(), &command("thermostat", 3, "1")).unwrap_err();
        assert!(matches!(err, Error::UnknownObjectType(name) if name == "thermostat"));
        assert!(engine.requests.is_empty());
    }

    #[test]
    fn test_unknown_subscription() {
        let mut engine = MockEngine::new();
        let err = write_present_value(&mut engine, &ledger(), &command("analog-value", 4, "1")).unwrap_err();
        assert!(matches!(err, Error::UnknownSubscription { .. }));

        // Seeded but never reported
        let err = write_present_value(&mut engine, &ledger(), &command("binary-value", 1, "1")).unwrap_err();
        assert!(matches!(err, Error::UnknownSubscription { .. }));
        assert!(engine.requests.is_empty());
    }

    #[test]
    fn test_value_parse_failure() {
        let mut engine = MockEngine::new();
        let err = write_present_value(&mut engine, &ledger(), &command("analog-value", 3, "warm")).unwrap_err();
        assert!(matches!(err, Error::ValueParse { tag: ApplicationTag::Real, .. }));
        assert!(engine.requests.is_empty());
    }

    #[test]
    fn test_engine_rejection_propagates() {
        let mut engine = MockEngine::new();
        engine.reject = true;
        let err = write_present_value(&mut engine, &ledger(), &command("analog-value", 3, "1")).unwrap_err();
        assert!(matches!(err, Error::RequestRejected(_)));
    }
}
