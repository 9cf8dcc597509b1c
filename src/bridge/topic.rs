//! Topic layout shared by outbound values and inbound write commands
//!
//! Both directions use `<prefix>/<device-id>/<object-type-name>/<instance>`.

use tracing::debug;

use crate::core::DeviceId;

/// One value to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueUpdate {
    pub device_id: DeviceId,
    /// Hyphenated object type name
    pub object_type: String,
    pub instance: u32,
    /// Canonical string form of the value
    pub value: String,
}

/// One write request received from the messaging fabric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    pub device_id: DeviceId,
    /// Object type name as it appeared on the topic
    pub object_type: String,
    pub instance: u32,
    pub value: String,
}

/// Builds the topic a value update is published on
pub fn outbound_topic(prefix: &str, update: &ValueUpdate) -> String {
    format!(
        "{}/{}/{}/{}",
        prefix, update.device_id, update.object_type, update.instance
    )
}

/// Filter that matches every command topic under `prefix`
pub fn command_filter(prefix: &str) -> String {
    format!("{}/#", prefix)
}

/// Parses an inbound publish into a write command
///
/// Returns `None` for topics outside `prefix`, topics with the wrong number
/// of segments, non-numeric identifiers and payloads that are not UTF-8.
/// Trailing NUL bytes are stripped from the payload. Whitespace is left for
/// [`parse_value`](crate::protocol::parse_value), which trims it for every
/// tag except character strings.
pub fn parse_command(prefix: &str, topic: &str, payload: &[u8]) -> Option<WriteCommand> {
    let Some(rest) = topic.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('/')) else {
        debug!(topic, "ignoring publish outside command prefix");
        return None;
    };

    let segments: Vec<&str> = rest.split('/').collect();
    let [device, object_type, instance] = segments.as_slice() else {
        debug!(topic, "ignoring command topic with unexpected layout");
        return None;
    };

    let (Ok(device), Ok(instance)) = (device.parse::<u32>(), instance.parse::<u32>()) else {
        debug!(topic, "ignoring command topic with non-numeric identifier");
        return None;
    };
    if object_type.is_empty() {
        return None;
    }

    let value = match std::str::from_utf8(payload) {
        Ok(text) => text.trim_end_matches('\0').to_string(),
        Err(_) => {
            debug!(topic, "ignoring command payload that is not UTF-8");
            return None;
        }
    };

    Some(WriteCommand {
        device_id: DeviceId(device),
        object_type: object_type.to_string(),
        instance,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_topic() {
        let update = ValueUpdate {
            device_id: DeviceId(1001),
            object_type: "analog-input".to_string(),
            instance: 1,
            value: "72.500000".to_string(),
        };
        assert_eq!(outbound_topic("bacnet-out", &update), "bacnet-out/1001/analog-input/1");
    }

    #[test]
    fn test_parse_command() {
        let command = parse_command("bacnet-in", "bacnet-in/1001/analog-value/3", b"21.5\0").unwrap();
        assert_eq!(
            command,
            WriteCommand {
                device_id: DeviceId(1001),
                object_type: "analog-value".to_string(),
                instance: 3,
                value: "21.5".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_command_strips_only_nul_padding() {
        let command = parse_command("bacnet-in", "bacnet-in/5/binary-output/0", b" active \n\0\0").unwrap();
        assert_eq!(command.value, " active \n");

        let command = parse_command("bacnet-in", "bacnet-in/5/characterstring-value/1", b"  lobby  \0").unwrap();
        assert_eq!(command.value, "  lobby  ");
    }

    #[test]
    fn test_parse_command_rejects_bad_topics() {
        let topics = [
            "bacnet-in/1001/analog-value",
            "bacnet-in/1001/analog-value/3/extra",
            "bacnet-out/1001/analog-value/3",
            "bacnet-inx/1001/analog-value/3",
            "bacnet-in/abc/analog-value/3",
            "bacnet-in/1001/analog-value/-3",
            "bacnet-in/1001//3",
            "bacnet-in",
        ];
        for topic in topics {
            assert!(parse_command("bacnet-in", topic, b"1").is_none(), "{}", topic);
        }
    }

    #[test]
    fn test_parse_command_rejects_invalid_utf8() {
        assert!(parse_command("bacnet-in", "bacnet-in/1/analog-value/1", &[0xff, 0xfe]).is_none());
    }

    #[test]
    fn test_command_filter() {
        assert_eq!(command_filter("bacnet-in"), "bacnet-in/#");
    }
}
