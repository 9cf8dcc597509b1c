use std::collections::HashMap;

use tracing::debug;

use crate::core::{DeviceId, ObjectId};

/// Everything learned about one remote device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    /// Device identifier
    pub device_id: DeviceId,
    /// Objects the device reported, in reply order
    pub object_list: Vec<ObjectId>,
    /// Device object name, once read
    pub name: Option<String>,
}

/// Directory of discovered devices
///
/// Entries are created when a device's object list has been decoded and are
/// never removed.
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    devices: HashMap<DeviceId, DeviceEntry>,
}

impl DeviceDirectory {
    /// Creates an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the object list for a device, replacing any earlier list
    pub fn upsert(&mut self, device_id: DeviceId, object_list: Vec<ObjectId>) {
        self.devices
            .entry(device_id)
            .and_modify(|entry| entry.object_list = object_list.clone())
            .or_insert_with(|| DeviceEntry {
                device_id,
                object_list,
                name: None,
            });
    }

    /// Sets the name of a known device
    ///
    /// Returns `false` when the device has no entry yet.
    pub fn set_name(&mut self, device_id: DeviceId, name: String) -> bool {
        match self.devices.get_mut(&device_id) {
            Some(entry) => {
                entry.name = Some(name);
                true
            }
            None => {
                debug!(device = %device_id, "name reply for device without object list");
                false
            }
        }
    }

    pub fn lookup(&self, device_id: DeviceId) -> Option<&DeviceEntry> {
        self.devices.get(&device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.devices.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ObjectType;

    fn objects() -> Vec<ObjectId> {
        vec![
            ObjectId::device(DeviceId(1001)),
            ObjectId::new(ObjectType::ANALOG_INPUT, 1),
            ObjectId::new(ObjectType::BINARY_VALUE, 2),
        ]
    }

    #[test]
    fn test_upsert_and_lookup() {
        let mut directory = DeviceDirectory::new();
        assert!(directory.lookup(DeviceId(1001)).is_none());

        directory.upsert(DeviceId(1001), objects());
        let entry = directory.lookup(DeviceId(1001)).unwrap();
        assert_eq!(entry.object_list, objects());
        assert_eq!(entry.name, None);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_upsert_keeps_name() {
        let mut directory = DeviceDirectory::new();
        directory.upsert(DeviceId(7), objects());
        assert!(directory.set_name(DeviceId(7), "AHU-1".to_string()));

        directory.upsert(DeviceId(7), vec![ObjectId::new(ObjectType::ANALOG_VALUE, 9)]);
        let entry = directory.lookup(DeviceId(7)).unwrap();
        assert_eq!(entry.object_list.len(), 1);
        assert_eq!(entry.name.as_deref(), Some("AHU-1"));
    }

    #[test]
    fn test_set_name_unknown_device() {
        let mut directory = DeviceDirectory::new();
        assert!(!directory.set_name(DeviceId(42), "ghost".to_string()));
        assert!(directory.is_empty());
    }
}
