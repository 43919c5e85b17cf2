//! In-memory [`HubPort`] that records every interaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use roomba_core::{DeviceVariant, PropertyId, PropertyUpdate, PropertyValue};

use super::{HubError, HubPort};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A node as the hub sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedNode {
    pub name: String,
    pub variant: DeviceVariant,
    /// Latest value per property.
    pub values: HashMap<PropertyId, PropertyValue>,
    /// Number of publish calls received.
    pub publish_count: usize,
}

#[derive(Default)]
pub struct RecordingHub {
    nodes: Mutex<BTreeMap<String, RecordedNode>>,
    published: Mutex<Vec<(String, PropertyUpdate)>>,
    notices: Mutex<BTreeMap<String, String>>,
    notice_log: Mutex<Vec<(String, String)>>,
}

impl RecordingHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, address: &str) -> Option<RecordedNode> {
        lock(&self.nodes).get(address).cloned()
    }

    pub fn node_addresses(&self) -> Vec<String> {
        lock(&self.nodes).keys().cloned().collect()
    }

    /// Latest published value of `id` on `address`.
    pub fn value(&self, address: &str, id: PropertyId) -> Option<PropertyValue> {
        lock(&self.nodes)
            .get(address)
            .and_then(|n| n.values.get(&id).copied())
    }

    /// Every update published to `address`, in order.
    pub fn published_to(&self, address: &str) -> Vec<PropertyUpdate> {
        lock(&self.published)
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, u)| *u)
            .collect()
    }

    /// Number of times `id` was published to `address`.
    pub fn publish_count_of(&self, address: &str, id: PropertyId) -> usize {
        self.published_to(address)
            .iter()
            .filter(|u| u.id == id)
            .count()
    }

    /// Notices currently posted.
    pub fn notices(&self) -> BTreeMap<String, String> {
        lock(&self.notices).clone()
    }

    /// Every notice ever posted, including cleared ones.
    pub fn notice_history(&self) -> Vec<(String, String)> {
        lock(&self.notice_log).clone()
    }
}

impl HubPort for RecordingHub {
    fn add_node(&self, address: &str, name: &str, variant: DeviceVariant) -> Result<(), HubError> {
        lock(&self.nodes).insert(
            address.to_string(),
            RecordedNode {
                name: name.to_string(),
                variant,
                values: HashMap::new(),
                publish_count: 0,
            },
        );
        Ok(())
    }

    fn remove_node(&self, address: &str) -> Result<(), HubError> {
        lock(&self.nodes)
            .remove(address)
            .map(|_| ())
            .ok_or_else(|| HubError::UnknownNode(address.to_string()))
    }

    fn publish(&self, address: &str, updates: &[PropertyUpdate]) -> Result<(), HubError> {
        let mut nodes = lock(&self.nodes);
        let node = nodes
            .get_mut(address)
            .ok_or_else(|| HubError::UnknownNode(address.to_string()))?;
        node.publish_count += 1;
        let mut published = lock(&self.published);
        for update in updates {
            node.values.insert(update.id, update.value);
            published.push((address.to_string(), *update));
        }
        Ok(())
    }

    fn add_notice(&self, key: &str, text: &str) {
        lock(&self.notices).insert(key.to_string(), text.to_string());
        lock(&self.notice_log).push((key.to_string(), text.to_string()));
    }

    fn clear_notices(&self) {
        lock(&self.notices).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_to_unknown_node_fails() {
        let hub = RecordingHub::new();
        let result = hub.publish("rm0000000000", &[PropertyUpdate::int(PropertyId::Battery, 1)]);
        assert!(matches!(result, Err(HubError::UnknownNode(_))));
    }

    #[test]
    fn test_publish_records_latest_value_and_history() {
        // Arrange
        let hub = RecordingHub::new();
        hub.add_node("rmabc", "Den", DeviceVariant::Basic).unwrap();

        // Act
        hub.publish("rmabc", &[PropertyUpdate::int(PropertyId::Battery, 90)])
            .unwrap();
        hub.publish("rmabc", &[PropertyUpdate::int(PropertyId::Battery, 80)])
            .unwrap();

        // Assert
        assert_eq!(
            hub.value("rmabc", PropertyId::Battery),
            Some(PropertyValue::Int(80))
        );
        assert_eq!(hub.publish_count_of("rmabc", PropertyId::Battery), 2);
        assert_eq!(hub.node("rmabc").map(|n| n.publish_count), Some(2));
    }

    #[test]
    fn test_clear_notices_keeps_history() {
        let hub = RecordingHub::new();
        hub.add_notice("setup", "Initializing connection to Den");
        hub.clear_notices();
        assert!(hub.notices().is_empty());
        assert_eq!(hub.notice_history().len(), 1);
    }
}
