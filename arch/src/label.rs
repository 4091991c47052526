use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Label name to address, in definition order.
///
/// Names are case-insensitive; the spelling of the first definition is kept
/// for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTable {
    labels: IndexMap<String, (String, u16)>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable {
            labels: IndexMap::new(),
        }
    }

    fn key(name: &str) -> String {
        name.to_ascii_uppercase()
    }

    /// Returns the previous address on a duplicate and leaves the table as it was.
    pub fn insert(&mut self, name: &str, address: u16) -> Result<(), u16> {
        let key = Self::key(name);
        if let Some((_, prev)) = self.labels.get(&key) {
            return Err(*prev);
        }
        self.labels.insert(key, (name.to_string(), address));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.labels.get(&Self::key(name)).map(|(_, addr)| *addr)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.contains_key(&Self::key(name))
    }

    /// First label defined at `address`.
    pub fn name_at(&self, address: u16) -> Option<&str> {
        self.labels
            .values()
            .find(|(_, addr)| *addr == address)
            .map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.labels.values().map(|(name, addr)| (name.as_str(), *addr))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
