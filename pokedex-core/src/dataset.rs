//! The assembled dataset and its records.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Pad a number with leading zeros to `pad` places.
///
/// Numbers that already have `pad` or more digits are returned unchanged,
/// never truncated.
pub fn pad_number(number: u32, pad: usize) -> String {
    format!("{:0width$}", number, width = pad)
}

/// One evolution in a flattened chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evolution {
    pub id: u32,
    pub name: String,
}

/// A fully enriched entity, as written to the output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: u32,
    pub name: String,
    /// Base64 sprite, empty when the entity has none.
    pub image: String,
    pub order: i64,
    pub abilities: JsonValue,
    pub stats: JsonValue,
    pub types: JsonValue,
    pub weight: u32,
    pub height: u32,
    pub region: String,
    pub evolutions: Vec<Evolution>,
    pub locations: Vec<String>,
}

/// Enriched records keyed by ID.
///
/// Serializes as a single JSON object whose keys are the zero-padded IDs, in
/// ascending ID order regardless of the order records were inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pad: usize,
    records: BTreeMap<u32, EntityRecord>,
}

impl Dataset {
    pub fn new(pad: usize) -> Self {
        Self {
            pad,
            records: BTreeMap::new(),
        }
    }

    /// Insert a record under its own ID. Returns the record it replaced, if any.
    pub fn insert(&mut self, record: EntityRecord) -> Option<EntityRecord> {
        self.records.insert(record.id, record)
    }

    pub fn get(&self, id: u32) -> Option<&EntityRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pad(&self) -> usize {
        self.pad
    }

    /// Padded keys in output order.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.records.keys().map(|id| pad_number(*id, self.pad))
    }

    pub fn records(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.values()
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for (id, record) in &self.records {
            map.serialize_entry(&pad_number(*id, self.pad), record)?;
        }
        map.end()
    }
}
