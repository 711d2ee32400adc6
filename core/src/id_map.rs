use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Bidirectional string <-> dense integer registry.
///
/// Ids are handed out in first-seen order starting at 0 and are never
/// reassigned. Only the id-ordered key list is persisted; the reverse map is
/// rebuilt on load, so a loaded map assigns exactly the same ids.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdMap {
    keys: Vec<String>,
    ids: HashMap<String, u32>,
}

impl IdMap {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.keys.len() }

    pub fn is_empty(&self) -> bool { self.keys.is_empty() }

    /// Existing id for `key`, or the next unused id.
    pub fn get_or_assign(&mut self, key: &str) -> u32 {
        if let Some(&id) = self.ids.get(key) {
            return id;
        }
        let id = self.keys.len() as u32;
        self.keys.push(key.to_owned());
        self.ids.insert(key.to_owned(), id);
        id
    }

    pub fn key_to_id(&self, key: &str) -> Result<u32> {
        self.ids.get(key).copied().ok_or_else(|| Error::not_found(format!("key {key:?}")))
    }

    pub fn id_to_key(&self, id: u32) -> Result<&str> {
        self.keys
            .get(id as usize)
            .map(String::as_str)
            .ok_or_else(|| Error::not_found(format!("id {id}")))
    }

    /// Keys in id order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.iter().map(String::as_str)
    }

    fn from_keys(keys: Vec<String>) -> Self {
        let ids = keys.iter().enumerate().map(|(i, k)| (k.clone(), i as u32)).collect();
        Self { keys, ids }
    }
}

impl Serialize for IdMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.keys.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IdMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let keys = Vec::<String>::deserialize(deserializer)?;
        let map = IdMap::from_keys(keys);
        if map.ids.len() != map.keys.len() {
            return Err(serde::de::Error::custom("duplicate key in identifier map"));
        }
        Ok(map)
    }
}
