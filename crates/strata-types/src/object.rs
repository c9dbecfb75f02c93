use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Numeric identifier of a pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(u64);

impl PoolId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolId({})", self.0)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an object inside a pool.
///
/// The locator key overrides the name for placement: objects sharing a
/// locator land in the same placement group. Two keys with the same name but
/// different locators are different objects.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    name: String,
    locator: Option<String>,
}

impl ObjectKey {
    /// Build a key, rejecting empty names.
    pub fn new(name: impl Into<String>, locator: Option<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::EmptyObjectName);
        }
        Ok(Self {
            name,
            locator: locator.filter(|l| !l.is_empty()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    /// The string hashed for placement: the locator if set, else the name.
    pub fn placement_key(&self) -> &str {
        self.locator.as_deref().unwrap_or(&self.name)
    }

    /// Placement group for this key among `pg_count` groups.
    pub fn placement(&self, pg_count: u32) -> u32 {
        let hash = blake3::hash(self.placement_key().as_bytes());
        let mut word = [0u8; 4];
        word.copy_from_slice(&hash.as_bytes()[..4]);
        u32::from_le_bytes(word) % pg_count.max(1)
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locator {
            Some(loc) => write!(f, "ObjectKey({}@{})", self.name, loc),
            None => write!(f, "ObjectKey({})", self.name),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locator {
            Some(loc) => write!(f, "{}@{}", self.name, loc),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Identifier of one submitted batch (UUID v7 for time-ordering).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompletionId(uuid::Uuid);

impl CompletionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// First 8 characters of the UUID.
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for CompletionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompletionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompletionId({})", self.short_id())
    }
}

impl fmt::Display for CompletionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_rejected() {
        assert_eq!(ObjectKey::new("", None), Err(TypeError::EmptyObjectName));
    }

    #[test]
    fn empty_locator_is_dropped() {
        let key = ObjectKey::new("obj", Some(String::new())).unwrap();
        assert_eq!(key.locator(), None);
        assert_eq!(key, ObjectKey::new("obj", None).unwrap());
    }

    #[test]
    fn locator_controls_placement() {
        let a = ObjectKey::new("a", Some("shared".into())).unwrap();
        let b = ObjectKey::new("b", Some("shared".into())).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.placement(64), b.placement(64));
        assert_eq!(a.placement_key(), "shared");
    }

    #[test]
    fn placement_is_deterministic_and_bounded() {
        let key = ObjectKey::new("some-object", None).unwrap();
        let pg = key.placement(16);
        assert!(pg < 16);
        assert_eq!(pg, key.placement(16));
        assert_eq!(key.placement(0), 0);
    }

    #[test]
    fn display_includes_locator() {
        let key = ObjectKey::new("obj", Some("loc".into())).unwrap();
        assert_eq!(format!("{key}"), "obj@loc");
        assert_eq!(format!("{}", ObjectKey::new("obj", None).unwrap()), "obj");
    }

    #[test]
    fn completion_ids_are_unique() {
        let a = CompletionId::new();
        let b = CompletionId::new();
        assert_ne!(a, b);
        assert_eq!(a.short_id().len(), 8);
        assert_eq!(a.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn serde_roundtrip() {
        let key = ObjectKey::new("obj", Some("loc".into())).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        let parsed: ObjectKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, parsed);
    }
}
