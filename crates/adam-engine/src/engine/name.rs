//! Interned identifiers.
//!
//! A [`Name`] is a handle to a canonical, process-lifetime string. Interning
//! the same text twice yields the same allocation, so equality and hashing are
//! a pointer comparison. The intern table is created on first use and never
//! torn down; it is backed by a `DashMap` so independent sheets on different
//! threads can intern concurrently.

use dashmap::DashMap;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

fn table() -> &'static DashMap<&'static str, ()> {
    static TABLE: OnceLock<DashMap<&'static str, ()>> = OnceLock::new();
    TABLE.get_or_init(DashMap::new)
}

/// Return the canonical copy of `text`, allocating it on first sight.
fn intern(text: &str) -> &'static str {
    if let Some(entry) = table().get(text) {
        return *entry.key();
    }
    let leaked: &'static str = Box::leak(text.to_owned().into_boxed_str());
    // Another thread may have won the race between `get` and here; the shard
    // lock taken by `entry` decides which allocation becomes canonical.
    *table().entry(leaked).or_insert(()).key()
}

/// An interned immutable symbol used as a cell/variable identifier.
#[derive(Clone, Copy)]
pub struct Name(&'static str);

impl Name {
    pub fn new(text: &str) -> Name {
        Name(intern(text))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Names order by their text so dictionaries iterate deterministically.
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            Ordering::Equal
        } else {
            self.0.cmp(other.0)
        }
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Name::new(text)
    }
}

impl From<&String> for Name {
    fn from(text: &String) -> Self {
        Name::new(text)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}
