//! # dockrs Set Identity Utilities (`common::hash`)
//!
//! File: cli/src/common/hash.rs
//!
//! ## Overview
//!
//! Several resource fields are unordered sets of structured records: ports,
//! volumes, extra hosts, capabilities, network attachments, IPAM blocks and file
//! uploads. None of them has a natural order, so two specs that only differ in
//! element order must compare equal and produce identical requests.
//!
//! ## Architecture
//!
//! - **`SetElement`**: each record type writes a canonical string with a fixed
//!   field order. Absent optional fields are omitted (not zero-filled), nested
//!   maps are written with sorted keys and nested string sets in sorted order.
//! - **`set_hash`**: the first four bytes (big endian) of the SHA-256 digest of
//!   a canonical string. Stable across processes and platforms.
//! - **`StableSet<T>`**: a set ordered by canonical form. Structurally equal
//!   elements collapse, iteration follows canonical order and equality ignores
//!   insertion order.
//!   It serializes as a plain sequence so manifests stay readable.
//!
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// A record that can live in a `StableSet`.
pub trait SetElement {
    /// Writes the canonical serialization of `self` into `buf`.
    fn write_canonical(&self, buf: &mut String);

    /// The canonical serialization as an owned string.
    fn canonical(&self) -> String {
        let mut buf = String::new();
        self.write_canonical(&mut buf);
        buf
    }

    /// The set-membership hash of this element.
    fn set_hash(&self) -> u32 {
        set_hash(&self.canonical())
    }
}

/// Stable string hash used for set membership.
pub fn set_hash(canonical: &str) -> u32 {
    let digest = Sha256::digest(canonical.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Appends `value-` to the canonical buffer.
pub fn push_field<T: std::fmt::Display>(buf: &mut String, value: T) {
    // Writing into a String cannot fail.
    let _ = write!(buf, "{}-", value);
}

/// Appends `value-` only when the optional field is present.
pub fn push_optional<T: std::fmt::Display>(buf: &mut String, value: Option<T>) {
    if let Some(value) = value {
        push_field(buf, value);
    }
}

/// Appends `key-value-` pairs in key order.
pub fn push_sorted_map(buf: &mut String, map: &BTreeMap<String, String>) {
    // BTreeMap iterates in key order, which is what makes this deterministic.
    for (key, value) in map {
        push_field(buf, key);
        push_field(buf, value);
    }
}

/// Appends a string set as `[a b c]-` in sorted order.
pub fn push_sorted_set(buf: &mut String, set: &BTreeSet<String>) {
    let joined: Vec<&str> = set.iter().map(String::as_str).collect();
    push_field(buf, format!("[{}]", joined.join(" ")));
}

/// Order-independent collection of structured records.
///
/// Elements are grouped by canonical form. Two different elements can share a
/// canonical string (field text may contain the `-` separator), so each group
/// holds every structurally distinct element with that form.
#[derive(Debug, Clone)]
pub struct StableSet<T> {
    items: BTreeMap<String, Vec<T>>,
    len: usize,
}

impl<T> Default for StableSet<T> {
    fn default() -> Self {
        StableSet {
            items: BTreeMap::new(),
            len: 0,
        }
    }
}

impl<T: SetElement + PartialEq> StableSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `item`; returns `false` if an equal element was already present.
    pub fn insert(&mut self, item: T) -> bool {
        let bucket = self.items.entry(item.canonical()).or_default();
        if bucket.contains(&item) {
            return false;
        }
        bucket.push(item);
        self.len += 1;
        true
    }

    /// Structural membership; a shared canonical form alone is not a match.
    pub fn contains(&self, item: &T) -> bool {
        self.items
            .get(&item.canonical())
            .is_some_and(|bucket| bucket.contains(item))
    }
}

impl<T> StableSet<T> {
    /// Elements in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set-hashes of all elements, sorted.
    pub fn hashes(&self) -> Vec<u32> {
        let mut hashes: Vec<u32> = self
            .items
            .iter()
            .flat_map(|(key, bucket)| std::iter::repeat(set_hash(key)).take(bucket.len()))
            .collect();
        hashes.sort_unstable();
        hashes
    }
}

impl<T: SetElement + PartialEq> PartialEq for StableSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().all(|item| other.contains(item))
    }
}

impl<T: SetElement + Eq> Eq for StableSet<T> {}

impl<T: SetElement + PartialEq> FromIterator<T> for StableSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = StableSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl<'a, T> IntoIterator for &'a StableSet<T> {
    type Item = &'a T;
    type IntoIter = std::iter::Flatten<std::collections::btree_map::Values<'a, String, Vec<T>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.values().flatten()
    }
}

impl<T: Serialize> Serialize for StableSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de, T: SetElement + PartialEq + Deserialize<'de>> Deserialize<'de> for StableSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}
