// Keygate — Property tree storage
//
// The recursive, heterogeneous, keyed value tree used to represent slot and
// crypto object metadata. Storage is five independent ordered key→value maps
// (bool, unsigned, signed, string, child node) plus five parallel key→array
// maps. Lookups are not polymorphic across kinds: asking for a string under
// a key that holds a bool is a miss, not a type error.
//
// Children are owned, so the tree is acyclic by construction.

use std::collections::BTreeMap;

use crate::error::{KeygateError, Result};

/// A node of the metadata tree.
///
/// Scalar `add_*` calls overwrite by key; `append_*` calls push onto the
/// keyed array. `delete` removes a key from all five scalar maps.
#[derive(Debug, Default, Clone)]
pub struct PropertyTree {
    pub(crate) bools: BTreeMap<String, bool>,
    pub(crate) uints: BTreeMap<String, u64>,
    pub(crate) ints: BTreeMap<String, i64>,
    pub(crate) strings: BTreeMap<String, String>,
    pub(crate) nodes: BTreeMap<String, PropertyTree>,
    pub(crate) bool_arrays: BTreeMap<String, Vec<bool>>,
    pub(crate) uint_arrays: BTreeMap<String, Vec<u64>>,
    pub(crate) int_arrays: BTreeMap<String, Vec<i64>>,
    pub(crate) string_arrays: BTreeMap<String, Vec<String>>,
    pub(crate) node_arrays: BTreeMap<String, Vec<PropertyTree>>,
}

fn missing(kind: &str, key: &str) -> KeygateError {
    KeygateError::UnknownIdentifier(format!("no {} value under key '{}'", kind, key))
}

fn out_of_range(key: &str, index: usize, len: usize) -> KeygateError {
    KeygateError::InvalidArgument(format!(
        "index {} out of range for array '{}' of length {}",
        index, key, len
    ))
}

impl PropertyTree {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no value of any kind is stored in this node.
    pub fn is_empty(&self) -> bool {
        self.bools.is_empty()
            && self.uints.is_empty()
            && self.ints.is_empty()
            && self.strings.is_empty()
            && self.nodes.is_empty()
            && self.bool_arrays.is_empty()
            && self.uint_arrays.is_empty()
            && self.int_arrays.is_empty()
            && self.string_arrays.is_empty()
            && self.node_arrays.is_empty()
    }

    // ─── Scalar writers (overwrite by key) ───────────────────────────────────

    pub fn add_bool(&mut self, key: impl Into<String>, value: bool) {
        self.bools.insert(key.into(), value);
    }

    pub fn add_u64(&mut self, key: impl Into<String>, value: u64) {
        self.uints.insert(key.into(), value);
    }

    pub fn add_i64(&mut self, key: impl Into<String>, value: i64) {
        self.ints.insert(key.into(), value);
    }

    pub fn add_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.strings.insert(key.into(), value.into());
    }

    pub fn add_node(&mut self, key: impl Into<String>, child: PropertyTree) {
        self.nodes.insert(key.into(), child);
    }

    // ─── Array writers (append) ──────────────────────────────────────────────

    pub fn append_bool(&mut self, key: impl Into<String>, value: bool) {
        self.bool_arrays.entry(key.into()).or_default().push(value);
    }

    pub fn append_u64(&mut self, key: impl Into<String>, value: u64) {
        self.uint_arrays.entry(key.into()).or_default().push(value);
    }

    pub fn append_i64(&mut self, key: impl Into<String>, value: i64) {
        self.int_arrays.entry(key.into()).or_default().push(value);
    }

    pub fn append_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.string_arrays
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    pub fn append_node(&mut self, key: impl Into<String>, child: PropertyTree) {
        self.node_arrays.entry(key.into()).or_default().push(child);
    }

    // ─── Scalar readers ──────────────────────────────────────────────────────

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.bools.get(key).copied().ok_or_else(|| missing("bool", key))
    }

    pub fn get_u64(&self, key: &str) -> Result<u64> {
        self.uints
            .get(key)
            .copied()
            .ok_or_else(|| missing("unsigned", key))
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.ints
            .get(key)
            .copied()
            .ok_or_else(|| missing("signed", key))
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.strings
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| missing("string", key))
    }

    pub fn get_node(&self, key: &str) -> Result<&PropertyTree> {
        self.nodes.get(key).ok_or_else(|| missing("node", key))
    }

    // ─── Array readers ───────────────────────────────────────────────────────

    pub fn get_bool_array(&self, key: &str) -> Result<&[bool]> {
        self.bool_arrays
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| missing("bool array", key))
    }

    pub fn get_u64_array(&self, key: &str) -> Result<&[u64]> {
        self.uint_arrays
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| missing("unsigned array", key))
    }

    pub fn get_i64_array(&self, key: &str) -> Result<&[i64]> {
        self.int_arrays
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| missing("signed array", key))
    }

    pub fn get_str_array(&self, key: &str) -> Result<&[String]> {
        self.string_arrays
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| missing("string array", key))
    }

    pub fn get_node_array(&self, key: &str) -> Result<&[PropertyTree]> {
        self.node_arrays
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| missing("node array", key))
    }

    /// Indexed array access; an out-of-range index is a malformed argument,
    /// a missing key is an unknown identifier.
    pub fn get_u64_at(&self, key: &str, index: usize) -> Result<u64> {
        let values = self.get_u64_array(key)?;
        values
            .get(index)
            .copied()
            .ok_or_else(|| out_of_range(key, index, values.len()))
    }

    pub fn get_str_at(&self, key: &str, index: usize) -> Result<&str> {
        let values = self.get_str_array(key)?;
        values
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| out_of_range(key, index, values.len()))
    }

    pub fn get_node_at(&self, key: &str, index: usize) -> Result<&PropertyTree> {
        let values = self.get_node_array(key)?;
        values
            .get(index)
            .ok_or_else(|| out_of_range(key, index, values.len()))
    }

    // ─── Removal ─────────────────────────────────────────────────────────────

    /// Remove `key` from all five scalar maps. Removing a key that is absent
    /// everywhere is not an error.
    pub fn delete(&mut self, key: &str) {
        self.bools.remove(key);
        self.uints.remove(key);
        self.ints.remove(key);
        self.strings.remove(key);
        self.nodes.remove(key);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
