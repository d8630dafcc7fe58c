// Keygate — Property tree persistence
//
// JSON encoding of the metadata tree, shared by the message codec (payload
// transport) and the daemon's on-disk slot format. The document is sectioned
// by value kind so the encoding is lossless: a flat object could not tell a
// non-negative signed value from an unsigned one. Scalar sections hold plain
// values, `node` holds nested documents, and each `*_array` section mirrors
// its scalar kind.
//
// Raw byte buffers cross this boundary hex-encoded; 16-byte identifiers use
// the canonical lower-case hyphenated UUID form.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{KeygateError, Result};

use super::node::PropertyTree;
use super::walk::MAX_PAYLOAD_DEPTH;

const SECTION_BOOL: &str = "bool";
const SECTION_UINT: &str = "uint";
const SECTION_INT: &str = "int";
const SECTION_STR: &str = "str";
const SECTION_NODE: &str = "node";
const SECTION_BOOL_ARRAY: &str = "bool_array";
const SECTION_UINT_ARRAY: &str = "uint_array";
const SECTION_INT_ARRAY: &str = "int_array";
const SECTION_STR_ARRAY: &str = "str_array";
const SECTION_NODE_ARRAY: &str = "node_array";

impl PropertyTree {
    /// Encode this tree as a JSON value.
    pub fn to_json_value(&self) -> Value {
        let mut doc = Map::new();

        if !self.bools.is_empty() {
            let section: Map<String, Value> = self
                .bools
                .iter()
                .map(|(k, v)| (k.clone(), Value::Bool(*v)))
                .collect();
            doc.insert(SECTION_BOOL.into(), Value::Object(section));
        }
        if !self.uints.is_empty() {
            let section: Map<String, Value> = self
                .uints
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(*v)))
                .collect();
            doc.insert(SECTION_UINT.into(), Value::Object(section));
        }
        if !self.ints.is_empty() {
            let section: Map<String, Value> = self
                .ints
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(*v)))
                .collect();
            doc.insert(SECTION_INT.into(), Value::Object(section));
        }
        if !self.strings.is_empty() {
            let section: Map<String, Value> = self
                .strings
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            doc.insert(SECTION_STR.into(), Value::Object(section));
        }
        if !self.nodes.is_empty() {
            let section: Map<String, Value> = self
                .nodes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json_value()))
                .collect();
            doc.insert(SECTION_NODE.into(), Value::Object(section));
        }
        if !self.bool_arrays.is_empty() {
            let section: Map<String, Value> = self
                .bool_arrays
                .iter()
                .map(|(k, vs)| (k.clone(), Value::from(vs.clone())))
                .collect();
            doc.insert(SECTION_BOOL_ARRAY.into(), Value::Object(section));
        }
        if !self.uint_arrays.is_empty() {
            let section: Map<String, Value> = self
                .uint_arrays
                .iter()
                .map(|(k, vs)| (k.clone(), Value::from(vs.clone())))
                .collect();
            doc.insert(SECTION_UINT_ARRAY.into(), Value::Object(section));
        }
        if !self.int_arrays.is_empty() {
            let section: Map<String, Value> = self
                .int_arrays
                .iter()
                .map(|(k, vs)| (k.clone(), Value::from(vs.clone())))
                .collect();
            doc.insert(SECTION_INT_ARRAY.into(), Value::Object(section));
        }
        if !self.string_arrays.is_empty() {
            let section: Map<String, Value> = self
                .string_arrays
                .iter()
                .map(|(k, vs)| (k.clone(), Value::from(vs.clone())))
                .collect();
            doc.insert(SECTION_STR_ARRAY.into(), Value::Object(section));
        }
        if !self.node_arrays.is_empty() {
            let section: Map<String, Value> = self
                .node_arrays
                .iter()
                .map(|(k, vs)| {
                    let items: Vec<Value> = vs.iter().map(|v| v.to_json_value()).collect();
                    (k.clone(), Value::Array(items))
                })
                .collect();
            doc.insert(SECTION_NODE_ARRAY.into(), Value::Object(section));
        }

        Value::Object(doc)
    }

    /// Decode a tree from a JSON value produced by `to_json_value` (or by
    /// the daemon's persistence layer). Nesting is bounded by
    /// `MAX_PAYLOAD_DEPTH`; a deeper document is rejected as malformed.
    pub fn from_json_value(value: &Value) -> Result<Self> {
        node_from_value(value, 0)
    }

    /// Pretty-printed JSON document for this tree.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(&self.to_json_value())
            .unwrap_or_else(|_| String::from("{}"))
    }

    /// Parse a JSON document into a tree.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| KeygateError::InvalidArgument(format!("malformed JSON: {}", e)))?;
        Self::from_json_value(&value)
    }
}

fn node_from_value(value: &Value, depth: usize) -> Result<PropertyTree> {
    let doc = value
        .as_object()
        .ok_or_else(|| malformed("expected a JSON object at the node level"))?;

    let mut tree = PropertyTree::new();
    for (section, content) in doc {
        match section.as_str() {
            SECTION_BOOL => {
                for (key, v) in expect_object(content, section)? {
                    tree.add_bool(key.clone(), expect_bool(v, key)?);
                }
            }
            SECTION_UINT => {
                for (key, v) in expect_object(content, section)? {
                    tree.add_u64(key.clone(), expect_u64(v, key)?);
                }
            }
            SECTION_INT => {
                for (key, v) in expect_object(content, section)? {
                    tree.add_i64(key.clone(), expect_i64(v, key)?);
                }
            }
            SECTION_STR => {
                for (key, v) in expect_object(content, section)? {
                    tree.add_str(key.clone(), expect_str(v, key)?);
                }
            }
            SECTION_NODE => {
                for (key, v) in expect_object(content, section)? {
                    tree.add_node(key.clone(), child_from_value(v, depth)?);
                }
            }
            SECTION_BOOL_ARRAY => {
                for (key, v) in expect_object(content, section)? {
                    for item in expect_array(v, key)? {
                        tree.append_bool(key.clone(), expect_bool(item, key)?);
                    }
                }
            }
            SECTION_UINT_ARRAY => {
                for (key, v) in expect_object(content, section)? {
                    for item in expect_array(v, key)? {
                        tree.append_u64(key.clone(), expect_u64(item, key)?);
                    }
                }
            }
            SECTION_INT_ARRAY => {
                for (key, v) in expect_object(content, section)? {
                    for item in expect_array(v, key)? {
                        tree.append_i64(key.clone(), expect_i64(item, key)?);
                    }
                }
            }
            SECTION_STR_ARRAY => {
                for (key, v) in expect_object(content, section)? {
                    for item in expect_array(v, key)? {
                        tree.append_str(key.clone(), expect_str(item, key)?);
                    }
                }
            }
            SECTION_NODE_ARRAY => {
                for (key, v) in expect_object(content, section)? {
                    for item in expect_array(v, key)? {
                        tree.append_node(key.clone(), child_from_value(item, depth)?);
                    }
                }
            }
            unknown => {
                return Err(malformed(&format!("unknown section '{}'", unknown)));
            }
        }
    }
    Ok(tree)
}

fn child_from_value(value: &Value, parent_depth: usize) -> Result<PropertyTree> {
    if parent_depth >= MAX_PAYLOAD_DEPTH {
        return Err(malformed(&format!(
            "payload exceeds maximum nesting depth of {}",
            MAX_PAYLOAD_DEPTH
        )));
    }
    node_from_value(value, parent_depth + 1)
}

fn malformed(detail: &str) -> KeygateError {
    KeygateError::InvalidArgument(format!("malformed payload document: {}", detail))
}

fn expect_object<'a>(v: &'a Value, section: &str) -> Result<&'a Map<String, Value>> {
    v.as_object()
        .ok_or_else(|| malformed(&format!("section '{}' must be an object", section)))
}

fn expect_array<'a>(v: &'a Value, key: &str) -> Result<&'a Vec<Value>> {
    v.as_array()
        .ok_or_else(|| malformed(&format!("'{}' must be an array", key)))
}

fn expect_bool(v: &Value, key: &str) -> Result<bool> {
    v.as_bool()
        .ok_or_else(|| malformed(&format!("'{}' must be a bool", key)))
}

fn expect_u64(v: &Value, key: &str) -> Result<u64> {
    v.as_u64()
        .ok_or_else(|| malformed(&format!("'{}' must be an unsigned integer", key)))
}

fn expect_i64(v: &Value, key: &str) -> Result<i64> {
    v.as_i64()
        .ok_or_else(|| malformed(&format!("'{}' must be a signed integer", key)))
}

fn expect_str<'a>(v: &'a Value, key: &str) -> Result<&'a str> {
    v.as_str()
        .ok_or_else(|| malformed(&format!("'{}' must be a string", key)))
}

// ─── Byte & Identifier Encoding ──────────────────────────────────────────────

/// Hex-encode a raw byte buffer for transport, lower-case.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decode a lower- or upper-case hex string back into bytes.
pub fn hex_decode(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(KeygateError::InvalidArgument(format!(
            "hex string has odd length {}",
            text.len()
        )));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16).map_err(|_| {
                KeygateError::InvalidArgument(format!(
                    "invalid hex digits at offset {}",
                    i
                ))
            })
        })
        .collect()
}

/// Parse a canonical UUID string, reporting a malformed one as an invalid
/// argument. Formatting back always yields the canonical lower-case
/// hyphenated form (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`).
pub fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| KeygateError::InvalidArgument(format!("malformed UUID '{}': {}", text, e)))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
