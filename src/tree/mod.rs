// Keygate — Metadata tree module
//
// The recursive keyed value tree exchanged with the daemon and persisted by
// it: typed storage, bounded wipe/compare traversal, JSON encoding.

mod json;
mod node;
mod walk;

pub use json::{hex_decode, hex_encode, parse_uuid};
pub use node::PropertyTree;
pub use walk::{Comparison, MAX_PAYLOAD_DEPTH};
