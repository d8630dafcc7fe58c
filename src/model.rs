// Keygate — Slot and crypto object metadata models
//
// Client-side views of what the daemon stores per slot: content properties
// of the persisted object, prototype properties of the slot itself, actor
// permissions, and the crypto object identity (COUID). Each model converts
// to and from the `PropertyTree` payload shape that crosses the wire and is
// persisted on the daemon side.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{KeygateError, Result};
use crate::tree::{parse_uuid, PropertyTree};

// ─── Handles ─────────────────────────────────────────────────────────────────

/// Opaque handle identifying a persistent key slot on the daemon.
/// Stable for the lifetime of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotNumber(u64);

impl SlotNumber {
    /// Reserved sentinel: never names a real slot.
    pub const INVALID: SlotNumber = SlotNumber(u64::MAX);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != u64::MAX
    }
}

impl fmt::Display for SlotNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "<invalid>")
        }
    }
}

impl FromStr for SlotNumber {
    type Err = KeygateError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>()
            .map(SlotNumber::new)
            .map_err(|_| KeygateError::InvalidArgument(format!("malformed slot number '{}'", s)))
    }
}

/// Identifier of one multi-slot transaction. Unique per session lifetime;
/// never reused after the transaction resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

/// How a trusted container handle claims its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Exclusive read-write claim. At most one per slot.
    Owner,
    /// Shared read-only claim. Only on non-empty slots.
    User,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::Owner => "owner",
            AccessMode::User => "user",
        }
    }
}

// ─── Object Identity ─────────────────────────────────────────────────────────

/// Crypto Object Unique Identifier: the persistent identity of a storable
/// crypto object — the generator's 128-bit id plus a version stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoObjectUid {
    pub generator: Uuid,
    pub version_stamp: u64,
}

impl CryptoObjectUid {
    /// Payload shape: the generator id carried as four 32-bit groups in a
    /// nested node, plus the version stamp.
    pub fn to_tree(&self) -> PropertyTree {
        let bits = self.generator.as_u128();
        let mut generator = PropertyTree::new();
        generator.add_u64("q0", (bits >> 96) as u32 as u64);
        generator.add_u64("q1", (bits >> 64) as u32 as u64);
        generator.add_u64("q2", (bits >> 32) as u32 as u64);
        generator.add_u64("q3", bits as u32 as u64);

        let mut tree = PropertyTree::new();
        tree.add_node("generator", generator);
        tree.add_u64("version_stamp", self.version_stamp);
        tree
    }

    pub fn from_tree(tree: &PropertyTree) -> Result<Self> {
        let generator = tree.get_node("generator")?;
        let mut bits: u128 = 0;
        for key in ["q0", "q1", "q2", "q3"] {
            let group = generator.get_u64(key)?;
            if group > u32::MAX as u64 {
                return Err(KeygateError::InvalidArgument(format!(
                    "COUID group '{}' exceeds 32 bits: {}",
                    key, group
                )));
            }
            bits = (bits << 32) | group as u128;
        }
        Ok(Self {
            generator: Uuid::from_u128(bits),
            version_stamp: tree.get_u64("version_stamp")?,
        })
    }
}

impl fmt::Display for CryptoObjectUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.generator, self.version_stamp)
    }
}

// ─── Object & Slot Kinds ─────────────────────────────────────────────────────

/// Kind of crypto object stored in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Undefined,
    SymmetricKey,
    PrivateKey,
    PublicKey,
    Signature,
    SecretSeed,
}

impl ObjectType {
    pub fn code(self) -> u64 {
        match self {
            ObjectType::Undefined => 0,
            ObjectType::SymmetricKey => 1,
            ObjectType::PrivateKey => 2,
            ObjectType::PublicKey => 3,
            ObjectType::Signature => 4,
            ObjectType::SecretSeed => 5,
        }
    }

    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(ObjectType::Undefined),
            1 => Ok(ObjectType::SymmetricKey),
            2 => Ok(ObjectType::PrivateKey),
            3 => Ok(ObjectType::PublicKey),
            4 => Ok(ObjectType::Signature),
            5 => Ok(ObjectType::SecretSeed),
            other => Err(KeygateError::InvalidArgument(format!(
                "unknown object type code {}",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Undefined => "undefined",
            ObjectType::SymmetricKey => "symmetric-key",
            ObjectType::PrivateKey => "private-key",
            ObjectType::PublicKey => "public-key",
            ObjectType::Signature => "signature",
            ObjectType::SecretSeed => "secret-seed",
        }
    }
}

/// Deployment scope of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    /// Owned by one application's functional cluster.
    Application,
    /// Owned by the machine / stack updater.
    Machine,
}

impl SlotType {
    pub fn code(self) -> u64 {
        match self {
            SlotType::Application => 1,
            SlotType::Machine => 2,
        }
    }

    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            1 => Ok(SlotType::Application),
            2 => Ok(SlotType::Machine),
            other => Err(KeygateError::InvalidArgument(format!(
                "unknown slot type code {}",
                other
            ))),
        }
    }
}

/// Allowed-usage bit flags carried in prototype properties and user
/// permission entries.
pub mod usage {
    pub const ENCRYPT: u64 = 1 << 0;
    pub const DECRYPT: u64 = 1 << 1;
    pub const SIGN: u64 = 1 << 2;
    pub const VERIFY: u64 = 1 << 3;
    pub const KEY_AGREEMENT: u64 = 1 << 4;
    pub const KEY_DERIVATION: u64 = 1 << 5;
}

// ─── Properties ──────────────────────────────────────────────────────────────

/// Properties of the object currently stored in a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentProps {
    pub object_type: ObjectType,
    pub object_uid: CryptoObjectUid,
    pub object_size: u64,
    pub is_exportable: bool,
    /// Session objects live only as long as the producing session and are
    /// not persistable.
    pub is_session: bool,
}

impl ContentProps {
    pub fn to_tree(&self) -> PropertyTree {
        let mut tree = PropertyTree::new();
        tree.add_u64("object_type", self.object_type.code());
        tree.add_node("object_uid", self.object_uid.to_tree());
        tree.add_u64("object_size", self.object_size);
        tree.add_bool("exportable", self.is_exportable);
        tree.add_bool("session", self.is_session);
        tree
    }

    pub fn from_tree(tree: &PropertyTree) -> Result<Self> {
        Ok(Self {
            object_type: ObjectType::from_code(tree.get_u64("object_type")?)?,
            object_uid: CryptoObjectUid::from_tree(tree.get_node("object_uid")?)?,
            object_size: tree.get_u64("object_size")?,
            is_exportable: tree.get_bool("exportable")?,
            is_session: tree.get_bool("session")?,
        })
    }
}

/// Prototype properties of a slot: what the slot is allowed to hold,
/// fixed at store deployment time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrototypeProps {
    pub slot_type: SlotType,
    pub object_type: ObjectType,
    pub alg_id: u64,
    pub max_object_size: u64,
    pub allowed_usage: u64,
    pub is_exportable: bool,
}

impl PrototypeProps {
    pub fn to_tree(&self) -> PropertyTree {
        let mut tree = PropertyTree::new();
        tree.add_u64("slot_type", self.slot_type.code());
        tree.add_u64("object_type", self.object_type.code());
        tree.add_u64("alg_id", self.alg_id);
        tree.add_u64("max_object_size", self.max_object_size);
        tree.add_u64("allowed_usage", self.allowed_usage);
        tree.add_bool("exportable", self.is_exportable);
        tree
    }

    pub fn from_tree(tree: &PropertyTree) -> Result<Self> {
        Ok(Self {
            slot_type: SlotType::from_code(tree.get_u64("slot_type")?)?,
            object_type: ObjectType::from_code(tree.get_u64("object_type")?)?,
            alg_id: tree.get_u64("alg_id")?,
            max_object_size: tree.get_u64("max_object_size")?,
            allowed_usage: tree.get_u64("allowed_usage")?,
            is_exportable: tree.get_bool("exportable")?,
        })
    }
}

/// One User actor's permission entry on a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPermission {
    pub actor: Uuid,
    pub allowed_usage: u64,
}

impl UserPermission {
    pub fn to_tree(&self) -> PropertyTree {
        let mut tree = PropertyTree::new();
        tree.add_str("actor", self.actor.to_string());
        tree.add_u64("allowed_usage", self.allowed_usage);
        tree
    }

    pub fn from_tree(tree: &PropertyTree) -> Result<Self> {
        Ok(Self {
            actor: parse_uuid(tree.get_str("actor")?)?,
            allowed_usage: tree.get_u64("allowed_usage")?,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
