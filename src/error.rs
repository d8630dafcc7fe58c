// Keygate — Access error catalog
//
// Every fallible operation in the crate returns a `KeygateError` drawn from
// this fixed catalog. Server-reported faults arrive as wire codes in the
// RPC error member and are mapped back through `from_wire`; local faults
// (IO, serialization) fold into `RuntimeFault`.

use thiserror::Error;

use crate::model::SlotNumber;

/// Unified Result type for all Keygate operations.
pub type Result<T> = std::result::Result<T, KeygateError>;

/// The fixed error catalog of the key storage access layer.
#[derive(Debug, Error)]
pub enum KeygateError {
    /// Operation attempted before required setup, e.g. using the store
    /// before the session is connected.
    #[error("Invalid usage order: {0}")]
    InvalidUsageOrder(String),

    /// Malformed input, e.g. a malformed UUID string or an out-of-range
    /// array index.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A container lookup missed: the key is absent from the requested
    /// value-kind map.
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    /// The target slot does not exist.
    #[error("Unreserved resource: slot {0}")]
    UnreservedResource(SlotNumber),

    /// The operation requires non-empty content but found none.
    #[error("Empty container")]
    EmptyContainer,

    /// An exclusive claim is already held on the resource.
    #[error("Busy resource")]
    BusyResource,

    /// The object is already persisted elsewhere.
    #[error("Content duplication")]
    ContentDuplication,

    /// The object violates the slot's prototype constraints.
    #[error("Content restrictions: {0}")]
    ContentRestrictions(String),

    /// Type, algorithm, or session-flag mismatch.
    #[error("Incompatible object: {0}")]
    IncompatibleObject(String),

    /// Invalid cross-slot reference.
    #[error("Bad object reference: {0}")]
    BadObjectReference(String),

    /// The destination slot is too small for the object.
    #[error("Insufficient capacity: required {required}, available {available}")]
    InsufficientCapacity { required: u64, available: u64 },

    /// Unexpected server or channel failure.
    #[error("Runtime fault: {0}")]
    RuntimeFault(String),

    /// The operation is not implemented by this deployment.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

// ─── Wire Codes ──────────────────────────────────────────────────────────────

// The daemon reports catalog errors in a dedicated code block below the
// standard JSON-RPC range, one code per catalog entry.
pub const CODE_INVALID_USAGE_ORDER: i32 = -33001;
pub const CODE_INVALID_ARGUMENT: i32 = -33002;
pub const CODE_UNKNOWN_IDENTIFIER: i32 = -33003;
pub const CODE_UNRESERVED_RESOURCE: i32 = -33004;
pub const CODE_EMPTY_CONTAINER: i32 = -33005;
pub const CODE_BUSY_RESOURCE: i32 = -33006;
pub const CODE_CONTENT_DUPLICATION: i32 = -33007;
pub const CODE_CONTENT_RESTRICTIONS: i32 = -33008;
pub const CODE_INCOMPATIBLE_OBJECT: i32 = -33009;
pub const CODE_BAD_OBJECT_REFERENCE: i32 = -33010;
pub const CODE_INSUFFICIENT_CAPACITY: i32 = -33011;
pub const CODE_RUNTIME_FAULT: i32 = -33012;
pub const CODE_UNSUPPORTED: i32 = -33013;

impl KeygateError {
    /// The wire code the daemon uses to report this error.
    pub fn wire_code(&self) -> i32 {
        match self {
            Self::InvalidUsageOrder(_) => CODE_INVALID_USAGE_ORDER,
            Self::InvalidArgument(_) => CODE_INVALID_ARGUMENT,
            Self::UnknownIdentifier(_) => CODE_UNKNOWN_IDENTIFIER,
            Self::UnreservedResource(_) => CODE_UNRESERVED_RESOURCE,
            Self::EmptyContainer => CODE_EMPTY_CONTAINER,
            Self::BusyResource => CODE_BUSY_RESOURCE,
            Self::ContentDuplication => CODE_CONTENT_DUPLICATION,
            Self::ContentRestrictions(_) => CODE_CONTENT_RESTRICTIONS,
            Self::IncompatibleObject(_) => CODE_INCOMPATIBLE_OBJECT,
            Self::BadObjectReference(_) => CODE_BAD_OBJECT_REFERENCE,
            Self::InsufficientCapacity { .. } => CODE_INSUFFICIENT_CAPACITY,
            Self::RuntimeFault(_) => CODE_RUNTIME_FAULT,
            Self::Unsupported(_) => CODE_UNSUPPORTED,
        }
    }

    /// Rebuild a catalog error from a wire code and message.
    ///
    /// Structured fields lost in transit (slot numbers, capacity figures)
    /// survive only in the message text; an unknown code is a channel-level
    /// failure and maps to `RuntimeFault`.
    pub fn from_wire(code: i32, message: &str) -> Self {
        match code {
            CODE_INVALID_USAGE_ORDER => Self::InvalidUsageOrder(message.to_string()),
            CODE_INVALID_ARGUMENT => Self::InvalidArgument(message.to_string()),
            CODE_UNKNOWN_IDENTIFIER => Self::UnknownIdentifier(message.to_string()),
            CODE_UNRESERVED_RESOURCE => Self::UnreservedResource(SlotNumber::INVALID),
            CODE_EMPTY_CONTAINER => Self::EmptyContainer,
            CODE_BUSY_RESOURCE => Self::BusyResource,
            CODE_CONTENT_DUPLICATION => Self::ContentDuplication,
            CODE_CONTENT_RESTRICTIONS => Self::ContentRestrictions(message.to_string()),
            CODE_INCOMPATIBLE_OBJECT => Self::IncompatibleObject(message.to_string()),
            CODE_BAD_OBJECT_REFERENCE => Self::BadObjectReference(message.to_string()),
            CODE_INSUFFICIENT_CAPACITY => Self::InsufficientCapacity {
                required: 0,
                available: 0,
            },
            CODE_RUNTIME_FAULT => Self::RuntimeFault(message.to_string()),
            CODE_UNSUPPORTED => Self::Unsupported(message.to_string()),
            _ => Self::RuntimeFault(format!("server error {}: {}", code, message)),
        }
    }
}

impl From<std::io::Error> for KeygateError {
    fn from(e: std::io::Error) -> Self {
        Self::RuntimeFault(format!("IO error: {}", e))
    }
}

impl From<serde_json::Error> for KeygateError {
    fn from(e: serde_json::Error) -> Self {
        Self::RuntimeFault(format!("JSON error: {}", e))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
