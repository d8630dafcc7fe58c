// Keygate — Library root
//
// Client access layer for the keygate key slot daemon: session handling,
// provider proxies, and the metadata tree exchanged with the store.

pub mod cli;
pub mod error;
pub mod model;
pub mod proxy;
pub mod session;
pub mod tree;

pub use error::{KeygateError, Result};
pub use model::{
    AccessMode, ContentProps, CryptoObjectUid, ObjectType, PrototypeProps, SlotNumber,
    SlotType, TransactionId, UserPermission,
};
pub use proxy::{KeyStorageProvider, TrustedContainer, UpdatesObserver};
pub use session::{SessionConfig, SessionHandler};
pub use tree::{Comparison, PropertyTree, MAX_PAYLOAD_DEPTH};
