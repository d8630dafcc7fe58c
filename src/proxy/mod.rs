// Keygate — Provider Proxies
//
// The request/response API surfaces over the session channel: the key
// storage provider (slots, transactions, observers), the X.509 provider,
// the message codec, and the observer registration cell.

pub mod codec;
mod key_storage;
pub mod observer;
mod x509;

pub use key_storage::{KeyStorageProvider, KeyStorageProxy, TrustedContainer};
pub use observer::{ObserverCell, UpdatesObserver};
pub use x509::{X509Provider, X509Proxy};
