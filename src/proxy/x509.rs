// Keygate — X.509 Provider proxy
//
// Interface-only collaborator: certificate structural parsing lives behind
// the daemon, this proxy just moves DER blobs across the channel.
// Deployments without an X.509 backend answer every operation with
// Unsupported.

use std::sync::{Arc, Weak};

use serde_json::{json, Value};

use crate::error::{KeygateError, Result};
use crate::model::SlotNumber;
use crate::session::SessionAccess;
use crate::tree::hex_encode;

use super::codec::{self, op, RpcCall};

/// The provider contract for certificate storage access.
pub trait X509Provider {
    /// Hand a DER-encoded certificate to the daemon for storage; returns
    /// the slot it was persisted into.
    fn import_certificate(&self, der: &[u8]) -> Result<SlotNumber>;

    /// Remove a previously imported certificate.
    fn remove_certificate(&self, slot: SlotNumber) -> Result<()>;
}

/// Concrete proxy over the session channel.
#[derive(Debug)]
pub struct X509Proxy {
    session: Weak<dyn SessionAccess>,
}

impl X509Proxy {
    pub fn new(session: Weak<dyn SessionAccess>) -> Self {
        Self { session }
    }

    fn session(&self) -> Result<Arc<dyn SessionAccess>> {
        self.session.upgrade().ok_or_else(|| {
            KeygateError::InvalidUsageOrder("the session handler no longer exists".to_string())
        })
    }

    fn call(&self, method: &'static str, params: Value) -> Result<Value> {
        let session = self.session()?;
        let transporter = session.transporter()?;
        let response = transporter.round_trip(RpcCall { method, params })?;
        codec::decode_result(response)
    }
}

impl X509Provider for X509Proxy {
    fn import_certificate(&self, der: &[u8]) -> Result<SlotNumber> {
        if der.is_empty() {
            return Err(KeygateError::InvalidArgument(
                "certificate DER must not be empty".to_string(),
            ));
        }
        let result = self.call(op::X509_IMPORT, json!({ "der": hex_encode(der) }))?;
        let number = result.get("slot").and_then(Value::as_u64).ok_or_else(|| {
            KeygateError::RuntimeFault("response is missing the slot number".to_string())
        })?;
        Ok(SlotNumber::new(number))
    }

    fn remove_certificate(&self, slot: SlotNumber) -> Result<()> {
        if !slot.is_valid() {
            return Err(KeygateError::InvalidArgument(
                "the invalid slot sentinel names no slot".to_string(),
            ));
        }
        self.call(op::X509_REMOVE, json!({ "slot": slot.value() }))?;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
