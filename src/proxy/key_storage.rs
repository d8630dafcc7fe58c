// Keygate — Key Storage Provider proxy
//
// The request/response surface for slot operations, transactions, and
// observer registration. The proxy is a stateless wrapper over the session
// channel; every operation validates its local arguments, serializes the
// operation id and arguments, blocks for the correlated response, checks
// the status, and maps the payload. Slot ownership is the daemon's
// authority — no claim is assumed successful without a positive round trip.

use std::sync::{Arc, Weak};

use serde_json::{json, Value};

use crate::error::{KeygateError, Result};
use crate::model::{AccessMode, ContentProps, CryptoObjectUid, PrototypeProps, SlotNumber,
    TransactionId};
use crate::session::{SessionAccess, Transporter};
use crate::tree::{parse_uuid, PropertyTree};

use super::codec::{self, op, RpcCall};
use super::observer::UpdatesObserver;

/// The provider contract for remote key slot access.
pub trait KeyStorageProvider {
    /// Locate the slot holding the object with the given identity.
    fn find_slot(&self, uid: &CryptoObjectUid) -> Result<SlotNumber>;

    /// Whether the slot currently holds no object.
    fn is_empty(&self, slot: SlotNumber) -> Result<bool>;

    /// Claim shared read access to a non-empty slot. With `subscribe`, the
    /// slot joins the registered observer's watch set.
    fn open_as_user(&self, slot: SlotNumber, subscribe: bool) -> Result<TrustedContainer>;

    /// Claim exclusive write access to a slot.
    fn open_as_owner(&self, slot: SlotNumber) -> Result<TrustedContainer>;

    /// Persist a copy of the object described by `payload` into `slot`,
    /// optionally recording a reference to another slot.
    fn save_copy(
        &self,
        slot: SlotNumber,
        payload: &PropertyTree,
        referenced: Option<SlotNumber>,
    ) -> Result<()>;

    /// Securely and irreversibly erase the slot's content.
    fn clear(&self, slot: SlotNumber) -> Result<()>;

    fn get_content_props(&self, slot: SlotNumber) -> Result<ContentProps>;

    fn get_prototyped_props(&self, slot: SlotNumber) -> Result<PrototypeProps>;

    fn get_default_crypto_provider_uid(&self, slot: SlotNumber) -> Result<Option<uuid::Uuid>>;

    fn get_owner(&self, slot: SlotNumber) -> Result<uuid::Uuid>;

    /// Open a transaction over a fixed, non-empty set of slots.
    fn begin_transaction(&self, scope: &[SlotNumber]) -> Result<TransactionId>;

    fn commit_transaction(&self, transaction: TransactionId) -> Result<()>;

    fn rollback_transaction(&self, transaction: TransactionId) -> Result<()>;

    /// Install (or, with `None`, remove) the process-wide updates observer,
    /// returning the previously registered one.
    fn register_observer(
        &self,
        observer: Option<Box<dyn UpdatesObserver>>,
    ) -> Result<Option<Box<dyn UpdatesObserver>>>;

    /// Remove one slot from the observer's watch set.
    fn unsubscribe(&self, slot: SlotNumber) -> Result<()>;

    /// Paginate over slots whose stored object references `target`. Pass
    /// the previously found slot as the continuation cursor; `None` means
    /// the result set is exhausted.
    fn find_referring_slot(
        &self,
        target: SlotNumber,
        previous: Option<SlotNumber>,
    ) -> Result<Option<SlotNumber>>;
}

/// Concrete proxy over the session channel.
#[derive(Debug)]
pub struct KeyStorageProxy {
    session: Weak<dyn SessionAccess>,
}

impl KeyStorageProxy {
    pub fn new(session: Weak<dyn SessionAccess>) -> Self {
        Self { session }
    }

    fn session(&self) -> Result<Arc<dyn SessionAccess>> {
        self.session.upgrade().ok_or_else(|| {
            KeygateError::InvalidUsageOrder("the session handler no longer exists".to_string())
        })
    }

    /// One blocking round trip: send, await the correlated response, check
    /// the status, hand back the payload.
    fn call(&self, method: &'static str, params: Value) -> Result<Value> {
        let session = self.session()?;
        let transporter = session.transporter()?;
        let response = transporter.round_trip(RpcCall { method, params })?;
        codec::decode_result(response)
    }
}

fn require_valid(slot: SlotNumber) -> Result<()> {
    if !slot.is_valid() {
        return Err(KeygateError::InvalidArgument(
            "the invalid slot sentinel names no slot".to_string(),
        ));
    }
    Ok(())
}

fn u64_field(result: &Value, key: &str) -> Result<u64> {
    result.get(key).and_then(Value::as_u64).ok_or_else(|| {
        KeygateError::RuntimeFault(format!("response is missing the '{}' field", key))
    })
}

fn bool_field(result: &Value, key: &str) -> Result<bool> {
    result.get(key).and_then(Value::as_bool).ok_or_else(|| {
        KeygateError::RuntimeFault(format!("response is missing the '{}' field", key))
    })
}

fn payload_field(result: &Value) -> Result<PropertyTree> {
    let value = result
        .get("payload")
        .ok_or_else(|| KeygateError::RuntimeFault("response is missing 'payload'".to_string()))?;
    PropertyTree::from_json_value(value)
        .map_err(|e| KeygateError::RuntimeFault(format!("malformed response payload: {}", e)))
}

impl KeyStorageProvider for KeyStorageProxy {
    fn find_slot(&self, uid: &CryptoObjectUid) -> Result<SlotNumber> {
        let result = self.call(
            op::FIND_SLOT,
            json!({ "uid": uid.to_tree().to_json_value() }),
        )?;
        Ok(SlotNumber::new(u64_field(&result, "slot")?))
    }

    fn is_empty(&self, slot: SlotNumber) -> Result<bool> {
        require_valid(slot)?;
        let result = self.call(op::IS_EMPTY, json!({ "slot": slot.value() }))?;
        bool_field(&result, "empty")
    }

    fn open_as_user(&self, slot: SlotNumber, subscribe: bool) -> Result<TrustedContainer> {
        require_valid(slot)?;
        let session = self.session()?;
        let transporter = session.transporter()?;
        let response = transporter.round_trip(RpcCall {
            method: op::OPEN_AS_USER,
            params: json!({ "slot": slot.value(), "subscribe": subscribe }),
        })?;
        codec::decode_result(response)?;
        Ok(TrustedContainer::new(slot, AccessMode::User, transporter))
    }

    fn open_as_owner(&self, slot: SlotNumber) -> Result<TrustedContainer> {
        require_valid(slot)?;
        let session = self.session()?;
        let transporter = session.transporter()?;
        let response = transporter.round_trip(RpcCall {
            method: op::OPEN_AS_OWNER,
            params: json!({ "slot": slot.value() }),
        })?;
        codec::decode_result(response)?;
        Ok(TrustedContainer::new(slot, AccessMode::Owner, transporter))
    }

    fn save_copy(
        &self,
        slot: SlotNumber,
        payload: &PropertyTree,
        referenced: Option<SlotNumber>,
    ) -> Result<()> {
        require_valid(slot)?;
        if payload.is_empty() {
            // Fail fast: an empty source container can never be persisted.
            return Err(KeygateError::EmptyContainer);
        }
        if let Some(r) = referenced {
            require_valid(r)?;
        }
        let mut params = json!({
            "slot": slot.value(),
            "payload": payload.to_json_value(),
        });
        if let Some(r) = referenced {
            params["referenced"] = json!(r.value());
        }
        self.call(op::SAVE_COPY, params)?;
        Ok(())
    }

    fn clear(&self, slot: SlotNumber) -> Result<()> {
        require_valid(slot)?;
        self.call(op::CLEAR_SLOT, json!({ "slot": slot.value() }))?;
        Ok(())
    }

    fn get_content_props(&self, slot: SlotNumber) -> Result<ContentProps> {
        require_valid(slot)?;
        let result = self.call(op::GET_CONTENT_PROPS, json!({ "slot": slot.value() }))?;
        let tree = payload_field(&result)?;
        ContentProps::from_tree(&tree)
            .map_err(|e| KeygateError::RuntimeFault(format!("malformed content props: {}", e)))
    }

    fn get_prototyped_props(&self, slot: SlotNumber) -> Result<PrototypeProps> {
        require_valid(slot)?;
        let result = self.call(op::GET_PROTOTYPED_PROPS, json!({ "slot": slot.value() }))?;
        let tree = payload_field(&result)?;
        PrototypeProps::from_tree(&tree)
            .map_err(|e| KeygateError::RuntimeFault(format!("malformed prototype props: {}", e)))
    }

    fn get_default_crypto_provider_uid(&self, slot: SlotNumber) -> Result<Option<uuid::Uuid>> {
        require_valid(slot)?;
        let result = self.call(
            op::GET_DEFAULT_CRYPTO_PROVIDER_UID,
            json!({ "slot": slot.value() }),
        )?;
        match result.get("uid") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(parse_uuid(text)?)),
            Some(other) => Err(KeygateError::RuntimeFault(format!(
                "malformed provider uid in response: {}",
                other
            ))),
        }
    }

    fn get_owner(&self, slot: SlotNumber) -> Result<uuid::Uuid> {
        require_valid(slot)?;
        let result = self.call(op::GET_OWNER, json!({ "slot": slot.value() }))?;
        let text = result.get("uid").and_then(Value::as_str).ok_or_else(|| {
            KeygateError::RuntimeFault("response is missing the owner uid".to_string())
        })?;
        parse_uuid(text)
    }

    fn begin_transaction(&self, scope: &[SlotNumber]) -> Result<TransactionId> {
        if scope.is_empty() {
            return Err(KeygateError::InvalidArgument(
                "transaction scope must not be empty".to_string(),
            ));
        }
        for slot in scope {
            require_valid(*slot)?;
        }
        let numbers: Vec<u64> = scope.iter().map(|s| s.value()).collect();
        let result = self.call(op::BEGIN_TRANSACTION, json!({ "scope": numbers }))?;
        Ok(TransactionId::new(u64_field(&result, "transaction")?))
    }

    fn commit_transaction(&self, transaction: TransactionId) -> Result<()> {
        self.call(
            op::COMMIT_TRANSACTION,
            json!({ "transaction": transaction.value() }),
        )?;
        Ok(())
    }

    fn rollback_transaction(&self, transaction: TransactionId) -> Result<()> {
        self.call(
            op::ROLLBACK_TRANSACTION,
            json!({ "transaction": transaction.value() }),
        )?;
        Ok(())
    }

    fn register_observer(
        &self,
        observer: Option<Box<dyn UpdatesObserver>>,
    ) -> Result<Option<Box<dyn UpdatesObserver>>> {
        let session = self.session()?;
        // The daemon acknowledges first; only then is the local registration
        // swapped, so a failed round trip leaves the old observer in place.
        self.call(
            op::REGISTER_OBSERVER,
            json!({ "enabled": observer.is_some() }),
        )?;
        Ok(session.observer_cell().replace(observer))
    }

    fn unsubscribe(&self, slot: SlotNumber) -> Result<()> {
        require_valid(slot)?;
        self.call(op::UNSUBSCRIBE_SLOT, json!({ "slot": slot.value() }))?;
        Ok(())
    }

    fn find_referring_slot(
        &self,
        target: SlotNumber,
        previous: Option<SlotNumber>,
    ) -> Result<Option<SlotNumber>> {
        require_valid(target)?;
        let mut params = json!({ "target": target.value() });
        if let Some(p) = previous {
            require_valid(p)?;
            params["previous"] = json!(p.value());
        }
        let result = self.call(op::FIND_REFERRING_SLOT, params)?;
        match result.get("slot") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                let number = value.as_u64().ok_or_else(|| {
                    KeygateError::RuntimeFault("malformed slot number in response".to_string())
                })?;
                Ok(Some(SlotNumber::new(number)))
            }
        }
    }
}

// ─── Trusted Container ───────────────────────────────────────────────────────

/// A scoped capability referencing one open slot, as Owner (exclusive,
/// read-write) or User (shared, read-only).
///
/// The server-side claim is released when the handle goes out of scope, on
/// every exit path. Dropping cannot report a failed release; callers that
/// need to observe it use `release()` instead.
pub struct TrustedContainer {
    slot: SlotNumber,
    access: AccessMode,
    transporter: Arc<dyn Transporter>,
    released: bool,
}

impl TrustedContainer {
    fn new(slot: SlotNumber, access: AccessMode, transporter: Arc<dyn Transporter>) -> Self {
        Self {
            slot,
            access,
            transporter,
            released: false,
        }
    }

    pub fn slot(&self) -> SlotNumber {
        self.slot
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// Explicitly release the claim, reporting a failed round trip.
    pub fn release(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let response = self.transporter.round_trip(RpcCall {
            method: op::CLOSE_SLOT,
            params: json!({
                "slot": self.slot.value(),
                "access": self.access.as_str(),
            }),
        })?;
        codec::decode_result(response)?;
        Ok(())
    }
}

impl Drop for TrustedContainer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(slot = %self.slot, "failed to release slot claim: {}", e);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
