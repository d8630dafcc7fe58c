// Keygate — In-memory daemon for tests
//
// A synchronous stand-in for the key storage daemon, implementing the
// server-authoritative slot and transaction state machine so the proxy can
// be exercised end to end without a socket. Dispatch mirrors the wire
// protocol: one request in, one correlated response out.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use crate::error::{KeygateError, Result};
use crate::model::{ContentProps, PrototypeProps, SlotNumber};
use crate::proxy::codec::{self, op, RpcCall, RpcRequest, RpcResponse};
use crate::proxy::observer::ObserverCell;
use crate::tree::{PropertyTree, MAX_PAYLOAD_DEPTH};

use super::handler::SessionAccess;
use super::transport::Transporter;

/// One slot of the in-memory store.
pub(crate) struct SlotRecord {
    pub prototype: PrototypeProps,
    pub owner_uid: Uuid,
    pub default_provider_uid: Option<Uuid>,
    pub payload: Option<PropertyTree>,
    /// Outgoing reference carried by the stored object.
    pub reference: Option<u64>,
    /// Incoming references from other slots.
    pub ref_count: u64,
    owner_open: bool,
    user_open: u64,
}

impl SlotRecord {
    pub fn new(prototype: PrototypeProps) -> Self {
        Self {
            prototype,
            owner_uid: Uuid::new_v4(),
            default_provider_uid: None,
            payload: None,
            reference: None,
            ref_count: 0,
            owner_open: false,
            user_open: 0,
        }
    }
}

struct SlotSnapshot {
    payload: Option<PropertyTree>,
    reference: Option<u64>,
    ref_count: u64,
}

struct TxRecord {
    snapshots: BTreeMap<u64, SlotSnapshot>,
}

#[derive(Default)]
struct StoreState {
    slots: BTreeMap<u64, SlotRecord>,
    transactions: HashMap<u64, TxRecord>,
    resolved_transactions: HashSet<u64>,
    next_transaction: u64,
    observer_registered: bool,
    watched: BTreeSet<u64>,
}

/// The in-memory daemon.
#[derive(Default)]
pub(crate) struct MockStore {
    state: Mutex<StoreState>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_slot(&self, slot: SlotNumber, record: SlotRecord) {
        self.state
            .lock()
            .unwrap()
            .slots
            .insert(slot.value(), record);
    }

    pub fn ref_count(&self, slot: SlotNumber) -> u64 {
        self.state.lock().unwrap().slots[&slot.value()].ref_count
    }

    pub fn is_watched(&self, slot: SlotNumber) -> bool {
        self.state.lock().unwrap().watched.contains(&slot.value())
    }

    /// Handle one request the way the daemon would.
    pub fn handle(&self, request: &RpcRequest) -> RpcResponse {
        if let Err(e) = request.validate() {
            return RpcResponse::error(request.id, codec::INVALID_REQUEST, e);
        }

        let mut state = self.state.lock().unwrap();
        let outcome = match request.method.as_str() {
            op::FIND_SLOT => handle_find_slot(&state, &request.params),
            op::IS_EMPTY => handle_is_empty(&state, &request.params),
            op::OPEN_AS_USER => handle_open_as_user(&mut state, &request.params),
            op::OPEN_AS_OWNER => handle_open_as_owner(&mut state, &request.params),
            op::CLOSE_SLOT => handle_close_slot(&mut state, &request.params),
            op::SAVE_COPY => handle_save_copy(&mut state, &request.params),
            op::CLEAR_SLOT => handle_clear_slot(&mut state, &request.params),
            op::GET_CONTENT_PROPS => handle_get_content_props(&state, &request.params),
            op::GET_PROTOTYPED_PROPS => handle_get_prototyped_props(&state, &request.params),
            op::GET_DEFAULT_CRYPTO_PROVIDER_UID => {
                handle_get_default_provider(&state, &request.params)
            }
            op::GET_OWNER => handle_get_owner(&state, &request.params),
            op::BEGIN_TRANSACTION => handle_begin_transaction(&mut state, &request.params),
            op::COMMIT_TRANSACTION => handle_commit_transaction(&mut state, &request.params),
            op::ROLLBACK_TRANSACTION => handle_rollback_transaction(&mut state, &request.params),
            op::REGISTER_OBSERVER => handle_register_observer(&mut state, &request.params),
            op::UNSUBSCRIBE_SLOT => handle_unsubscribe_slot(&mut state, &request.params),
            op::FIND_REFERRING_SLOT => handle_find_referring_slot(&state, &request.params),
            op::X509_IMPORT | op::X509_REMOVE => Err(KeygateError::Unsupported(
                "no X.509 backend in this deployment".to_string(),
            )),
            other => {
                return RpcResponse::error(
                    request.id,
                    codec::METHOD_NOT_FOUND,
                    format!("Unknown method: {}", other),
                )
            }
        };

        match outcome {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(e) => RpcResponse::fault(request.id, &e),
        }
    }
}

// ─── Param Helpers ───────────────────────────────────────────────────────────

fn param_u64(params: &Value, key: &str) -> Result<u64> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| KeygateError::InvalidArgument(format!("missing '{}'", key)))
}

fn param_bool_or(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn slot_ref<'a>(state: &'a StoreState, number: u64) -> Result<&'a SlotRecord> {
    state
        .slots
        .get(&number)
        .ok_or(KeygateError::UnreservedResource(SlotNumber::new(number)))
}

fn slot_mut<'a>(state: &'a mut StoreState, number: u64) -> Result<&'a mut SlotRecord> {
    state
        .slots
        .get_mut(&number)
        .ok_or(KeygateError::UnreservedResource(SlotNumber::new(number)))
}

fn content_props_of(record: &SlotRecord) -> Option<ContentProps> {
    record
        .payload
        .as_ref()
        .and_then(|tree| ContentProps::from_tree(tree).ok())
}

// ─── Method Handlers ─────────────────────────────────────────────────────────

fn handle_find_slot(state: &StoreState, params: &Value) -> Result<Value> {
    let uid_value = params
        .get("uid")
        .ok_or_else(|| KeygateError::InvalidArgument("missing 'uid'".to_string()))?;
    let uid_tree = PropertyTree::from_json_value(uid_value)?;
    let uid = crate::model::CryptoObjectUid::from_tree(&uid_tree)?;

    for (number, record) in &state.slots {
        if let Some(props) = content_props_of(record) {
            if props.object_uid == uid {
                return Ok(serde_json::json!({ "slot": number }));
            }
        }
    }
    Err(KeygateError::UnreservedResource(SlotNumber::INVALID))
}

fn handle_is_empty(state: &StoreState, params: &Value) -> Result<Value> {
    let record = slot_ref(state, param_u64(params, "slot")?)?;
    Ok(serde_json::json!({ "empty": record.payload.is_none() }))
}

fn handle_open_as_user(state: &mut StoreState, params: &Value) -> Result<Value> {
    let number = param_u64(params, "slot")?;
    let subscribe = param_bool_or(params, "subscribe", false);
    let observer_registered = state.observer_registered;

    let record = slot_mut(state, number)?;
    if record.payload.is_none() {
        return Err(KeygateError::EmptyContainer);
    }
    record.user_open += 1;
    if subscribe && observer_registered {
        state.watched.insert(number);
    }
    Ok(serde_json::json!({}))
}

fn handle_open_as_owner(state: &mut StoreState, params: &Value) -> Result<Value> {
    let record = slot_mut(state, param_u64(params, "slot")?)?;
    if record.owner_open {
        return Err(KeygateError::BusyResource);
    }
    record.owner_open = true;
    Ok(serde_json::json!({}))
}

fn handle_close_slot(state: &mut StoreState, params: &Value) -> Result<Value> {
    let record = slot_mut(state, param_u64(params, "slot")?)?;
    match params.get("access").and_then(Value::as_str) {
        Some("owner") => record.owner_open = false,
        Some("user") => record.user_open = record.user_open.saturating_sub(1),
        _ => {
            return Err(KeygateError::InvalidArgument(
                "missing or malformed 'access'".to_string(),
            ))
        }
    }
    Ok(serde_json::json!({}))
}

fn handle_save_copy(state: &mut StoreState, params: &Value) -> Result<Value> {
    let number = param_u64(params, "slot")?;
    let payload_value = params
        .get("payload")
        .ok_or_else(|| KeygateError::InvalidArgument("missing 'payload'".to_string()))?;
    let referenced = params.get("referenced").and_then(Value::as_u64);

    slot_ref(state, number)?;

    let payload = PropertyTree::from_json_value(payload_value)?;
    if payload.is_empty() {
        return Err(KeygateError::EmptyContainer);
    }
    let props = ContentProps::from_tree(&payload)
        .map_err(|e| KeygateError::InvalidArgument(format!("malformed content payload: {}", e)))?;

    if props.is_session {
        return Err(KeygateError::IncompatibleObject(
            "session objects are not persistable".to_string(),
        ));
    }

    let target = slot_ref(state, number)?;
    if props.object_size > target.prototype.max_object_size {
        return Err(KeygateError::InsufficientCapacity {
            required: props.object_size,
            available: target.prototype.max_object_size,
        });
    }

    for (other_number, other) in &state.slots {
        if *other_number == number {
            continue;
        }
        if let Some(other_props) = content_props_of(other) {
            if other_props.object_uid == props.object_uid {
                return Err(KeygateError::ContentDuplication);
            }
        }
    }

    if target.prototype.object_type != crate::model::ObjectType::Undefined
        && target.prototype.object_type != props.object_type
    {
        return Err(KeygateError::ContentRestrictions(format!(
            "slot prototype allows {}, object is {}",
            target.prototype.object_type.as_str(),
            props.object_type.as_str()
        )));
    }
    if props.is_exportable && !target.prototype.is_exportable {
        return Err(KeygateError::ContentRestrictions(
            "slot prototype forbids exportable objects".to_string(),
        ));
    }

    if let Some(referenced_number) = referenced {
        let referenced_record = state.slots.get(&referenced_number).ok_or_else(|| {
            KeygateError::BadObjectReference(format!(
                "referenced slot {} does not exist",
                referenced_number
            ))
        })?;
        let referenced_props = content_props_of(referenced_record).ok_or_else(|| {
            KeygateError::BadObjectReference("referenced container is empty".to_string())
        })?;
        if referenced_props.is_session != props.is_session {
            return Err(KeygateError::BadObjectReference(
                "volatile/non-volatile mismatch with the referenced object".to_string(),
            ));
        }
        let target_alg = state.slots[&number].prototype.alg_id;
        let referenced_alg = state.slots[&referenced_number].prototype.alg_id;
        if target_alg != referenced_alg {
            return Err(KeygateError::BadObjectReference(format!(
                "algorithm mismatch: {} vs {}",
                target_alg, referenced_alg
            )));
        }
    }

    // All checks passed: drop the previous reference (if the slot is being
    // overwritten) and store the new payload.
    let old_reference = state.slots[&number].reference;
    if let Some(old) = old_reference {
        if let Some(old_record) = state.slots.get_mut(&old) {
            old_record.ref_count = old_record.ref_count.saturating_sub(1);
        }
    }
    if let Some(referenced_number) = referenced {
        state
            .slots
            .get_mut(&referenced_number)
            .expect("checked above")
            .ref_count += 1;
    }
    let record = state.slots.get_mut(&number).expect("checked above");
    record.payload = Some(payload);
    record.reference = referenced;
    Ok(serde_json::json!({}))
}

fn handle_clear_slot(state: &mut StoreState, params: &Value) -> Result<Value> {
    let number = param_u64(params, "slot")?;
    let record = slot_mut(state, number)?;
    if record.owner_open {
        return Err(KeygateError::BusyResource);
    }

    // Secure erase: wipe the payload in place before dropping it.
    if let Some(mut payload) = record.payload.take() {
        payload.wipe(MAX_PAYLOAD_DEPTH);
    }
    let reference = record.reference.take();
    if let Some(referenced_number) = reference {
        if let Some(referenced) = state.slots.get_mut(&referenced_number) {
            referenced.ref_count = referenced.ref_count.saturating_sub(1);
        }
    }
    Ok(serde_json::json!({}))
}

fn handle_get_content_props(state: &StoreState, params: &Value) -> Result<Value> {
    let record = slot_ref(state, param_u64(params, "slot")?)?;
    let payload = record.payload.as_ref().ok_or(KeygateError::EmptyContainer)?;
    Ok(serde_json::json!({ "payload": payload.to_json_value() }))
}

fn handle_get_prototyped_props(state: &StoreState, params: &Value) -> Result<Value> {
    let record = slot_ref(state, param_u64(params, "slot")?)?;
    Ok(serde_json::json!({ "payload": record.prototype.to_tree().to_json_value() }))
}

fn handle_get_default_provider(state: &StoreState, params: &Value) -> Result<Value> {
    let record = slot_ref(state, param_u64(params, "slot")?)?;
    Ok(serde_json::json!({
        "uid": record.default_provider_uid.map(|u| u.to_string())
    }))
}

fn handle_get_owner(state: &StoreState, params: &Value) -> Result<Value> {
    let record = slot_ref(state, param_u64(params, "slot")?)?;
    Ok(serde_json::json!({ "uid": record.owner_uid.to_string() }))
}

fn handle_begin_transaction(state: &mut StoreState, params: &Value) -> Result<Value> {
    let scope: Vec<u64> = params
        .get("scope")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();
    if scope.is_empty() {
        return Err(KeygateError::InvalidArgument(
            "transaction scope must not be empty".to_string(),
        ));
    }

    let mut snapshots = BTreeMap::new();
    for number in &scope {
        let record = slot_ref(state, *number)?;
        snapshots.insert(
            *number,
            SlotSnapshot {
                payload: record.payload.clone(),
                reference: record.reference,
                ref_count: record.ref_count,
            },
        );
    }

    state.next_transaction += 1;
    let id = state.next_transaction;
    state.transactions.insert(id, TxRecord { snapshots });
    Ok(serde_json::json!({ "transaction": id }))
}

fn take_open_transaction(state: &mut StoreState, params: &Value) -> Result<(u64, TxRecord)> {
    let id = param_u64(params, "transaction")?;
    match state.transactions.remove(&id) {
        Some(record) => {
            state.resolved_transactions.insert(id);
            Ok((id, record))
        }
        None if state.resolved_transactions.contains(&id) => Err(KeygateError::InvalidArgument(
            format!("transaction {} is already resolved", id),
        )),
        None => Err(KeygateError::InvalidArgument(format!(
            "no open transaction with id {}",
            id
        ))),
    }
}

fn handle_commit_transaction(state: &mut StoreState, params: &Value) -> Result<Value> {
    take_open_transaction(state, params)?;
    Ok(serde_json::json!({}))
}

fn handle_rollback_transaction(state: &mut StoreState, params: &Value) -> Result<Value> {
    let (_, tx) = take_open_transaction(state, params)?;
    for (number, snapshot) in tx.snapshots {
        if let Some(record) = state.slots.get_mut(&number) {
            record.payload = snapshot.payload;
            record.reference = snapshot.reference;
            record.ref_count = snapshot.ref_count;
        }
    }
    Ok(serde_json::json!({}))
}

fn handle_register_observer(state: &mut StoreState, params: &Value) -> Result<Value> {
    state.observer_registered = param_bool_or(params, "enabled", false);
    if !state.observer_registered {
        state.watched.clear();
    }
    Ok(serde_json::json!({}))
}

fn handle_unsubscribe_slot(state: &mut StoreState, params: &Value) -> Result<Value> {
    let number = param_u64(params, "slot")?;
    slot_ref(state, number)?;
    state.watched.remove(&number);
    Ok(serde_json::json!({}))
}

fn handle_find_referring_slot(state: &StoreState, params: &Value) -> Result<Value> {
    let target = param_u64(params, "target")?;
    let previous = params.get("previous").and_then(Value::as_u64);

    let found = state
        .slots
        .iter()
        .filter(|(number, record)| {
            record.reference == Some(target) && previous.is_none_or(|p| **number > p)
        })
        .map(|(number, _)| *number)
        .next();
    Ok(serde_json::json!({ "slot": found }))
}

// ─── Mock Transporter & Session ──────────────────────────────────────────────

/// A transporter wired straight into the in-memory daemon.
pub(crate) struct MockTransporter {
    pub store: Arc<MockStore>,
    pub observer: ObserverCell,
    connected: AtomicBool,
    next_id: AtomicU64,
}

impl MockTransporter {
    pub fn new(store: Arc<MockStore>, observer: ObserverCell) -> Self {
        Self {
            store,
            observer,
            connected: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// Simulate an externally caused slot change notification.
    pub fn emit_update(&self, slot: SlotNumber) {
        self.observer.notify(slot);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Transporter for MockTransporter {
    fn round_trip(&self, call: RpcCall) -> Result<RpcResponse> {
        if !self.is_connected() {
            return Err(KeygateError::RuntimeFault(
                "channel to the key store is disconnected".to_string(),
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, call.method, call.params);
        Ok(self.store.handle(&request))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// A session whose channel is the mock transporter.
pub(crate) struct MockSession {
    pub transporter: Arc<MockTransporter>,
    pub observer: ObserverCell,
}

impl MockSession {
    pub fn new() -> (Arc<Self>, Arc<MockStore>) {
        let store = Arc::new(MockStore::new());
        let observer = ObserverCell::new();
        let session = Arc::new(Self {
            transporter: Arc::new(MockTransporter::new(store.clone(), observer.clone())),
            observer,
        });
        (session, store)
    }
}

impl SessionAccess for MockSession {
    fn transporter(&self) -> Result<Arc<dyn Transporter>> {
        if !self.transporter.is_connected() {
            return Err(KeygateError::RuntimeFault(
                "channel to the key store is disconnected".to_string(),
            ));
        }
        Ok(self.transporter.clone())
    }

    fn observer_cell(&self) -> ObserverCell {
        self.observer.clone()
    }
}
