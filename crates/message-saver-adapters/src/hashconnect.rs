//! HashConnect pairing transport.
//!
//! The browser runtime talks to a page-provided `window.hashconnectBridge`
//! wrapping the HashConnect library. Everywhere else the transport is backed
//! by a [`DeterministicWallet`] whose pairing behaviour is scripted per connect
//! request, so every recovery path can be driven from tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use message_saver_core::domain::{
    ContractExecuteRequest, InitData, PairingEvent, SavedPairing, StorageArea, TransportStatus,
    WalletMetadata, WalletTxResponse,
};
use message_saver_core::ports::TransportHandlers;
use message_saver_core::{
    AccountRef, AppMetadata, Network, PortError, StoragePort, TransportFactoryPort, TransportPort,
};

use crate::storage::MemoryStorage;
use crate::AppConfig;

/// Local-storage key HashConnect persists its pairing data under.
pub const HASHCONNECT_DATA_KEY: &str = "hashconnectData";

/// How the scripted wallet answers one connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingBehavior {
    /// Pairs and fires the pairing event.
    Announce,
    /// Pairs (status and pairing data) without firing any event.
    Silent,
    /// Stores the pairing under the topic; status stays `Connecting`.
    StoredOnly,
    /// Fires only a `Paired` status change; the pairing is stored by topic.
    StatusOnly,
    /// Only persists `hashconnectData` to storage.
    PersistOnly,
    /// Pairs once the dApp requests additional accounts.
    OnAdditionalAccounts,
    /// The wallet never answers.
    Ignore,
}

#[derive(Debug)]
struct WalletScript {
    accounts: Vec<AccountRef>,
    metadata: WalletMetadata,
    behaviors: VecDeque<PairingBehavior>,
    default_behavior: PairingBehavior,
    saved_pairings: Vec<SavedPairing>,
    fail_init: Option<String>,
    fail_connect: Option<String>,
    fail_disconnect: bool,
    tx_response: Option<WalletTxResponse>,
    created: Vec<Network>,
    next_topic: u64,
    init_calls: u32,
    connect_calls: u32,
    disconnect_calls: u32,
    additional_requests: Vec<String>,
    sent: Vec<(AccountRef, ContractExecuteRequest)>,
}

impl Default for WalletScript {
    fn default() -> Self {
        Self {
            accounts: vec![AccountRef::new("0.0.4821")],
            metadata: WalletMetadata::hashpack("HashPack Wallet"),
            behaviors: VecDeque::new(),
            default_behavior: PairingBehavior::Announce,
            saved_pairings: Vec::new(),
            fail_init: None,
            fail_connect: None,
            fail_disconnect: false,
            tx_response: None,
            created: Vec::new(),
            next_topic: 1,
            init_calls: 0,
            connect_calls: 0,
            disconnect_calls: 0,
            additional_requests: Vec::new(),
            sent: Vec::new(),
        }
    }
}

/// Shared handle to the scripted wallet behind every in-memory transport a
/// factory creates.
#[derive(Debug, Clone, Default)]
pub struct DeterministicWallet {
    script: Arc<Mutex<WalletScript>>,
}

impl DeterministicWallet {
    fn lock(&self) -> Result<MutexGuard<'_, WalletScript>, PortError> {
        self.script
            .lock()
            .map_err(|e| PortError::Transport(format!("wallet script lock poisoned: {e}")))
    }

    pub fn debug_set_accounts(&self, accounts: Vec<AccountRef>) -> Result<(), PortError> {
        self.lock()?.accounts = accounts;
        Ok(())
    }

    /// Queues the behaviour for the next connect request.
    pub fn debug_push_behavior(&self, behavior: PairingBehavior) -> Result<(), PortError> {
        self.lock()?.behaviors.push_back(behavior);
        Ok(())
    }

    pub fn debug_set_default_behavior(&self, behavior: PairingBehavior) -> Result<(), PortError> {
        self.lock()?.default_behavior = behavior;
        Ok(())
    }

    pub fn debug_save_pairing(&self, pairing: SavedPairing) -> Result<(), PortError> {
        self.lock()?.saved_pairings.push(pairing);
        Ok(())
    }

    pub fn debug_fail_init(&self, reason: Option<&str>) -> Result<(), PortError> {
        self.lock()?.fail_init = reason.map(str::to_owned);
        Ok(())
    }

    pub fn debug_fail_connect(&self, reason: Option<&str>) -> Result<(), PortError> {
        self.lock()?.fail_connect = reason.map(str::to_owned);
        Ok(())
    }

    pub fn debug_fail_disconnect(&self, fail: bool) -> Result<(), PortError> {
        self.lock()?.fail_disconnect = fail;
        Ok(())
    }

    pub fn debug_set_tx_response(&self, response: WalletTxResponse) -> Result<(), PortError> {
        self.lock()?.tx_response = Some(response);
        Ok(())
    }

    /// Networks of every transport created so far, in order.
    pub fn debug_created_networks(&self) -> Result<Vec<Network>, PortError> {
        Ok(self.lock()?.created.clone())
    }

    pub fn debug_init_calls(&self) -> Result<u32, PortError> {
        Ok(self.lock()?.init_calls)
    }

    pub fn debug_connect_calls(&self) -> Result<u32, PortError> {
        Ok(self.lock()?.connect_calls)
    }

    pub fn debug_disconnect_calls(&self) -> Result<u32, PortError> {
        Ok(self.lock()?.disconnect_calls)
    }

    pub fn debug_additional_requests(&self) -> Result<Vec<String>, PortError> {
        Ok(self.lock()?.additional_requests.clone())
    }

    pub fn debug_sent_transactions(
        &self,
    ) -> Result<Vec<(AccountRef, ContractExecuteRequest)>, PortError> {
        Ok(self.lock()?.sent.clone())
    }
}

#[derive(Debug, Clone)]
enum FactoryMode {
    Disabled(String),
    Deterministic,
    #[cfg(target_arch = "wasm32")]
    Browser,
}

/// Builds one transport per network; rebuilt on network switches and resets.
#[derive(Debug, Clone)]
pub struct HashConnectFactory {
    mode: FactoryMode,
    wallet: DeterministicWallet,
    storage: Option<MemoryStorage>,
}

impl HashConnectFactory {
    /// Scripted wallet that pairs with `0.0.4821` on every connect.
    pub fn in_memory() -> Self {
        Self {
            mode: FactoryMode::Deterministic,
            wallet: DeterministicWallet::default(),
            storage: None,
        }
    }

    pub fn with_config(config: &AppConfig) -> Self {
        #[cfg(target_arch = "wasm32")]
        let mode = if browser::bridge_available() {
            FactoryMode::Browser
        } else if config.strict_runtime_required() {
            FactoryMode::Disabled(
                "hashconnectBridge not found in production runtime profile".to_owned(),
            )
        } else {
            FactoryMode::Deterministic
        };

        #[cfg(not(target_arch = "wasm32"))]
        let mode = if config.strict_runtime_required() {
            FactoryMode::Disabled(
                "HashConnect requires the browser runtime in production runtime profile"
                    .to_owned(),
            )
        } else {
            FactoryMode::Deterministic
        };

        Self {
            mode,
            wallet: DeterministicWallet::default(),
            storage: None,
        }
    }

    /// Persists pairings to `storage` the way the HashConnect library does.
    pub fn with_storage(mut self, storage: MemoryStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn wallet(&self) -> &DeterministicWallet {
        &self.wallet
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self.mode, FactoryMode::Deterministic)
    }
}

impl TransportFactoryPort for HashConnectFactory {
    type Transport = HashConnectAdapter;

    fn create(&self, network: Network) -> Result<HashConnectAdapter, PortError> {
        match &self.mode {
            FactoryMode::Disabled(reason) => Err(PortError::Policy(reason.clone())),
            FactoryMode::Deterministic => {
                self.wallet.lock()?.created.push(network);
                debug!(%network, "in-memory hashconnect transport created");
                Ok(HashConnectAdapter {
                    inner: AdapterInner::InMemory(InMemoryTransport {
                        wallet: self.wallet.clone(),
                        storage: self.storage.clone(),
                        network,
                        state: Mutex::new(TransportState::default()),
                    }),
                })
            }
            #[cfg(target_arch = "wasm32")]
            FactoryMode::Browser => Ok(HashConnectAdapter {
                inner: AdapterInner::Browser(browser::BridgeTransport::new(network)?),
            }),
        }
    }
}

#[derive(Debug)]
pub struct HashConnectAdapter {
    inner: AdapterInner,
}

#[derive(Debug)]
enum AdapterInner {
    InMemory(InMemoryTransport),
    #[cfg(target_arch = "wasm32")]
    Browser(browser::BridgeTransport),
}

#[derive(Debug)]
struct InMemoryTransport {
    wallet: DeterministicWallet,
    storage: Option<MemoryStorage>,
    network: Network,
    state: Mutex<TransportState>,
}

#[derive(Debug)]
struct TransportState {
    handlers: Option<TransportHandlers>,
    status: TransportStatus,
    topic: Option<String>,
    pairing: Option<SavedPairing>,
    by_topic: HashMap<String, SavedPairing>,
    awaiting_additional: bool,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            handlers: None,
            status: TransportStatus::Disconnected,
            topic: None,
            pairing: None,
            by_topic: HashMap::new(),
            awaiting_additional: false,
        }
    }
}

/// Handler calls collected under the lock and fired after it is released.
enum Emit {
    Pairing(PairingEvent),
    Status(TransportStatus),
    AdditionalAccounts(PairingEvent),
}

impl InMemoryTransport {
    fn lock(&self) -> Result<MutexGuard<'_, TransportState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("transport lock poisoned: {e}")))
    }

    fn fire(&self, emits: Vec<Emit>) {
        let handlers = match self.lock() {
            Ok(state) => state.handlers.clone(),
            Err(e) => {
                warn!("{e}");
                None
            }
        };
        let Some(handlers) = handlers else {
            debug!("no transport handlers registered; events dropped");
            return;
        };
        for emit in emits {
            match emit {
                Emit::Pairing(event) => (handlers.on_pairing)(event),
                Emit::Status(status) => (handlers.on_status)(status),
                Emit::AdditionalAccounts(event) => (handlers.on_additional_accounts)(event),
            }
        }
    }

    fn pairing_for(&self, topic: &str) -> Result<SavedPairing, PortError> {
        let script = self.wallet.lock()?;
        Ok(SavedPairing {
            topic: topic.to_owned(),
            account_ids: script.accounts.clone(),
            metadata: Some(script.metadata.clone()),
            network: Some(self.network),
        })
    }

    fn persist(&self, pairing: &SavedPairing) {
        let Some(storage) = &self.storage else {
            return;
        };
        let value = hashconnect_data(pairing);
        if let Err(e) = storage.set(StorageArea::Local, HASHCONNECT_DATA_KEY, &value.to_string()) {
            warn!("persisting hashconnect data failed: {e}");
        }
    }

    fn persisted_pairing(&self) -> Option<SavedPairing> {
        let raw = self
            .storage
            .as_ref()?
            .get(StorageArea::Local, HASHCONNECT_DATA_KEY)
            .ok()??;
        parse_hashconnect_data(&raw).filter(|p| p.network.map_or(true, |n| n == self.network))
    }

    fn init(&self, metadata: &AppMetadata, network: Network) -> Result<InitData, PortError> {
        let (topic, mut saved_pairings) = {
            let mut script = self.wallet.lock()?;
            script.init_calls += 1;
            if let Some(reason) = &script.fail_init {
                return Err(PortError::Transport(reason.clone()));
            }
            let topic = format!("topic-{}", script.next_topic);
            script.next_topic += 1;
            let saved: Vec<SavedPairing> = script
                .saved_pairings
                .iter()
                .filter(|p| p.network.map_or(true, |n| n == network))
                .cloned()
                .collect();
            (topic, saved)
        };
        if let Some(persisted) = self.persisted_pairing() {
            saved_pairings.push(persisted);
        }

        let restored = saved_pairings.iter().find(|p| !p.account_ids.is_empty()).cloned();
        let active_topic = restored.as_ref().map_or(topic.clone(), |p| p.topic.clone());
        {
            let mut state = self.lock()?;
            state.topic = Some(active_topic.clone());
            state.status = TransportStatus::Connecting;
            if let Some(pairing) = restored {
                state.status = TransportStatus::Paired;
                state.by_topic.insert(pairing.topic.clone(), pairing.clone());
                state.pairing = Some(pairing);
            }
        }
        let pairing_string = encode_pairing_string(&topic, metadata, network);
        debug!(topic = active_topic, restored = !saved_pairings.is_empty(), "in-memory transport initialized");
        Ok(InitData {
            topic: Some(active_topic),
            pairing_string: Some(pairing_string),
            saved_pairings,
        })
    }

    fn connect_local_wallet(&self) -> Result<(), PortError> {
        let behavior = {
            let mut script = self.wallet.lock()?;
            script.connect_calls += 1;
            if let Some(reason) = &script.fail_connect {
                return Err(PortError::Transport(reason.clone()));
            }
            script
                .behaviors
                .pop_front()
                .unwrap_or(script.default_behavior)
        };
        let topic = self
            .lock()?
            .topic
            .clone()
            .ok_or_else(|| PortError::NotFound("transport not initialized".to_owned()))?;
        debug!(topic, ?behavior, "local wallet connect requested");

        if behavior == PairingBehavior::Ignore {
            return Ok(());
        }
        let pairing = self.pairing_for(&topic)?;
        let mut emits = Vec::new();
        {
            let mut state = self.lock()?;
            match behavior {
                PairingBehavior::Announce => {
                    state.status = TransportStatus::Paired;
                    state.pairing = Some(pairing.clone());
                    state.by_topic.insert(topic.clone(), pairing.clone());
                    emits.push(Emit::Pairing(pairing_event(&pairing)));
                }
                PairingBehavior::Silent => {
                    state.status = TransportStatus::Paired;
                    state.pairing = Some(pairing.clone());
                }
                PairingBehavior::StoredOnly => {
                    state.by_topic.insert(topic.clone(), pairing.clone());
                }
                PairingBehavior::StatusOnly => {
                    state.status = TransportStatus::Paired;
                    state.by_topic.insert(topic.clone(), pairing.clone());
                    emits.push(Emit::Status(TransportStatus::Paired));
                }
                PairingBehavior::OnAdditionalAccounts => state.awaiting_additional = true,
                PairingBehavior::PersistOnly | PairingBehavior::Ignore => {}
            }
        }
        if behavior != PairingBehavior::OnAdditionalAccounts {
            self.persist(&pairing);
        }
        self.fire(emits);
        Ok(())
    }

    async fn disconnect(&self, topic: Option<&str>) -> Result<(), PortError> {
        {
            let mut script = self.wallet.lock()?;
            script.disconnect_calls += 1;
            if script.fail_disconnect {
                return Err(PortError::Transport("wallet bridge unreachable".to_owned()));
            }
        }
        {
            let mut state = self.lock()?;
            state.status = TransportStatus::Disconnected;
            state.pairing = None;
            if let Some(topic) = topic {
                state.by_topic.remove(topic);
            }
        }
        if let Some(storage) = &self.storage {
            storage.remove(StorageArea::Local, HASHCONNECT_DATA_KEY)?;
        }
        debug!(?topic, "in-memory transport disconnected");
        self.fire(vec![Emit::Status(TransportStatus::Disconnected)]);
        Ok(())
    }

    async fn request_additional_accounts(&self, topic: &str) -> Result<(), PortError> {
        self.wallet.lock()?.additional_requests.push(topic.to_owned());
        let awaiting = std::mem::take(&mut self.lock()?.awaiting_additional);
        if !awaiting {
            return Ok(());
        }
        let pairing = self.pairing_for(topic)?;
        {
            let mut state = self.lock()?;
            state.status = TransportStatus::Paired;
            state.pairing = Some(pairing.clone());
            state.by_topic.insert(topic.to_owned(), pairing.clone());
        }
        self.persist(&pairing);
        self.fire(vec![Emit::AdditionalAccounts(pairing_event(&pairing))]);
        Ok(())
    }

    async fn send_transaction(
        &self,
        topic: Option<&str>,
        account: &AccountRef,
        request: &ContractExecuteRequest,
    ) -> Result<WalletTxResponse, PortError> {
        let Some(topic) = topic else {
            return Err(PortError::NotFound("no pairing topic for transaction".to_owned()));
        };
        let mut script = self.wallet.lock()?;
        script.sent.push((account.clone(), request.clone()));
        let sequence = script.sent.len();
        debug!(topic, %account, function = ?request.function, "transaction sent to wallet");
        Ok(script.tx_response.clone().unwrap_or_else(|| WalletTxResponse {
            success: true,
            transaction_id: Some(format!("{account}@1700000000.{sequence:09}")),
            receipt: Some(json!({ "status": "SUCCESS" })),
            error: None,
        }))
    }
}

fn pairing_event(pairing: &SavedPairing) -> PairingEvent {
    PairingEvent {
        account_ids: pairing.account_ids.clone(),
        metadata: pairing.metadata.clone(),
        topic: Some(pairing.topic.clone()),
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedPairing {
    #[serde(default)]
    account_ids: Vec<AccountRef>,
    #[serde(default)]
    network: Option<Network>,
    #[serde(default)]
    metadata: Option<WalletMetadata>,
}

fn hashconnect_data(pairing: &SavedPairing) -> Value {
    json!({
        "topic": pairing.topic,
        "pairingData": [PersistedPairing {
            account_ids: pairing.account_ids.clone(),
            network: pairing.network,
            metadata: pairing.metadata.clone(),
        }],
    })
}

fn encode_pairing_string(topic: &str, metadata: &AppMetadata, network: Network) -> String {
    let payload = json!({
        "topic": topic,
        "network": network.as_str(),
        "metadata": {
            "name": metadata.name,
            "description": metadata.description,
            "icon": metadata.icon,
        },
    });
    BASE64.encode(payload.to_string())
}

/// Reads a persisted `hashconnectData` entry: `pairingData[*].accountIds`
/// first, then a `metadata.accountId` inside the base64 `pairingString`.
pub fn parse_hashconnect_data(raw: &str) -> Option<SavedPairing> {
    let data: Value = serde_json::from_str(raw).ok()?;
    let topic = data
        .get("topic")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let persisted = data
        .get("pairingData")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| serde_json::from_value::<PersistedPairing>(entry.clone()).ok())
        .find(|entry| !entry.account_ids.is_empty());
    if let Some(entry) = persisted {
        return Some(SavedPairing {
            topic,
            account_ids: entry.account_ids,
            metadata: entry.metadata,
            network: entry.network,
        });
    }

    let encoded = data.get("pairingString").and_then(Value::as_str)?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let pairing: Value = serde_json::from_slice(&decoded).ok()?;
    let account = pairing
        .pointer("/metadata/accountId")
        .and_then(Value::as_str)?;
    Some(SavedPairing {
        topic: pairing
            .get("topic")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or(topic),
        account_ids: vec![AccountRef::new(account)],
        metadata: serde_json::from_value(pairing["metadata"].clone()).ok(),
        network: pairing
            .get("network")
            .and_then(Value::as_str)
            .and_then(|n| n.parse().ok()),
    })
}

#[async_trait(?Send)]
impl TransportPort for HashConnectAdapter {
    fn subscribe(&self, handlers: TransportHandlers) -> Result<(), PortError> {
        match &self.inner {
            AdapterInner::InMemory(t) => {
                t.lock()?.handlers = Some(handlers);
                Ok(())
            }
            #[cfg(target_arch = "wasm32")]
            AdapterInner::Browser(b) => b.subscribe(handlers),
        }
    }

    async fn init(
        &self,
        metadata: &AppMetadata,
        network: Network,
        single_account: bool,
    ) -> Result<InitData, PortError> {
        info!(%network, single_account, app = %metadata.name, "initializing hashconnect");
        match &self.inner {
            AdapterInner::InMemory(t) => t.init(metadata, network),
            #[cfg(target_arch = "wasm32")]
            AdapterInner::Browser(b) => b.init(metadata, network, single_account).await,
        }
    }

    fn connect_local_wallet(&self) -> Result<(), PortError> {
        match &self.inner {
            AdapterInner::InMemory(t) => t.connect_local_wallet(),
            #[cfg(target_arch = "wasm32")]
            AdapterInner::Browser(b) => b.connect_local_wallet(),
        }
    }

    async fn disconnect(&self, topic: Option<&str>) -> Result<(), PortError> {
        match &self.inner {
            AdapterInner::InMemory(t) => t.disconnect(topic).await,
            #[cfg(target_arch = "wasm32")]
            AdapterInner::Browser(b) => b.disconnect(topic).await,
        }
    }

    fn status(&self) -> TransportStatus {
        match &self.inner {
            AdapterInner::InMemory(t) => t
                .lock()
                .map(|s| s.status)
                .unwrap_or(TransportStatus::Disconnected),
            #[cfg(target_arch = "wasm32")]
            AdapterInner::Browser(b) => b.status(),
        }
    }

    fn topic(&self) -> Option<String> {
        match &self.inner {
            AdapterInner::InMemory(t) => t.lock().ok()?.topic.clone(),
            #[cfg(target_arch = "wasm32")]
            AdapterInner::Browser(b) => b.topic(),
        }
    }

    fn pairing_data(&self) -> Option<SavedPairing> {
        match &self.inner {
            AdapterInner::InMemory(t) => t.lock().ok()?.pairing.clone(),
            #[cfg(target_arch = "wasm32")]
            AdapterInner::Browser(b) => b.pairing_data(),
        }
    }

    fn pairing_by_topic(&self, topic: &str) -> Result<Option<SavedPairing>, PortError> {
        match &self.inner {
            AdapterInner::InMemory(t) => Ok(t.lock()?.by_topic.get(topic).cloned()),
            #[cfg(target_arch = "wasm32")]
            AdapterInner::Browser(b) => b.pairing_by_topic(topic),
        }
    }

    async fn request_additional_accounts(
        &self,
        topic: &str,
        network: Network,
    ) -> Result<(), PortError> {
        match &self.inner {
            AdapterInner::InMemory(t) => {
                if network != t.network {
                    return Err(PortError::Validation(format!(
                        "transport bound to {} but additional accounts requested on {network}",
                        t.network
                    )));
                }
                t.request_additional_accounts(topic).await
            }
            #[cfg(target_arch = "wasm32")]
            AdapterInner::Browser(b) => b.request_additional_accounts(topic, network).await,
        }
    }

    async fn send_transaction(
        &self,
        topic: Option<&str>,
        account: &AccountRef,
        request: &ContractExecuteRequest,
    ) -> Result<WalletTxResponse, PortError> {
        match &self.inner {
            AdapterInner::InMemory(t) => t.send_transaction(topic, account, request).await,
            #[cfg(target_arch = "wasm32")]
            AdapterInner::Browser(b) => b.send_transaction(topic, account, request).await,
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod browser {
    //! Bridge to `window.hashconnectBridge`, a page script wrapping the
    //! HashConnect library. Payloads cross the boundary as camelCase JSON.

    use std::sync::Mutex;

    use serde::Deserialize;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsValue;

    use message_saver_core::domain::{
        ContractExecuteRequest, InitData, PairingEvent, SavedPairing, TransportStatus,
        WalletMetadata, WalletTxResponse,
    };
    use message_saver_core::ports::TransportHandlers;
    use message_saver_core::{AccountRef, AppMetadata, Network, PortError};

    use crate::browser::{call_async, get_prop, method, window};

    const BRIDGE: &str = "hashconnectBridge";

    pub(super) fn bridge_available() -> bool {
        bridge().map(|b| !b.is_undefined() && !b.is_null()).unwrap_or(false)
    }

    fn bridge() -> Result<JsValue, PortError> {
        let window = window()?;
        let bridge = get_prop(&window, BRIDGE)?;
        if bridge.is_undefined() || bridge.is_null() {
            return Err(PortError::NotFound(format!("window.{BRIDGE} missing")));
        }
        Ok(bridge)
    }

    fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, PortError> {
        serde_wasm_bindgen::to_value(value)
            .map_err(|e| PortError::Validation(format!("serialize for bridge failed: {e}")))
    }

    fn from_js<T: for<'de> Deserialize<'de>>(value: JsValue) -> Result<T, PortError> {
        serde_wasm_bindgen::from_value(value)
            .map_err(|e| PortError::Validation(format!("bridge payload invalid: {e}")))
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct WirePairing {
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        account_ids: Vec<AccountRef>,
        #[serde(default)]
        metadata: Option<WalletMetadata>,
        #[serde(default)]
        network: Option<Network>,
    }

    impl WirePairing {
        fn into_event(self) -> PairingEvent {
            PairingEvent {
                account_ids: self.account_ids,
                metadata: self.metadata,
                topic: self.topic,
            }
        }

        fn into_saved(self, fallback_topic: &str) -> SavedPairing {
            SavedPairing {
                topic: self.topic.unwrap_or_else(|| fallback_topic.to_owned()),
                account_ids: self.account_ids,
                metadata: self.metadata,
                network: self.network,
            }
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct WireInit {
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        pairing_string: Option<String>,
        #[serde(default)]
        saved_pairings: Vec<WirePairing>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct WireTxResponse {
        #[serde(default)]
        success: bool,
        #[serde(default)]
        transaction_id: Option<String>,
        #[serde(default)]
        receipt: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<String>,
    }

    fn parse_status(raw: &str) -> TransportStatus {
        match raw.to_ascii_lowercase().as_str() {
            "paired" => TransportStatus::Paired,
            "connected" => TransportStatus::Connected,
            "connecting" => TransportStatus::Connecting,
            _ => TransportStatus::Disconnected,
        }
    }

    type JsCallback = Closure<dyn Fn(JsValue)>;

    /// Keeps the subscribed closures alive for the transport's lifetime.
    pub(super) struct BridgeTransport {
        network: Network,
        callbacks: Mutex<Vec<JsCallback>>,
    }

    impl std::fmt::Debug for BridgeTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("BridgeTransport")
                .field("network", &self.network)
                .finish_non_exhaustive()
        }
    }

    impl BridgeTransport {
        pub(super) fn new(network: Network) -> Result<Self, PortError> {
            bridge()?;
            Ok(Self {
                network,
                callbacks: Mutex::new(Vec::new()),
            })
        }

        fn call_sync(&self, name: &str, args: &[JsValue]) -> Result<JsValue, PortError> {
            let bridge = bridge()?;
            let function = method(&bridge, name)?;
            let js_args = args.iter().collect::<js_sys::Array>();
            function
                .apply(&bridge, &js_args)
                .map_err(|e| PortError::Transport(format!("{name} failed: {e:?}")))
        }

        pub(super) fn subscribe(&self, handlers: TransportHandlers) -> Result<(), PortError> {
            let on_pairing = handlers.on_pairing.clone();
            let pairing: JsCallback = Closure::new(move |value: JsValue| {
                match from_js::<WirePairing>(value) {
                    Ok(wire) => on_pairing(wire.into_event()),
                    Err(e) => tracing::warn!("pairing event dropped: {e}"),
                }
            });
            let on_status = handlers.on_status.clone();
            let status: JsCallback = Closure::new(move |value: JsValue| {
                on_status(parse_status(&value.as_string().unwrap_or_default()));
            });
            let on_extra = handlers.on_additional_accounts.clone();
            let extra: JsCallback = Closure::new(move |value: JsValue| {
                match from_js::<WirePairing>(value) {
                    Ok(wire) => on_extra(wire.into_event()),
                    Err(e) => tracing::warn!("additional accounts event dropped: {e}"),
                }
            });

            self.call_sync(
                "subscribe",
                &[
                    pairing.as_ref().clone(),
                    status.as_ref().clone(),
                    extra.as_ref().clone(),
                ],
            )?;
            let mut callbacks = self
                .callbacks
                .lock()
                .map_err(|e| PortError::Transport(format!("bridge callbacks lock poisoned: {e}")))?;
            callbacks.extend([pairing, status, extra]);
            Ok(())
        }

        pub(super) async fn init(
            &self,
            metadata: &AppMetadata,
            network: Network,
            single_account: bool,
        ) -> Result<InitData, PortError> {
            let bridge = bridge()?;
            let raw = call_async(
                &bridge,
                "init",
                &[
                    to_js(metadata)?,
                    JsValue::from_str(network.as_str()),
                    JsValue::from_bool(single_account),
                ],
            )
            .await?;
            let wire: WireInit = from_js(raw)?;
            let topic = wire.topic.clone().unwrap_or_default();
            Ok(InitData {
                topic: wire.topic,
                pairing_string: wire.pairing_string,
                saved_pairings: wire
                    .saved_pairings
                    .into_iter()
                    .map(|p| p.into_saved(&topic))
                    .collect(),
            })
        }

        pub(super) fn connect_local_wallet(&self) -> Result<(), PortError> {
            self.call_sync("connectToLocalWallet", &[]).map(|_| ())
        }

        pub(super) async fn disconnect(&self, topic: Option<&str>) -> Result<(), PortError> {
            let bridge = bridge()?;
            let topic = topic.map(JsValue::from_str).unwrap_or(JsValue::UNDEFINED);
            call_async(&bridge, "disconnect", &[topic]).await.map(|_| ())
        }

        pub(super) fn status(&self) -> TransportStatus {
            self.call_sync("status", &[])
                .ok()
                .and_then(|v| v.as_string())
                .map(|s| parse_status(&s))
                .unwrap_or(TransportStatus::Disconnected)
        }

        pub(super) fn topic(&self) -> Option<String> {
            self.call_sync("topic", &[]).ok()?.as_string()
        }

        pub(super) fn pairing_data(&self) -> Option<SavedPairing> {
            let value = self.call_sync("pairingData", &[]).ok()?;
            if value.is_undefined() || value.is_null() {
                return None;
            }
            let topic = self.topic().unwrap_or_default();
            from_js::<WirePairing>(value).ok().map(|p| p.into_saved(&topic))
        }

        pub(super) fn pairing_by_topic(&self, topic: &str) -> Result<Option<SavedPairing>, PortError> {
            let value = self.call_sync("getPairingByTopic", &[JsValue::from_str(topic)])?;
            if value.is_undefined() || value.is_null() {
                return Ok(None);
            }
            Ok(Some(from_js::<WirePairing>(value)?.into_saved(topic)))
        }

        pub(super) async fn request_additional_accounts(
            &self,
            topic: &str,
            network: Network,
        ) -> Result<(), PortError> {
            let bridge = bridge()?;
            call_async(
                &bridge,
                "requestAdditionalAccounts",
                &[JsValue::from_str(topic), JsValue::from_str(network.as_str())],
            )
            .await
            .map(|_| ())
        }

        pub(super) async fn send_transaction(
            &self,
            topic: Option<&str>,
            account: &AccountRef,
            request: &ContractExecuteRequest,
        ) -> Result<WalletTxResponse, PortError> {
            let bridge = bridge()?;
            let topic = topic.ok_or_else(|| {
                PortError::NotFound("no pairing topic for transaction".to_owned())
            })?;
            let raw = call_async(
                &bridge,
                "sendTransaction",
                &[
                    JsValue::from_str(topic),
                    JsValue::from_str(account.as_str()),
                    to_js(request)?,
                ],
            )
            .await?;
            let wire: WireTxResponse = from_js(raw)?;
            Ok(WalletTxResponse {
                success: wire.success,
                transaction_id: wire.transaction_id,
                receipt: wire.receipt,
                error: wire.error,
            })
        }
    }
}
