//! Wallet Session Manager.
//!
//! Owns the pairing transport, drives the session state machine through the
//! [`SessionStore`], and recovers from pairing events that never arrive. A
//! connect request hands back a [`PendingConnect`] token; the caller decides
//! whether to wait on it with [`SessionManager::await_pairing`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use alloy::primitives::Address;
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::domain::{
    AccountRef, ContractExecuteRequest, EvmChainParams, Network, PairingEvent, StorageArea,
    TimestampMs, TransportStatus, WalletBackend, WalletMetadata, WalletState, WalletTxResponse,
};
use crate::error::SessionError;
use crate::ports::{
    ClockPort, EvmProviderPort, ManualEntryPort, PairingHandler, PortError, StatusHandler,
    StoragePort, TimerPort, TransportFactoryPort, TransportHandlers, TransportPort,
};
use crate::state_machine::{SessionAction, SessionPhase};
use crate::store::{SessionState, SessionStore, StateListener, Subscription};

pub const MANUAL_ENTRY_PROMPT: &str = "HashPack did not report your account automatically.\n\
Enter your Hedera account ID (format 0.0.123456):";

fn native_account_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b0\.0\.\d+").expect("valid account id pattern"))
}

/// First default-realm account id embedded anywhere in `value`.
pub fn find_native_account_id(value: &str) -> Option<AccountRef> {
    native_account_pattern()
        .find(value)
        .map(|m| AccountRef::new(m.as_str()))
}

/// Token for one in-flight connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnect {
    pub attempt: u64,
    pub network: Network,
    pub topic: Option<String>,
    pub requested_at: TimestampMs,
    pub deadline: TimestampMs,
    pub checkpoints_ms: Vec<u64>,
    /// Set on the single retry issued by the soft-reset strategy.
    pub is_retry: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStatus {
    AlreadyConnected,
    /// Another attempt holds the slot; nothing was sent to the wallet.
    AlreadyConnecting(u64),
    Requested(PendingConnect),
}

/// Recovery strategies, in the order they are tried at each checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    TransportStatus,
    TopicLookup,
    StorageScan,
    SoftReset,
    ManualEntry,
}

impl RecoveryStrategy {
    pub const CASCADE: [RecoveryStrategy; 5] = [
        RecoveryStrategy::TransportStatus,
        RecoveryStrategy::TopicLookup,
        RecoveryStrategy::StorageScan,
        RecoveryStrategy::SoftReset,
        RecoveryStrategy::ManualEntry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RecoveryStrategy::TransportStatus => "transport-status",
            RecoveryStrategy::TopicLookup => "topic-lookup",
            RecoveryStrategy::StorageScan => "storage-scan",
            RecoveryStrategy::SoftReset => "soft-reset",
            RecoveryStrategy::ManualEntry => "manual-entry",
        }
    }

    /// Manual entry interrupts the user, so it only runs at the last checkpoint.
    fn runs_at(self, is_final_checkpoint: bool) -> bool {
        self != RecoveryStrategy::ManualEntry || is_final_checkpoint
    }
}

enum Recovery {
    Adopted,
    Retried(PendingConnect),
    Nothing,
}

#[derive(Debug, Clone, Copy)]
struct AttemptSlot {
    attempt: u64,
    deadline_ms: u64,
}

struct SessionRuntime<X> {
    transport: Option<Arc<X>>,
    attempt: Option<AttemptSlot>,
    next_attempt: u64,
    soft_reset_topics: HashSet<String>,
}

/// What the transaction router needs from an active session.
#[async_trait(?Send)]
pub trait SessionContext {
    fn active_account(&self) -> Option<AccountRef>;
    async fn submit_contract_execution(
        &self,
        account: &AccountRef,
        request: &ContractExecuteRequest,
    ) -> Result<WalletTxResponse, PortError>;
}

#[async_trait(?Send)]
impl<X: SessionContext + ?Sized> SessionContext for Arc<X> {
    fn active_account(&self) -> Option<AccountRef> {
        (**self).active_account()
    }

    async fn submit_contract_execution(
        &self,
        account: &AccountRef,
        request: &ContractExecuteRequest,
    ) -> Result<WalletTxResponse, PortError> {
        (**self).submit_contract_execution(account, request).await
    }
}

pub struct SessionManager<F, E, S, M, T, C>
where
    F: TransportFactoryPort,
    E: EvmProviderPort,
    S: StoragePort,
    M: ManualEntryPort,
    T: TimerPort,
    C: ClockPort,
{
    pub transport_factory: F,
    pub evm_provider: E,
    pub storage: S,
    pub manual_entry: M,
    pub timer: T,
    pub clock: C,
    config: SessionConfig,
    store: Arc<SessionStore>,
    runtime: Mutex<SessionRuntime<F::Transport>>,
}

impl<F, E, S, M, T, C> SessionManager<F, E, S, M, T, C>
where
    F: TransportFactoryPort,
    E: EvmProviderPort,
    S: StoragePort,
    M: ManualEntryPort,
    T: TimerPort,
    C: ClockPort,
{
    pub fn new(
        transport_factory: F,
        evm_provider: E,
        storage: S,
        manual_entry: M,
        timer: T,
        clock: C,
        config: SessionConfig,
    ) -> Self {
        let store = SessionStore::new(config.network);
        Self {
            transport_factory,
            evm_provider,
            storage,
            manual_entry,
            timer,
            clock,
            config,
            store,
            runtime: Mutex::new(SessionRuntime {
                transport: None,
                attempt: None,
                next_attempt: 1,
                soft_reset_topics: HashSet::new(),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn session_state(&self) -> Result<SessionState, SessionError> {
        self.store.snapshot()
    }

    pub fn wallet_state(&self) -> WalletState {
        match self.store.wallet_state() {
            Ok(state) => state,
            Err(e) => {
                warn!("wallet state unavailable: {e}");
                WalletState::default()
            }
        }
    }

    /// Registers a state listener for as long as the returned handle lives.
    pub fn on_state_change<H>(&self, handler: H) -> Subscription
    where
        H: Fn(&WalletState) + 'static,
    {
        let listener: Arc<StateListener> = Arc::new(handler);
        self.store.subscribe(listener)
    }

    pub fn transport(&self) -> Option<Arc<F::Transport>> {
        match self.runtime.lock() {
            Ok(runtime) => runtime.transport.clone(),
            Err(e) => {
                warn!("session runtime lock poisoned: {e}");
                None
            }
        }
    }

    fn lock_runtime(&self) -> Result<MutexGuard<'_, SessionRuntime<F::Transport>>, SessionError> {
        self.runtime
            .lock()
            .map_err(|e| SessionError::Lock(format!("session runtime lock poisoned: {e}")))
    }

    fn now_ms(&self) -> Result<u64, SessionError> {
        self.clock.now_ms().map_err(SessionError::Transport)
    }

    /// Creates and initializes the pairing transport. Calling it again while
    /// initializing or initialized is a no-op.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        let proceed = self.store.update(|s| {
            if s.phase != SessionPhase::Uninitialized {
                return Ok(false);
            }
            s.transition(SessionAction::BeginInit)?;
            Ok(true)
        })?;
        if !proceed {
            debug!("wallet transport already initialized or initializing");
            return Ok(());
        }

        let network = self.store.snapshot()?.network;
        match self.bootstrap(network).await {
            Ok(restored) => {
                info!(%network, restored, "wallet transport ready");
                Ok(())
            }
            Err(e) => {
                error!(%network, "wallet transport initialization failed: {e}");
                if let Ok(mut runtime) = self.runtime.lock() {
                    runtime.transport = None;
                }
                self.store.update(|s| {
                    s.transition(SessionAction::InitFailed)?;
                    s.initialized = false;
                    s.clear_accounts();
                    Ok(true)
                })?;
                Err(e)
            }
        }
    }

    async fn bootstrap(&self, network: Network) -> Result<bool, SessionError> {
        let transport = Arc::new(
            self.transport_factory
                .create(network)
                .map_err(SessionError::Initialization)?,
        );
        transport
            .subscribe(self.handlers(&transport))
            .map_err(SessionError::Initialization)?;
        self.lock_runtime()?.transport = Some(Arc::clone(&transport));

        let init = transport
            .init(&self.config.app_metadata, network, self.config.init_single_account)
            .await
            .map_err(SessionError::Initialization)?;
        debug!(
            topic = ?init.topic,
            has_pairing_string = init.pairing_string.is_some(),
            saved_pairings = init.saved_pairings.len(),
            "transport init returned"
        );

        let saved = init
            .saved_pairings
            .into_iter()
            .find(|pairing| !pairing.account_ids.is_empty());
        let mut restored = false;
        self.store.update(|s| {
            s.transition(SessionAction::InitSucceeded)?;
            s.initialized = true;
            if let Some(pairing) = saved.filter(|_| s.accepts_hashconnect()) {
                info!(topic = %pairing.topic, "restoring saved pairing");
                restored = true;
                s.adopt_accounts(pairing.account_ids, pairing.metadata, WalletBackend::HashConnect);
            }
            if s.connected {
                s.transition(SessionAction::Paired)?;
            }
            Ok(true)
        })?;
        Ok(restored)
    }

    fn handlers(&self, transport: &Arc<F::Transport>) -> TransportHandlers {
        let pairing_store = Arc::downgrade(&self.store);
        let on_pairing: PairingHandler =
            Arc::new(move |event| apply_pairing_event(&pairing_store, "pairing", event));

        let extra_store = Arc::downgrade(&self.store);
        let on_additional_accounts: PairingHandler = Arc::new(move |event| {
            apply_pairing_event(&extra_store, "additional-accounts", event)
        });

        let status_store = Arc::downgrade(&self.store);
        let weak_transport = Arc::downgrade(transport);
        let on_status: StatusHandler =
            Arc::new(move |status| on_transport_status(&status_store, &weak_transport, status));

        TransportHandlers {
            on_pairing,
            on_status,
            on_additional_accounts,
        }
    }

    /// Asks the local wallet to pair. Success is only observable through a
    /// later pairing event; pass the returned token to [`Self::await_pairing`].
    ///
    /// The recovery cascade and the `Connecting -> Ready` timeout run only
    /// inside `await_pairing`. A caller that drops the token leaves the phase
    /// at `Connecting` and the slot held until its deadline passes, after
    /// which the next `connect` reclaims it.
    pub async fn connect(&self, network: Network) -> Result<ConnectStatus, SessionError> {
        let snapshot = self.store.snapshot()?;
        if snapshot.connected && snapshot.network == network {
            debug!(account = ?snapshot.selected_account_id, "connect skipped: already connected");
            return Ok(ConnectStatus::AlreadyConnected);
        }

        let attempt = match self.reserve_attempt() {
            Ok(attempt) => attempt,
            Err(SessionError::AlreadyConnecting(current)) => {
                warn!(attempt = current, "connect already in flight; request ignored");
                return Ok(ConnectStatus::AlreadyConnecting(current));
            }
            Err(e) => return Err(e),
        };

        let result = self.request_connection(attempt, network).await;
        if !matches!(result, Ok(ConnectStatus::Requested(_))) {
            self.release_attempt(attempt);
        }
        result
    }

    /// Convenience: [`Self::connect`] followed by [`Self::await_pairing`].
    pub async fn connect_and_wait(&self, network: Network) -> Result<WalletState, SessionError> {
        match self.connect(network).await? {
            ConnectStatus::AlreadyConnected => Ok(self.store.wallet_state()?),
            ConnectStatus::AlreadyConnecting(attempt) => Err(SessionError::AlreadyConnecting(attempt)),
            ConnectStatus::Requested(pending) => self.await_pairing(pending).await,
        }
    }

    fn reserve_attempt(&self) -> Result<u64, SessionError> {
        let now = self.now_ms()?;
        let mut runtime = self.lock_runtime()?;
        if let Some(slot) = runtime.attempt {
            if slot.deadline_ms > now {
                return Err(SessionError::AlreadyConnecting(slot.attempt));
            }
            debug!(attempt = slot.attempt, "expired connect attempt released");
        }
        let attempt = runtime.next_attempt;
        runtime.next_attempt += 1;
        runtime.attempt = Some(AttemptSlot {
            attempt,
            deadline_ms: now.saturating_add(self.config.attempt_window_ms()),
        });
        Ok(attempt)
    }

    fn release_attempt(&self, attempt: u64) {
        if let Ok(mut runtime) = self.runtime.lock() {
            if runtime.attempt.map(|slot| slot.attempt) == Some(attempt) {
                runtime.attempt = None;
            }
        }
    }

    fn is_current(&self, attempt: u64) -> Result<bool, SessionError> {
        Ok(self.lock_runtime()?.attempt.map(|slot| slot.attempt) == Some(attempt))
    }

    async fn request_connection(
        &self,
        attempt: u64,
        network: Network,
    ) -> Result<ConnectStatus, SessionError> {
        if self.store.snapshot()?.network != network {
            self.rebuild_for_network(network).await?;
        }
        self.wait_until_ready().await?;
        if self.config.clear_on_connect {
            self.hard_clear().await?;
            self.wait_until_ready().await?;
        }

        let proceed = self.store.update(|s| {
            if s.connected {
                return Ok(false);
            }
            if s.phase == SessionPhase::Connecting {
                debug!("stale connect attempt abandoned");
                s.transition(SessionAction::ConnectTimedOut)?;
            }
            s.transition(SessionAction::BeginConnect)?;
            Ok(true)
        })?;
        if !proceed {
            return Ok(ConnectStatus::AlreadyConnected);
        }

        if self.config.connect_delay_ms > 0 {
            self.timer.sleep_ms(self.config.connect_delay_ms).await;
        }
        if self.store.snapshot()?.connected {
            return Ok(ConnectStatus::AlreadyConnected);
        }

        let transport = self.transport().ok_or_else(|| {
            SessionError::Transport(PortError::NotFound(
                "wallet transport instance not available".to_owned(),
            ))
        })?;
        if let Err(e) = transport.connect_local_wallet() {
            warn!(attempt, "local wallet connect failed: {e}");
            self.store.update(|s| {
                s.transition(SessionAction::ConnectFailed)?;
                Ok(true)
            })?;
            return Err(SessionError::Transport(e));
        }

        let requested_at = self.now_ms()?;
        let deadline = requested_at.saturating_add(self.config.final_checkpoint_ms());
        let pending = PendingConnect {
            attempt,
            network,
            topic: transport.topic(),
            requested_at: TimestampMs(requested_at),
            deadline: TimestampMs(deadline),
            checkpoints_ms: self.config.recovery_checkpoints_ms.clone(),
            is_retry: false,
        };
        self.lock_runtime()?.attempt = Some(AttemptSlot {
            attempt,
            deadline_ms: deadline,
        });
        info!(attempt, topic = ?pending.topic, "pairing requested from local wallet");
        Ok(ConnectStatus::Requested(pending))
    }

    async fn wait_until_ready(&self) -> Result<(), SessionError> {
        let ready = |s: &SessionState| {
            matches!(
                s.phase,
                SessionPhase::Ready | SessionPhase::Connecting | SessionPhase::Connected
            )
        };
        if ready(&self.store.snapshot()?) {
            return Ok(());
        }
        debug!(wait_ms = self.config.init_wait_ms, "waiting for transport init");
        self.timer.sleep_ms(self.config.init_wait_ms).await;
        if ready(&self.store.snapshot()?) {
            Ok(())
        } else {
            Err(SessionError::InitializationTimeout(self.config.init_wait_ms))
        }
    }

    async fn rebuild_for_network(&self, network: Network) -> Result<(), SessionError> {
        let current = self.store.snapshot()?.network;
        info!(from = %current, to = %network, "switching wallet transport network");
        self.teardown_transport().await;
        let removed = self.clear_storage_matching(StorageArea::Local, |key| {
            key.contains("network_") || key.contains("_mainnet_") || key.contains("_testnet_")
        });
        debug!(removed, "network-scoped storage keys cleared");
        self.store.update(|s| {
            s.transition(SessionAction::Reset)?;
            s.clear_accounts();
            s.initialized = false;
            s.network = network;
            Ok(true)
        })?;
        self.initialize().await
    }

    async fn hard_clear(&self) -> Result<(), SessionError> {
        warn!("clearing persisted wallet storage before connecting");
        if let Err(e) = self.storage.clear(StorageArea::Local) {
            warn!("local storage clear failed: {e}");
        }
        self.teardown_transport().await;
        self.store.update(|s| {
            s.transition(SessionAction::Reset)?;
            s.clear_accounts();
            s.initialized = false;
            Ok(true)
        })?;
        self.initialize().await
    }

    async fn teardown_transport(&self) {
        let transport = match self.runtime.lock() {
            Ok(mut runtime) => runtime.transport.take(),
            Err(e) => {
                warn!("session runtime lock poisoned: {e}");
                None
            }
        };
        if let Some(transport) = transport {
            let topic = transport.topic();
            if let Err(e) = transport.disconnect(topic.as_deref()).await {
                debug!("transport disconnect during teardown failed: {e}");
            }
        }
    }

    fn clear_storage_matching(&self, area: StorageArea, matches: impl Fn(&str) -> bool) -> usize {
        let keys = match self.storage.keys(area) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(?area, "storage keys unavailable: {e}");
                return 0;
            }
        };
        let mut removed = 0;
        for key in keys.iter().filter(|key| matches(key)) {
            match self.storage.remove(area, key) {
                Ok(()) => removed += 1,
                Err(e) => warn!(?area, key, "storage key removal failed: {e}"),
            }
        }
        removed
    }

    /// Waits for the pairing requested by `pending`, running the recovery
    /// cascade at each checkpoint. Resolves once the session is connected.
    pub async fn await_pairing(&self, pending: PendingConnect) -> Result<WalletState, SessionError> {
        let mut pending = pending;
        'attempts: loop {
            let mut elapsed = 0u64;
            let first_checkpoint = pending.checkpoints_ms.first().copied().unwrap_or(0);
            let nudge_at = self.config.additional_accounts_delay_ms;
            if nudge_at > 0 && nudge_at < first_checkpoint {
                self.timer.sleep_ms(nudge_at).await;
                elapsed = nudge_at;
                if let Some(state) = self.settled(&pending)? {
                    return Ok(state);
                }
                self.nudge_additional_accounts(&pending).await;
            }

            let checkpoints = pending.checkpoints_ms.clone();
            for (index, checkpoint) in checkpoints.iter().copied().enumerate() {
                if checkpoint > elapsed {
                    self.timer.sleep_ms(checkpoint - elapsed).await;
                    elapsed = checkpoint;
                }
                if let Some(state) = self.settled(&pending)? {
                    return Ok(state);
                }
                let is_final = index + 1 == checkpoints.len();
                warn!(
                    attempt = pending.attempt,
                    checkpoint = index + 1,
                    elapsed_ms = elapsed,
                    "pairing event not received; running recovery"
                );
                match self.run_recovery(&pending, is_final).await? {
                    Recovery::Adopted => {
                        if let Some(state) = self.settled(&pending)? {
                            return Ok(state);
                        }
                    }
                    Recovery::Retried(next) => {
                        pending = next;
                        continue 'attempts;
                    }
                    Recovery::Nothing => {}
                }
            }

            return self.time_out(&pending, elapsed);
        }
    }

    /// `Some` once connected; errors when this attempt lost its slot.
    fn settled(&self, pending: &PendingConnect) -> Result<Option<WalletState>, SessionError> {
        if !self.is_current(pending.attempt)? {
            return Err(SessionError::ConnectAbandoned(pending.attempt));
        }
        let state = self.store.snapshot()?;
        if state.connected {
            self.release_attempt(pending.attempt);
            return Ok(Some(state.wallet_state()));
        }
        Ok(None)
    }

    fn time_out(&self, pending: &PendingConnect, waited_ms: u64) -> Result<WalletState, SessionError> {
        self.release_attempt(pending.attempt);
        self.store.update(|s| {
            if s.phase != SessionPhase::Connecting {
                return Ok(false);
            }
            s.transition(SessionAction::ConnectTimedOut)?;
            Ok(true)
        })?;
        error!(attempt = pending.attempt, waited_ms, "connect attempt timed out");
        Err(SessionError::ConnectionTimeout {
            attempt: pending.attempt,
            waited_ms,
        })
    }

    async fn nudge_additional_accounts(&self, pending: &PendingConnect) {
        let Some(transport) = self.transport() else {
            return;
        };
        let Some(topic) = pending.topic.clone().or_else(|| transport.topic()) else {
            return;
        };
        debug!(topic, "requesting additional accounts");
        if let Err(e) = transport
            .request_additional_accounts(&topic, pending.network)
            .await
        {
            debug!("additional accounts request failed: {e}");
        }
    }

    async fn run_recovery(
        &self,
        pending: &PendingConnect,
        is_final_checkpoint: bool,
    ) -> Result<Recovery, SessionError> {
        for strategy in RecoveryStrategy::CASCADE {
            if !strategy.runs_at(is_final_checkpoint) {
                continue;
            }
            if self.settled(pending)?.is_some() {
                return Ok(Recovery::Adopted);
            }
            let outcome = match strategy {
                RecoveryStrategy::TransportStatus => self.recover_from_transport_status(),
                RecoveryStrategy::TopicLookup => self.recover_from_topic_lookup(pending),
                RecoveryStrategy::StorageScan => self.recover_from_storage(),
                RecoveryStrategy::SoftReset => self.soft_reset_and_retry(pending).await,
                RecoveryStrategy::ManualEntry => self.recover_from_manual_entry().await,
            };
            match outcome {
                Ok(Recovery::Nothing) => {
                    debug!(strategy = strategy.name(), "recovery strategy found nothing")
                }
                Ok(found) => {
                    info!(strategy = strategy.name(), "pairing recovered");
                    return Ok(found);
                }
                Err(e) => warn!(strategy = strategy.name(), "recovery strategy failed: {e}"),
            }
        }
        Ok(Recovery::Nothing)
    }

    fn recover_from_transport_status(&self) -> Result<Recovery, SessionError> {
        let Some(transport) = self.transport() else {
            return Ok(Recovery::Nothing);
        };
        let status = transport.status();
        if !status.is_paired() {
            debug!(?status, "transport not paired");
            return Ok(Recovery::Nothing);
        }
        warn!(?status, "transport reports a pairing that was never announced");
        match transport.pairing_data() {
            Some(pairing) if !pairing.account_ids.is_empty() => {
                adopt_recovered(&self.store, pairing.account_ids, pairing.metadata)?;
                Ok(Recovery::Adopted)
            }
            _ => Ok(Recovery::Nothing),
        }
    }

    fn recover_from_topic_lookup(&self, pending: &PendingConnect) -> Result<Recovery, SessionError> {
        let Some(transport) = self.transport() else {
            return Ok(Recovery::Nothing);
        };
        let Some(topic) = transport.topic().or_else(|| pending.topic.clone()) else {
            return Ok(Recovery::Nothing);
        };
        match transport
            .pairing_by_topic(&topic)
            .map_err(SessionError::Transport)?
        {
            Some(pairing) if !pairing.account_ids.is_empty() => {
                adopt_recovered(&self.store, pairing.account_ids, pairing.metadata)?;
                Ok(Recovery::Adopted)
            }
            _ => Ok(Recovery::Nothing),
        }
    }

    fn recover_from_storage(&self) -> Result<Recovery, SessionError> {
        for area in [StorageArea::Local, StorageArea::Session] {
            let keys = self.storage.keys(area).map_err(SessionError::Storage)?;
            for key in keys {
                let Some(value) = self.storage.get(area, &key).map_err(SessionError::Storage)?
                else {
                    continue;
                };
                if let Some(account) = find_native_account_id(&value) {
                    warn!(?area, key, %account, "adopting account id found in persisted storage");
                    adopt_recovered(
                        &self.store,
                        vec![account],
                        Some(WalletMetadata::hashpack("HashPack Wallet (extracted from storage)")),
                    )?;
                    return Ok(Recovery::Adopted);
                }
            }
        }
        Ok(Recovery::Nothing)
    }

    async fn soft_reset_and_retry(&self, pending: &PendingConnect) -> Result<Recovery, SessionError> {
        if !self.config.auto_soft_reset || pending.is_retry {
            return Ok(Recovery::Nothing);
        }
        let Some(topic) = pending
            .topic
            .clone()
            .or_else(|| self.transport().and_then(|t| t.topic()))
        else {
            return Ok(Recovery::Nothing);
        };
        let first_time = self.lock_runtime()?.soft_reset_topics.insert(topic.clone());
        if !first_time {
            debug!(topic, "soft reset already attempted for topic");
            return Ok(Recovery::Nothing);
        }

        warn!(topic, attempt = pending.attempt, "soft-resetting wallet transport");
        self.teardown_transport().await;
        let removed = self.clear_storage_matching(StorageArea::Local, |key| {
            let key = key.to_ascii_lowercase();
            key.contains("hashconnect") || key.contains("hashpack")
        });
        debug!(removed, "wallet transport storage keys cleared");
        self.store.update(|s| {
            s.transition(SessionAction::Reset)?;
            s.clear_accounts();
            s.initialized = false;
            Ok(true)
        })?;
        self.initialize().await?;

        match self.request_connection(pending.attempt, pending.network).await? {
            ConnectStatus::Requested(mut next) => {
                next.is_retry = true;
                Ok(Recovery::Retried(next))
            }
            ConnectStatus::AlreadyConnected => Ok(Recovery::Adopted),
            ConnectStatus::AlreadyConnecting(_) => Ok(Recovery::Nothing),
        }
    }

    async fn recover_from_manual_entry(&self) -> Result<Recovery, SessionError> {
        warn!("automatic account detection failed; asking for manual entry");
        let Some(raw) = self.manual_entry.request_account_id(MANUAL_ENTRY_PROMPT).await else {
            info!("manual account entry dismissed");
            return Ok(Recovery::Nothing);
        };
        self.connect_manual(&raw)?;
        Ok(Recovery::Adopted)
    }

    /// Adopts a user-supplied `0.0.N` account id.
    pub fn connect_manual(&self, raw: &str) -> Result<WalletState, SessionError> {
        let account = AccountRef::new(raw.trim());
        if !account.is_default_realm_native() {
            warn!(input = raw, "rejected manual account id");
            return Err(SessionError::InvalidAccountId(raw.to_owned()));
        }
        info!(%account, "manual account id adopted");
        adopt_recovered(
            &self.store,
            vec![account],
            Some(WalletMetadata::hashpack("HashPack Wallet (manual entry)")),
        )?;
        self.store.wallet_state()
    }

    /// Connects an EIP-1193 injected wallet on the session's network.
    pub async fn connect_injected(&self) -> Result<WalletState, SessionError> {
        let network = self.store.snapshot()?.network;
        let chain = EvmChainParams::for_network(network);
        if let Err(e) = self.evm_provider.add_chain(&chain).await {
            debug!(chain_id = chain.chain_id, "add chain failed, continuing: {e}");
        }
        if let Err(e) = self.evm_provider.switch_chain(chain.chain_id).await {
            info!(chain_id = chain.chain_id, "chain switch failed, continuing: {e}");
        }
        let accounts = self
            .evm_provider
            .request_accounts()
            .await
            .map_err(SessionError::Provider)?;
        let address = accounts.first().copied().ok_or_else(|| {
            SessionError::Provider(PortError::Rejected(
                "injected wallet returned no accounts".to_owned(),
            ))
        })?;
        self.adopt_injected(address)
    }

    /// Restores an injected wallet that already authorized this origin.
    pub async fn restore_injected(&self) -> Result<bool, SessionError> {
        let accounts = match self.evm_provider.accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                debug!("injected wallet not available: {e}");
                return Ok(false);
            }
        };
        match accounts.first() {
            Some(address) => {
                self.adopt_injected(*address)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn adopt_injected(&self, address: Address) -> Result<WalletState, SessionError> {
        let account = AccountRef::from(address);
        if let Some(slot) = self.lock_runtime()?.attempt.take() {
            info!(attempt = slot.attempt, "pending HashConnect attempt abandoned for injected wallet");
        }
        self.store.update(|s| {
            s.transition(SessionAction::AdoptExternal)?;
            s.adopt_accounts(
                vec![account.clone()],
                Some(WalletMetadata {
                    name: "MetaMask".to_owned(),
                    description: "Injected EVM wallet".to_owned(),
                    icon: String::new(),
                }),
                WalletBackend::Injected,
            );
            Ok(true)
        })?;
        info!(%account, "injected wallet connected");
        self.store.wallet_state()
    }

    /// Clears the session. Transport failures are logged, never returned.
    pub async fn disconnect(&self) {
        let backend = self.store.snapshot().ok().and_then(|s| s.backend);
        if backend != Some(WalletBackend::Injected) {
            if let Some(transport) = self.transport() {
                let topic = transport.topic();
                if let Err(e) = transport.disconnect(topic.as_deref()).await {
                    warn!("transport disconnect failed; clearing session anyway: {e}");
                }
            }
        }
        if let Ok(mut runtime) = self.runtime.lock() {
            if let Some(slot) = runtime.attempt.take() {
                debug!(attempt = slot.attempt, "pending connect abandoned by disconnect");
            }
        }
        let result = self.store.update(|s| {
            s.clear_accounts();
            if let Err(e) = s.transition(SessionAction::Disconnect) {
                debug!("phase kept on disconnect: {e}");
            }
            if s.phase == SessionPhase::Ready && !s.initialized {
                s.transition(SessionAction::Reset)?;
            }
            Ok(true)
        });
        match result {
            Ok(_) => info!("wallet disconnected"),
            Err(e) => warn!("disconnect state update failed: {e}"),
        }
    }
}

#[async_trait(?Send)]
impl<F, E, S, M, T, C> SessionContext for SessionManager<F, E, S, M, T, C>
where
    F: TransportFactoryPort,
    E: EvmProviderPort,
    S: StoragePort,
    M: ManualEntryPort,
    T: TimerPort,
    C: ClockPort,
{
    fn active_account(&self) -> Option<AccountRef> {
        let state = self.store.snapshot().ok()?;
        if state.connected {
            state.selected_account_id
        } else {
            None
        }
    }

    async fn submit_contract_execution(
        &self,
        account: &AccountRef,
        request: &ContractExecuteRequest,
    ) -> Result<WalletTxResponse, PortError> {
        let transport = self
            .transport()
            .ok_or_else(|| PortError::NotFound("no paired wallet transport".to_owned()))?;
        let topic = transport.topic();
        transport
            .send_transaction(topic.as_deref(), account, request)
            .await
    }
}

fn apply_pairing_event(store: &Weak<SessionStore>, source: &'static str, event: PairingEvent) {
    let Some(store) = store.upgrade() else {
        return;
    };
    if event.account_ids.is_empty() {
        warn!(source, "pairing event carried no account ids");
        return;
    }
    let result = store.update(|s| {
        if !s.accepts_hashconnect() {
            debug!(source, "pairing event ignored while an injected wallet is active");
            return Ok(false);
        }
        let transition = s.transition(SessionAction::Paired)?;
        s.merge_pairing(&event);
        info!(
            source,
            from = ?transition.from,
            to = ?transition.to,
            account = ?s.selected_account_id,
            "pairing adopted"
        );
        Ok(true)
    });
    if let Err(e) = result {
        warn!(source, "pairing event ignored: {e}");
    }
}

fn on_transport_status<X: TransportPort>(
    store: &Weak<SessionStore>,
    transport: &Weak<X>,
    status: TransportStatus,
) {
    debug!(?status, "transport status changed");
    if status != TransportStatus::Paired {
        return;
    }
    let (Some(store), Some(transport)) = (store.upgrade(), transport.upgrade()) else {
        return;
    };
    let has_accounts = store
        .snapshot()
        .map(|s| !s.account_ids.is_empty())
        .unwrap_or(true);
    if has_accounts {
        return;
    }
    let Some(topic) = transport.topic() else {
        return;
    };
    match transport.pairing_by_topic(&topic) {
        Ok(Some(pairing)) if !pairing.account_ids.is_empty() => {
            if let Err(e) = adopt_recovered(&store, pairing.account_ids, pairing.metadata) {
                warn!(topic, "paired status without usable pairing: {e}");
            }
        }
        Ok(_) => debug!(topic, "paired status but no pairing stored for topic"),
        Err(e) => debug!(topic, "pairing lookup after status change failed: {e}"),
    }
}

fn adopt_recovered(
    store: &SessionStore,
    account_ids: Vec<AccountRef>,
    metadata: Option<WalletMetadata>,
) -> Result<bool, SessionError> {
    store.update(|s| {
        s.transition(SessionAction::Paired)?;
        Ok(s.adopt_accounts(account_ids, metadata, WalletBackend::HashConnect))
    })
}
