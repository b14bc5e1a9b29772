//! Session State Store: the single writer of [`SessionState`].
//!
//! Mutations run under one lock and are published to subscribers as a
//! [`WalletState`] snapshot after the lock is released, so handlers may read
//! the store or unsubscribe from inside the callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{AccountRef, Network, PairingEvent, WalletBackend, WalletMetadata, WalletState};
use crate::error::SessionError;
use crate::state_machine::{session_transition, SessionAction, SessionPhase, StateTransition, TransitionError};

pub type StateListener = dyn Fn(&WalletState);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub network: Network,
    pub initialized: bool,
    pub connected: bool,
    pub account_ids: Vec<AccountRef>,
    pub selected_account_id: Option<AccountRef>,
    pub paired_metadata: Option<WalletMetadata>,
    pub backend: Option<WalletBackend>,
}

impl SessionState {
    pub fn new(network: Network) -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            network,
            initialized: false,
            connected: false,
            account_ids: Vec::new(),
            selected_account_id: None,
            paired_metadata: None,
            backend: None,
        }
    }

    pub fn transition(&mut self, action: SessionAction) -> Result<StateTransition, TransitionError> {
        let from = self.phase;
        let (to, reason) = session_transition(from, action)?;
        self.phase = to;
        Ok(StateTransition { from, to, reason })
    }

    /// HashConnect pairings never mix into a session owned by an injected
    /// wallet.
    pub fn accepts_hashconnect(&self) -> bool {
        self.backend != Some(WalletBackend::Injected)
    }

    /// Set-union merge of a pairing event. The selection moves to the last
    /// newly merged id, or to the event's last id when all were known.
    pub fn merge_pairing(&mut self, event: &PairingEvent) -> bool {
        if !self.accepts_hashconnect() {
            return false;
        }
        let Some(last) = event.account_ids.last() else {
            return false;
        };
        let mut selected = last.clone();
        for id in &event.account_ids {
            if !self.account_ids.contains(id) {
                self.account_ids.push(id.clone());
                selected = id.clone();
            }
        }
        if let Some(metadata) = event.metadata.clone() {
            self.paired_metadata = Some(metadata);
        }
        self.selected_account_id = Some(selected);
        self.connected = true;
        self.backend = Some(WalletBackend::HashConnect);
        true
    }

    /// Replaces the account list; the first id becomes the selection.
    pub fn adopt_accounts(
        &mut self,
        account_ids: Vec<AccountRef>,
        metadata: Option<WalletMetadata>,
        backend: WalletBackend,
    ) -> bool {
        let Some(first) = account_ids.first().cloned() else {
            return false;
        };
        self.account_ids = account_ids;
        self.selected_account_id = Some(first);
        self.paired_metadata = metadata;
        self.connected = true;
        self.backend = Some(backend);
        true
    }

    pub fn clear_accounts(&mut self) {
        self.connected = false;
        self.account_ids.clear();
        self.selected_account_id = None;
        self.paired_metadata = None;
        self.backend = None;
    }

    pub fn wallet_state(&self) -> WalletState {
        let account_id = if self.connected {
            self.selected_account_id.clone()
        } else {
            None
        };
        WalletState {
            connected: self.connected,
            evm_address: account_id.as_ref().and_then(AccountRef::evm_address),
            account_id,
            balance: None,
        }
    }
}

/// Handle returned by [`SessionStore::subscribe`]; the handler stays
/// registered until the handle is dropped or unsubscribed.
#[derive(Debug)]
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    store: Weak<SessionStore>,
    id: u64,
}

impl Subscription {
    /// Removes exactly the handler this subscription was created for.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.remove_listener(self.id);
        }
    }
}

pub struct SessionStore {
    state: Mutex<SessionState>,
    listeners: Mutex<Vec<(u64, Arc<StateListener>)>>,
    next_listener_id: AtomicU64,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(network: Network) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState::new(network)),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        })
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SessionState>, SessionError> {
        self.state
            .lock()
            .map_err(|e| SessionError::Lock(format!("session state lock poisoned: {e}")))
    }

    pub fn snapshot(&self) -> Result<SessionState, SessionError> {
        Ok(self.lock_state()?.clone())
    }

    pub fn wallet_state(&self) -> Result<WalletState, SessionError> {
        Ok(self.lock_state()?.wallet_state())
    }

    /// Applies `mutate` atomically; subscribers are notified only when it
    /// reports a change.
    pub fn update<F>(&self, mutate: F) -> Result<bool, SessionError>
    where
        F: FnOnce(&mut SessionState) -> Result<bool, SessionError>,
    {
        let published = {
            let mut state = self.lock_state()?;
            let mut draft = state.clone();
            if !mutate(&mut draft)? {
                return Ok(false);
            }
            debug_assert!(
                !draft.connected || draft.selected_account_id.is_some(),
                "connected session without a selected account"
            );
            *state = draft;
            state.wallet_state()
        };
        self.notify(&published);
        Ok(true)
    }

    pub fn subscribe(self: &Arc<Self>, listener: Arc<StateListener>) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push((id, listener)),
            Err(e) => warn!("listener registry lock poisoned: {e}"),
        }
        Subscription {
            store: Arc::downgrade(self),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn remove_listener(&self, id: u64) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|(listener_id, _)| *listener_id != id);
        }
    }

    fn notify(&self, state: &WalletState) {
        let listeners: Vec<Arc<StateListener>> = match self.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(e) => {
                warn!("listener registry lock poisoned: {e}");
                return;
            }
        };
        debug!(
            listeners = listeners.len(),
            connected = state.connected,
            "publishing wallet state"
        );
        for listener in listeners {
            listener(state);
        }
    }
}
