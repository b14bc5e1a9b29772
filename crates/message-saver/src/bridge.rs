//! Bridge between the presentation shell and the message-saver crates.
//! This must remain the only shell-facing boundary for wallet and contract
//! operations.

use std::sync::Arc;

use alloy::primitives::Address;
use serde_json::Value;

#[cfg(target_arch = "wasm32")]
use message_saver_adapters::BrowserStorage;
#[cfg(not(target_arch = "wasm32"))]
use message_saver_adapters::MemoryStorage;
use message_saver_adapters::{
    AppConfig, Eip1193Adapter, HashConnectFactory, ManualEntryAdapter, MessageAbiAdapter,
    MirrorNodeLedger, RuntimeTimer, SystemClockAdapter,
};
use message_saver_core::{
    AccountRef, ConnectStatus, ContractMessage, Network, PendingConnect, PortError, QueryResult,
    RouterError, SessionError, SessionManager, Subscription, TransactionOutcome,
    TransactionRouter, WalletState,
};

#[cfg(not(target_arch = "wasm32"))]
type Storage = MemoryStorage;
#[cfg(target_arch = "wasm32")]
type Storage = BrowserStorage;

type BridgeSession = SessionManager<
    HashConnectFactory,
    Eip1193Adapter,
    Storage,
    ManualEntryAdapter,
    RuntimeTimer,
    SystemClockAdapter,
>;

type BridgeRouter = TransactionRouter<
    Arc<BridgeSession>,
    Eip1193Adapter,
    MirrorNodeLedger,
    MessageAbiAdapter,
    RuntimeTimer,
>;

type BridgeMessages = message_saver_core::MessageService<Arc<BridgeRouter>>;

#[derive(Clone)]
pub struct MessageSaverBridge {
    config: Arc<AppConfig>,
    session: Arc<BridgeSession>,
    router: Arc<BridgeRouter>,
    messages: Arc<BridgeMessages>,
}

impl MessageSaverBridge {
    /// Wires every runtime adapter selected by `config`. `manual_entry`
    /// decides how the last recovery step asks for an account id.
    pub fn new(config: AppConfig, manual_entry: ManualEntryAdapter) -> Result<Self, PortError> {
        let provider = Eip1193Adapter::with_config(&config);
        let timer = RuntimeTimer;

        #[cfg(not(target_arch = "wasm32"))]
        let (storage, factory) = {
            let storage = MemoryStorage::new();
            let factory = HashConnectFactory::with_config(&config).with_storage(storage.clone());
            (storage, factory)
        };
        #[cfg(target_arch = "wasm32")]
        let (storage, factory) = (BrowserStorage, HashConnectFactory::with_config(&config));

        let session = Arc::new(SessionManager::new(
            factory,
            provider.clone(),
            storage,
            manual_entry,
            timer.clone(),
            SystemClockAdapter,
            config.session_config(),
        ));
        let router = Arc::new(TransactionRouter::new(
            Arc::clone(&session),
            provider,
            MirrorNodeLedger::with_config(&config),
            MessageAbiAdapter::new()?,
            timer,
            config.router_config(),
        ));
        let messages = Arc::new(BridgeMessages::new(Arc::clone(&router)));

        Ok(Self {
            config: Arc::new(config),
            session,
            router,
            messages,
        })
    }

    pub async fn initialize(&self) -> Result<(), SessionError> {
        self.session.initialize().await
    }

    /// Requests pairing on `network` (default: the configured one). A
    /// `Requested` status must be driven with [`Self::await_pairing`]; the
    /// recovery cascade and timeout do not run otherwise. Use
    /// [`Self::connect_and_wait`] to do both.
    pub async fn connect(&self, network: Option<Network>) -> Result<ConnectStatus, SessionError> {
        self.session
            .connect(network.unwrap_or(self.config.network))
            .await
    }

    pub async fn await_pairing(&self, pending: PendingConnect) -> Result<WalletState, SessionError> {
        self.session.await_pairing(pending).await
    }

    pub async fn connect_and_wait(
        &self,
        network: Option<Network>,
    ) -> Result<WalletState, SessionError> {
        self.session
            .connect_and_wait(network.unwrap_or(self.config.network))
            .await
    }

    pub fn connect_manual(&self, account_id: &str) -> Result<WalletState, SessionError> {
        self.session.connect_manual(account_id)
    }

    pub async fn connect_injected(&self) -> Result<WalletState, SessionError> {
        self.session.connect_injected().await
    }

    pub async fn restore_injected(&self) -> Result<bool, SessionError> {
        self.session.restore_injected().await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await
    }

    pub fn on_state_change<H>(&self, handler: H) -> Subscription
    where
        H: Fn(&WalletState) + 'static,
    {
        self.session.on_state_change(handler)
    }

    pub fn wallet_state(&self) -> WalletState {
        self.session.wallet_state()
    }

    pub async fn execute(
        &self,
        function_name: &str,
        args: &[Value],
        gas: Option<u64>,
    ) -> Result<TransactionOutcome, RouterError> {
        self.router.execute(function_name, args, gas).await
    }

    pub async fn query(&self, function_name: &str, args: &[Value]) -> Result<QueryResult, RouterError> {
        self.router.query(function_name, args).await
    }

    pub async fn store_message(&self, content: &str) -> TransactionOutcome {
        self.messages.store_message(content).await
    }

    pub async fn message_count(&self) -> u64 {
        self.messages.message_count().await
    }

    pub async fn message(&self, id: u64) -> Option<ContractMessage> {
        self.messages.message(id).await
    }

    pub async fn recent_messages(&self, count: Option<u64>) -> Vec<ContractMessage> {
        self.messages.recent_messages(count).await
    }

    pub async fn user_messages(&self, user: Address) -> Vec<u64> {
        self.messages.user_messages(user).await
    }

    pub async fn user_message_count(&self, user: Address) -> u64 {
        self.messages.user_message_count(user).await
    }

    /// Formatted balance of `account`, else the connected account, else the
    /// configured operator account.
    pub async fn balance(&self, account: Option<AccountRef>) -> Option<String> {
        let account = account
            .or_else(|| self.wallet_state().account_id)
            .or_else(|| self.config.account_id.clone())?;
        Some(self.router.account_balance(&account).await)
    }

    /// Configured operator account with its checksum suffix, if both are set.
    pub fn operator_label(&self) -> Option<String> {
        let account = self.config.account_id.as_ref()?;
        Some(match &self.config.account_checksum {
            Some(checksum) => format!("{}-{checksum}", account.as_str()),
            None => account.as_str().to_owned(),
        })
    }
}
