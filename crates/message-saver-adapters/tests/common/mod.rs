#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use message_saver_adapters::{
    DeterministicWallet, Eip1193Adapter, HashConnectFactory, ManualEntryAdapter, MemoryStorage,
    MessageAbiAdapter, MirrorNodeLedger,
};
use message_saver_core::{
    ClockPort, EntityId, PortError, RouterConfig, SessionConfig, SessionManager, TimerPort,
    TransactionRouter,
};

pub const START_MS: u64 = 1_739_750_400_000;

/// Manually advanced wall clock shared with [`InstantTimer`].
#[derive(Debug, Clone)]
pub struct TestClock {
    now: Arc<AtomicU64>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self {
            now: Arc::new(AtomicU64::new(START_MS)),
        }
    }
}

impl TestClock {
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Milliseconds since the harness started.
    pub fn elapsed(&self) -> u64 {
        self.now.load(Ordering::SeqCst) - START_MS
    }
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.now.load(Ordering::SeqCst))
    }
}

/// Sleeps by advancing the clock, then yields once so futures joined with the
/// sleeper get polled.
#[derive(Debug, Clone, Default)]
pub struct InstantTimer {
    clock: TestClock,
    sleeps: Arc<Mutex<Vec<u64>>>,
}

impl InstantTimer {
    pub fn sleeps(&self) -> Vec<u64> {
        self.sleeps.lock().expect("sleeps lock").clone()
    }
}

#[async_trait(?Send)]
impl TimerPort for InstantTimer {
    async fn sleep_ms(&self, ms: u64) {
        self.sleeps.lock().expect("sleeps lock").push(ms);
        self.clock.advance(ms);
        tokio::task::yield_now().await;
    }
}

/// Yields until the harness clock reaches `elapsed_ms`.
pub async fn until_elapsed(clock: &TestClock, elapsed_ms: u64) {
    while clock.elapsed() < elapsed_ms {
        tokio::task::yield_now().await;
    }
}

pub type TestManager = SessionManager<
    HashConnectFactory,
    Eip1193Adapter,
    MemoryStorage,
    ManualEntryAdapter,
    InstantTimer,
    TestClock,
>;

pub type TestRouter = TransactionRouter<
    Arc<TestManager>,
    Eip1193Adapter,
    MirrorNodeLedger,
    MessageAbiAdapter,
    InstantTimer,
>;

pub struct Harness {
    pub manager: Arc<TestManager>,
    pub wallet: DeterministicWallet,
    pub storage: MemoryStorage,
    pub provider: Eip1193Adapter,
    pub clock: TestClock,
    pub timer: InstantTimer,
}

pub fn session_config() -> SessionConfig {
    SessionConfig::default()
}

pub fn harness() -> Harness {
    harness_with(session_config(), ManualEntryAdapter::Disabled)
}

pub fn harness_with(config: SessionConfig, manual_entry: ManualEntryAdapter) -> Harness {
    let storage = MemoryStorage::new();
    let factory = HashConnectFactory::in_memory().with_storage(storage.clone());
    let wallet = factory.wallet().clone();
    let provider = Eip1193Adapter::deterministic();
    let clock = TestClock::default();
    let timer = InstantTimer {
        clock: clock.clone(),
        sleeps: Arc::default(),
    };
    let manager = Arc::new(SessionManager::new(
        factory,
        provider.clone(),
        storage.clone(),
        manual_entry,
        timer.clone(),
        clock.clone(),
        config,
    ));
    Harness {
        manager,
        wallet,
        storage,
        provider,
        clock,
        timer,
    }
}

pub fn native_contract() -> EntityId {
    EntityId::new(0, 0, 5005)
}

pub fn evm_contract() -> Address {
    "0x00000000000000000000000000000000000013Ad"
        .parse()
        .expect("valid contract address")
}

pub fn router_config() -> RouterConfig {
    RouterConfig {
        contract_id: Some(native_contract()),
        contract_evm_address: Some(evm_contract()),
        ..RouterConfig::default()
    }
}

pub fn router(h: &Harness, config: RouterConfig, ledger: MirrorNodeLedger) -> TestRouter {
    TransactionRouter::new(
        Arc::clone(&h.manager),
        h.provider.clone(),
        ledger,
        MessageAbiAdapter::new().expect("message abi"),
        h.timer.clone(),
        config,
    )
}

pub fn uint(n: u64) -> DynSolValue {
    DynSolValue::Uint(U256::from(n), 256)
}

/// ABI-encoded return data for `outputs`.
pub fn encoded(outputs: Vec<DynSolValue>) -> Bytes {
    Bytes::from(DynSolValue::Tuple(outputs).abi_encode_params())
}

pub fn sender() -> Address {
    "0x2000000000000000000000000000000000000002"
        .parse()
        .expect("valid sender address")
}
