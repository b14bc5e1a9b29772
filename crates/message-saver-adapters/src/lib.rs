pub mod abi;
#[cfg(target_arch = "wasm32")]
mod browser;
pub mod clock;
pub mod config;
pub mod eip1193;
pub mod hashconnect;
pub mod manual_entry;
pub mod mirror_node;
pub mod storage;
pub mod timer;

pub use abi::MessageAbiAdapter;
pub use clock::SystemClockAdapter;
pub use config::{AppConfig, ConfigError, RuntimeProfile};
pub use eip1193::Eip1193Adapter;
pub use hashconnect::{DeterministicWallet, HashConnectAdapter, HashConnectFactory, PairingBehavior};
pub use manual_entry::ManualEntryAdapter;
pub use mirror_node::MirrorNodeLedger;
pub use storage::MemoryStorage;
#[cfg(target_arch = "wasm32")]
pub use storage::BrowserStorage;
pub use timer::RuntimeTimer;
