pub mod config;
pub mod domain;
pub mod error;
pub mod messages;
pub mod ports;
pub mod router;
pub mod session;
pub mod state_machine;
pub mod store;

pub use config::{RouterConfig, SessionConfig};
pub use domain::{
    AccountKind, AccountRef, AppMetadata, ContractFunction, ContractId, ContractMessage, EntityId,
    Hbar, Network, QueryResult, TimestampMs, TransactionOutcome, WalletBackend, WalletState,
};
pub use error::{RouterError, SessionError};
pub use messages::MessageService;
pub use ports::{
    AbiPort, ClockPort, EvmProviderPort, LedgerPort, ManualEntryPort, PortError, StoragePort,
    TimerPort, TransportFactoryPort, TransportPort,
};
pub use router::{Backend, ContractGateway, TransactionRouter};
pub use session::{ConnectStatus, PendingConnect, RecoveryStrategy, SessionContext, SessionManager};
pub use state_machine::{SessionAction, SessionPhase, StateTransition};
pub use store::{SessionState, SessionStore, Subscription};
