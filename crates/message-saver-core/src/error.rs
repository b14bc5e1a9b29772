use thiserror::Error;

use crate::ports::PortError;
use crate::state_machine::TransitionError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("wallet transport initialization failed: {0}")]
    Initialization(#[source] PortError),
    #[error("a connect attempt is already in flight (attempt {0})")]
    AlreadyConnecting(u64),
    #[error("wallet transport did not finish initializing within {0} ms")]
    InitializationTimeout(u64),
    #[error("no pairing observed for connect attempt {attempt} after {waited_ms} ms")]
    ConnectionTimeout { attempt: u64, waited_ms: u64 },
    #[error("connect attempt {0} was superseded")]
    ConnectAbandoned(u64),
    #[error("invalid account id {0:?}: expected format 0.0.123456")]
    InvalidAccountId(String),
    #[error("wallet transport error: {0}")]
    Transport(#[source] PortError),
    #[error("persisted storage error: {0}")]
    Storage(#[source] PortError),
    #[error("injected wallet error: {0}")]
    Provider(#[source] PortError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("session lock poisoned: {0}")]
    Lock(String),
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("wallet not connected")]
    NoSession,
    #[error("contract not deployed: no {0} contract configured")]
    ContractNotConfigured(&'static str),
    #[error("unsupported operation on {backend} path: {function}")]
    UnsupportedOperation {
        backend: &'static str,
        function: String,
    },
    #[error("could not encode {function} arguments: {source}")]
    Encode {
        function: String,
        #[source]
        source: PortError,
    },
    #[error("could not decode {function} result: {message}")]
    Decode { function: String, message: String },
    #[error("{function} call failed: {source}")]
    Remote {
        function: String,
        #[source]
        source: PortError,
    },
    #[error("router lock poisoned: {0}")]
    Lock(String),
}
