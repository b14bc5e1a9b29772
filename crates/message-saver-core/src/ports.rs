use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{
    AccountRef, AppMetadata, ContractCallRequest, ContractExecuteRequest, ContractFunction,
    EntityId, EvmCall, EvmChainParams, Hbar, InitData, Network, PairingEvent, QueryResult,
    SavedPairing, StorageArea, TransportStatus, WalletTxResponse,
};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("policy error: {0}")]
    Policy(String),
    #[error("rejected by wallet: {0}")]
    Rejected(String),
}

pub type PairingHandler = Arc<dyn Fn(PairingEvent)>;
pub type StatusHandler = Arc<dyn Fn(TransportStatus)>;

/// Callbacks registered on a transport before its init call.
#[derive(Clone)]
pub struct TransportHandlers {
    pub on_pairing: PairingHandler,
    pub on_status: StatusHandler,
    pub on_additional_accounts: PairingHandler,
}

impl std::fmt::Debug for TransportHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TransportHandlers { .. }")
    }
}

/// Builds a fresh pairing transport bound to one network.
pub trait TransportFactoryPort {
    type Transport: TransportPort + 'static;

    fn create(&self, network: Network) -> Result<Self::Transport, PortError>;
}

/// The HashConnect-style pairing bridge.
#[async_trait(?Send)]
pub trait TransportPort {
    fn subscribe(&self, handlers: TransportHandlers) -> Result<(), PortError>;
    async fn init(
        &self,
        metadata: &AppMetadata,
        network: Network,
        single_account: bool,
    ) -> Result<InitData, PortError>;
    /// Fire-and-forget: success is only observable through the pairing event.
    fn connect_local_wallet(&self) -> Result<(), PortError>;
    async fn disconnect(&self, topic: Option<&str>) -> Result<(), PortError>;
    fn status(&self) -> TransportStatus;
    fn topic(&self) -> Option<String>;
    /// Pairing data the transport negotiated but may not have announced.
    fn pairing_data(&self) -> Option<SavedPairing>;
    fn pairing_by_topic(&self, topic: &str) -> Result<Option<SavedPairing>, PortError>;
    async fn request_additional_accounts(
        &self,
        topic: &str,
        network: Network,
    ) -> Result<(), PortError>;
    async fn send_transaction(
        &self,
        topic: Option<&str>,
        account: &AccountRef,
        request: &ContractExecuteRequest,
    ) -> Result<WalletTxResponse, PortError>;
}

/// EIP-1193 injected wallet.
#[async_trait(?Send)]
pub trait EvmProviderPort {
    async fn accounts(&self) -> Result<Vec<Address>, PortError>;
    async fn request_accounts(&self) -> Result<Vec<Address>, PortError>;
    async fn chain_id(&self) -> Result<u64, PortError>;
    async fn add_chain(&self, chain: &EvmChainParams) -> Result<(), PortError>;
    async fn switch_chain(&self, chain_id: u64) -> Result<(), PortError>;
    async fn call(&self, call: &EvmCall) -> Result<Bytes, PortError>;
    async fn send_transaction(&self, call: &EvmCall) -> Result<B256, PortError>;
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Value>, PortError>;
}

/// Read access to the ledger for the native path.
#[async_trait(?Send)]
pub trait LedgerPort {
    async fn contract_call(&self, request: &ContractCallRequest) -> Result<Bytes, PortError>;
    async fn account_balance(&self, account: &EntityId) -> Result<Hbar, PortError>;
}

pub trait AbiPort {
    fn encode_call(&self, function: ContractFunction, args: &[Value]) -> Result<Bytes, PortError>;
    fn decode_output(
        &self,
        function: ContractFunction,
        data: &[u8],
    ) -> Result<QueryResult, PortError>;
}

/// Client-side persisted key/value storage (local and session areas).
pub trait StoragePort {
    fn keys(&self, area: StorageArea) -> Result<Vec<String>, PortError>;
    fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>, PortError>;
    fn remove(&self, area: StorageArea, key: &str) -> Result<(), PortError>;
    fn clear(&self, area: StorageArea) -> Result<(), PortError>;
}

#[async_trait(?Send)]
pub trait ManualEntryPort {
    async fn request_account_id(&self, prompt: &str) -> Option<String>;
}

#[async_trait(?Send)]
pub trait TimerPort {
    async fn sleep_ms(&self, ms: u64);
}

pub trait ClockPort {
    fn now_ms(&self) -> Result<u64, PortError>;
}
