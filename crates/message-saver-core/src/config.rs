use alloy::primitives::Address;

use crate::domain::{AppMetadata, ContractId, Hbar, Network};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub network: Network,
    pub app_metadata: AppMetadata,
    /// Third parameter of the transport's init call.
    pub init_single_account: bool,
    pub init_wait_ms: u64,
    pub connect_delay_ms: u64,
    pub additional_accounts_delay_ms: u64,
    /// Elapsed-time checkpoints (ms after the connect request) for recovery.
    pub recovery_checkpoints_ms: Vec<u64>,
    pub clear_on_connect: bool,
    pub auto_soft_reset: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            app_metadata: AppMetadata::new("http://localhost:3000", None, None),
            init_single_account: false,
            init_wait_ms: 1_000,
            connect_delay_ms: 500,
            additional_accounts_delay_ms: 1_000,
            recovery_checkpoints_ms: vec![3_000, 8_000, 15_000],
            clear_on_connect: false,
            auto_soft_reset: false,
        }
    }
}

impl SessionConfig {
    pub fn final_checkpoint_ms(&self) -> u64 {
        self.recovery_checkpoints_ms.iter().copied().max().unwrap_or(0)
    }

    /// Upper bound on how long one connect attempt may hold the in-flight slot.
    pub fn attempt_window_ms(&self) -> u64 {
        self.init_wait_ms
            .saturating_add(self.connect_delay_ms)
            .saturating_add(self.final_checkpoint_ms())
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub contract_id: Option<ContractId>,
    pub contract_evm_address: Option<Address>,
    pub default_gas: u64,
    pub max_transaction_fee: Hbar,
    pub query_gas: u64,
    pub max_query_payment: Hbar,
    pub receipt_poll_interval_ms: u64,
    pub receipt_max_polls: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            contract_id: None,
            contract_evm_address: None,
            default_gas: 100_000,
            max_transaction_fee: Hbar::from_hbar(2),
            query_gas: 50_000,
            max_query_payment: Hbar::from_hbar(1),
            receipt_poll_interval_ms: 1_000,
            receipt_max_polls: 60,
        }
    }
}
