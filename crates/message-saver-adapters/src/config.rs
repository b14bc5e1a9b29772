use alloy::primitives::Address;
use thiserror::Error;
use tracing::debug;

use message_saver_core::domain::AppMetadata;
use message_saver_core::{AccountRef, ContractId, EntityId, Network, RouterConfig, SessionConfig};

pub const DEFAULT_APP_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: unknown network {value:?} (expected mainnet or testnet)")]
    InvalidNetwork { var: &'static str, value: String },
    #[error("{var}: invalid entity id {value:?} (expected shard.realm.num)")]
    InvalidEntityId { var: &'static str, value: String },
    #[error("{var}: invalid EVM address {value:?}")]
    InvalidAddress { var: &'static str, value: String },
    #[error("{var}: invalid number {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RuntimeProfile {
    #[default]
    Development,
    /// Deterministic fallbacks are disabled; missing runtimes are errors.
    Production,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub network: Network,
    pub account_id: Option<AccountRef>,
    pub account_checksum: Option<String>,
    pub evm_address: Option<Address>,
    pub contract_id: Option<ContractId>,
    pub contract_evm_address: Option<Address>,
    pub app_origin: String,
    pub app_icon_url: Option<String>,
    pub app_icon_data: Option<String>,
    pub clear_on_connect: bool,
    pub auto_soft_reset: bool,
    pub connect_delay_ms: u64,
    pub init_single_account: bool,
    pub eip1193_proxy_url: Option<String>,
    pub mirror_node_url: Option<String>,
    pub runtime_profile: RuntimeProfile,
    pub http_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            account_id: None,
            account_checksum: None,
            evm_address: None,
            contract_id: None,
            contract_evm_address: None,
            app_origin: DEFAULT_APP_ORIGIN.to_owned(),
            app_icon_url: None,
            app_icon_data: None,
            clear_on_connect: false,
            auto_soft_reset: false,
            connect_delay_ms: 500,
            init_single_account: false,
            eip1193_proxy_url: None,
            mirror_node_url: None,
            runtime_profile: RuntimeProfile::Development,
            http_timeout_ms: 15_000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every setting through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let flag = |key: &str| get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let defaults = Self::default();

        let network = match get("HEDERA_NETWORK") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidNetwork {
                var: "HEDERA_NETWORK",
                value,
            })?,
            None => defaults.network,
        };
        let contract_id = get("CONTRACT_ID")
            .map(|value| {
                EntityId::parse(&value).ok_or(ConfigError::InvalidEntityId {
                    var: "CONTRACT_ID",
                    value,
                })
            })
            .transpose()?;
        let connect_delay_ms = match get("HASHCONNECT_CONNECT_DELAY_MS") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
                var: "HASHCONNECT_CONNECT_DELAY_MS",
                value,
            })?,
            None => defaults.connect_delay_ms,
        };
        let runtime_profile = match get("RUNTIME_PROFILE") {
            Some(value) if value.eq_ignore_ascii_case("production") => RuntimeProfile::Production,
            _ => RuntimeProfile::Development,
        };

        let config = Self {
            network,
            account_id: get("HEDERA_ACCOUNT_ID").map(AccountRef::new),
            account_checksum: get("HEDERA_ACCOUNT_CHECKSUM"),
            evm_address: parse_address("HEDERA_EVM_ADDRESS", get("HEDERA_EVM_ADDRESS"))?,
            contract_id,
            contract_evm_address: parse_address("CONTRACT_EVM_ADDRESS", get("CONTRACT_EVM_ADDRESS"))?,
            app_origin: get("APP_ORIGIN").unwrap_or(defaults.app_origin),
            app_icon_url: get("APP_ICON_URL"),
            app_icon_data: get("APP_ICON_DATA"),
            clear_on_connect: flag("HASHCONNECT_CLEAR_ON_CONNECT"),
            auto_soft_reset: flag("HASHCONNECT_AUTO_SOFT_RESET"),
            connect_delay_ms,
            init_single_account: flag("HASHCONNECT_INIT_THIRD"),
            eip1193_proxy_url: get("EIP1193_PROXY_URL"),
            mirror_node_url: get("MIRROR_NODE_URL"),
            runtime_profile,
            http_timeout_ms: defaults.http_timeout_ms,
        };
        debug!(
            network = %config.network,
            contract = ?config.contract_id,
            evm_contract = ?config.contract_evm_address,
            profile = ?config.runtime_profile,
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }

    pub fn mirror_node_base_url(&self) -> String {
        self.mirror_node_url
            .clone()
            .unwrap_or_else(|| self.network.mirror_node_url().to_owned())
            .trim_end_matches('/')
            .to_owned()
    }

    pub fn app_metadata(&self) -> AppMetadata {
        AppMetadata::new(
            &self.app_origin,
            self.app_icon_url.as_deref(),
            self.app_icon_data.as_deref(),
        )
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            network: self.network,
            app_metadata: self.app_metadata(),
            init_single_account: self.init_single_account,
            connect_delay_ms: self.connect_delay_ms,
            clear_on_connect: self.clear_on_connect,
            auto_soft_reset: self.auto_soft_reset,
            ..SessionConfig::default()
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            contract_id: self.contract_id,
            contract_evm_address: self.contract_evm_address,
            ..RouterConfig::default()
        }
    }
}

fn parse_address(var: &'static str, raw: Option<String>) -> Result<Option<Address>, ConfigError> {
    raw.map(|value| {
        value
            .parse()
            .map_err(|_| ConfigError::InvalidAddress { var, value })
    })
    .transpose()
}
