use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

/// Hedera network the wallet transport is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Network::Mainnet => "Hedera Mainnet",
            Network::Testnet => "Hedera Testnet",
        }
    }

    pub fn mirror_node_url(self) -> &'static str {
        match self {
            Network::Mainnet => "https://mainnet-public.mirrornode.hedera.com",
            Network::Testnet => "https://testnet.mirrornode.hedera.com",
        }
    }

    pub fn json_rpc_url(self) -> &'static str {
        match self {
            Network::Mainnet => "https://mainnet.hashio.io/api",
            Network::Testnet => "https://testnet.hashio.io/api",
        }
    }

    pub fn explorer_url(self) -> &'static str {
        match self {
            Network::Mainnet => "https://hashscan.io/mainnet",
            Network::Testnet => "https://hashscan.io/testnet",
        }
    }

    pub fn evm_chain_id(self) -> u64 {
        match self {
            Network::Mainnet => 295,
            Network::Testnet => 296,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = PortError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(PortError::Validation(format!("unknown network: {other}"))),
        }
    }
}

/// `shard.realm.num` identifier shared by Hedera accounts and contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub shard: u64,
    pub realm: u64,
    pub num: u64,
}

pub type ContractId = EntityId;

impl EntityId {
    pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
        Self { shard, realm, num }
    }

    /// Accepts only strict `<digits>.<digits>.<digits>` with a shard that
    /// fits the 4-byte shard field of the long-zero alias.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('.');
        let shard = parse_component(parts.next()?)?;
        u32::try_from(shard).ok()?;
        let realm = parse_component(parts.next()?)?;
        let num = parse_component(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { shard, realm, num })
    }

    pub fn is_default_realm(&self) -> bool {
        self.shard == 0 && self.realm == 0
    }

    /// Long-zero EVM alias: shard (4 bytes) | realm (8 bytes) | num (8 bytes).
    /// `None` when the shard does not fit in 4 bytes.
    pub fn to_evm_alias(&self) -> Option<Address> {
        let shard = u32::try_from(self.shard).ok()?;
        let mut raw = [0u8; 20];
        raw[0..4].copy_from_slice(&shard.to_be_bytes());
        raw[4..12].copy_from_slice(&self.realm.to_be_bytes());
        raw[12..20].copy_from_slice(&self.num.to_be_bytes());
        Some(Address::from(raw))
    }
}

fn parse_component(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

impl FromStr for EntityId {
    type Err = PortError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        EntityId::parse(raw.trim())
            .ok_or_else(|| PortError::Validation(format!("invalid entity id: {raw}")))
    }
}

/// Opaque account identifier as reported by a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountRef(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    Native(EntityId),
    Evm(Address),
    Unknown,
}

impl AccountRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> AccountKind {
        if let Some(address) = parse_evm_address(&self.0) {
            return AccountKind::Evm(address);
        }
        match EntityId::parse(&self.0) {
            Some(id) => AccountKind::Native(id),
            None => AccountKind::Unknown,
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self.kind(), AccountKind::Evm(_))
    }

    /// True for `0.0.<digits>`, the only native form accepted from recovery sources.
    pub fn is_default_realm_native(&self) -> bool {
        matches!(self.kind(), AccountKind::Native(id) if id.is_default_realm())
    }

    /// The account's EVM address, or the long-zero alias for native ids.
    pub fn evm_address(&self) -> Option<Address> {
        match self.kind() {
            AccountKind::Evm(address) => Some(address),
            AccountKind::Native(id) => id.to_evm_alias(),
            AccountKind::Unknown => None,
        }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Address> for AccountRef {
    fn from(address: Address) -> Self {
        Self(address.to_string())
    }
}

impl From<EntityId> for AccountRef {
    fn from(id: EntityId) -> Self {
        Self(id.to_string())
    }
}

fn parse_evm_address(raw: &str) -> Option<Address> {
    let hex = raw.strip_prefix("0x")?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    raw.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletBackend {
    HashConnect,
    Injected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletMetadata {
    pub name: String,
    pub description: String,
    pub icon: String,
}

impl WalletMetadata {
    pub fn hashpack(description: &str) -> Self {
        Self {
            name: "HashPack".to_owned(),
            description: description.to_owned(),
            icon: String::new(),
        }
    }
}

/// Metadata the dApp registers with the pairing transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub icon: String,
}

impl AppMetadata {
    pub fn new(origin: &str, icon_url: Option<&str>, icon_data: Option<&str>) -> Self {
        let icon = icon_data
            .or(icon_url)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{}/logo192.png", origin.trim_end_matches('/')));
        Self {
            name: "Message Saver".to_owned(),
            description: "Save messages to the Hedera blockchain".to_owned(),
            icon,
        }
    }
}

/// What presentation code sees of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub connected: bool,
    pub account_id: Option<AccountRef>,
    pub evm_address: Option<Address>,
    pub balance: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportStatus {
    Disconnected,
    Connecting,
    Connected,
    Paired,
}

impl TransportStatus {
    pub fn is_paired(self) -> bool {
        matches!(self, TransportStatus::Connected | TransportStatus::Paired)
    }
}

/// Payload of the transport's pairing and additional-account events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingEvent {
    pub account_ids: Vec<AccountRef>,
    pub metadata: Option<WalletMetadata>,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPairing {
    pub topic: String,
    pub account_ids: Vec<AccountRef>,
    pub metadata: Option<WalletMetadata>,
    pub network: Option<Network>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitData {
    pub topic: Option<String>,
    pub pairing_string: Option<String>,
    pub saved_pairings: Vec<SavedPairing>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageArea {
    Local,
    Session,
}

/// Amount in tinybars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hbar(pub i64);

impl Hbar {
    pub const TINYBARS_PER_HBAR: i64 = 100_000_000;

    pub const fn from_hbar(hbar: i64) -> Self {
        Self(hbar * Self::TINYBARS_PER_HBAR)
    }

    pub const fn from_tinybars(tinybars: i64) -> Self {
        Self(tinybars)
    }

    pub const fn tinybars(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Hbar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / Self::TINYBARS_PER_HBAR as u64;
        let frac = abs % Self::TINYBARS_PER_HBAR as u64;
        if frac == 0 {
            write!(f, "{sign}{whole} ℏ")
        } else {
            let frac = format!("{frac:08}");
            write!(f, "{sign}{whole}.{} ℏ", frac.trim_end_matches('0'))
        }
    }
}

/// Functions of the deployed message storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractFunction {
    StoreMessage,
    GetMessageCount,
    GetMessage,
    GetRecentMessages,
    GetUserMessages,
    GetUserMessageCount,
}

impl ContractFunction {
    /// Entry points of the minimal interface the EVM binding is built from.
    pub const EVM_INTERFACE: [ContractFunction; 4] = [
        ContractFunction::StoreMessage,
        ContractFunction::GetMessageCount,
        ContractFunction::GetMessage,
        ContractFunction::GetRecentMessages,
    ];

    pub fn abi_name(self) -> &'static str {
        match self {
            ContractFunction::StoreMessage => "storeMessage",
            ContractFunction::GetMessageCount => "getMessageCount",
            ContractFunction::GetMessage => "getMessage",
            ContractFunction::GetRecentMessages => "getRecentMessages",
            ContractFunction::GetUserMessages => "getUserMessages",
            ContractFunction::GetUserMessageCount => "getUserMessageCount",
        }
    }

    pub fn is_mutation(self) -> bool {
        matches!(self, ContractFunction::StoreMessage)
    }
}

impl fmt::Display for ContractFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abi_name())
    }
}

impl FromStr for ContractFunction {
    type Err = PortError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let function = match raw {
            "storeMessage" | "store-message" => ContractFunction::StoreMessage,
            "getMessageCount" | "get-message-count" => ContractFunction::GetMessageCount,
            "getMessage" | "get-message" => ContractFunction::GetMessage,
            "getRecentMessages" | "get-recent-messages" => ContractFunction::GetRecentMessages,
            "getUserMessages" | "get-user-messages" => ContractFunction::GetUserMessages,
            "getUserMessageCount" | "get-user-message-count" => {
                ContractFunction::GetUserMessageCount
            }
            other => {
                return Err(PortError::Validation(format!(
                    "unknown contract function: {other}"
                )))
            }
        };
        Ok(function)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMessage {
    pub id: u64,
    pub sender: String,
    pub content: String,
    pub timestamp: u64,
}

/// Decoded read result, identical for both backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryResult {
    Count(u64),
    Message(ContractMessage),
    Messages(Vec<ContractMessage>),
    Ids(Vec<u64>),
}

impl QueryResult {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryResult::Count(_) => "count",
            QueryResult::Message(_) => "message",
            QueryResult::Messages(_) => "messages",
            QueryResult::Ids(_) => "ids",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub receipt: Option<Value>,
    pub error: Option<String>,
}

impl TransactionOutcome {
    pub fn succeeded(transaction_id: impl Into<String>, receipt: Option<Value>) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.into()),
            receipt,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            receipt: None,
            error: Some(error.into()),
        }
    }
}

/// Signed contract-execution request handed to the paired wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractExecuteRequest {
    pub contract_id: ContractId,
    pub function: ContractFunction,
    pub gas: u64,
    pub calldata: Bytes,
    pub max_transaction_fee: Hbar,
}

/// Unsigned, read-only contract call executed against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCallRequest {
    pub contract_id: ContractId,
    pub function: ContractFunction,
    pub gas: u64,
    pub calldata: Bytes,
    pub max_query_payment: Hbar,
}

/// What the paired wallet reports after signing and submitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletTxResponse {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub receipt: Option<Value>,
    pub error: Option<String>,
}

/// Call object for `eth_call` / `eth_sendTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmCall {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub gas: Option<u64>,
}

impl EvmCall {
    pub fn to_json(&self) -> Value {
        let mut tx = serde_json::json!({
            "to": self.to.to_string(),
            "data": format!("0x{}", alloy::hex::encode(&self.data)),
        });
        if let Some(from) = self.from {
            tx["from"] = Value::String(from.to_string());
        }
        if let Some(gas) = self.gas {
            tx["gas"] = Value::String(format!("0x{gas:x}"));
        }
        tx
    }
}

/// Parameters for `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmChainParams {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_url: String,
    pub explorer_url: String,
}

impl EvmChainParams {
    pub fn for_network(network: Network) -> Self {
        Self {
            chain_id: network.evm_chain_id(),
            chain_name: network.display_name().to_owned(),
            rpc_url: network.json_rpc_url().to_owned(),
            explorer_url: network.explorer_url().to_owned(),
        }
    }

    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.chain_name,
            "nativeCurrency": { "name": "HBAR", "symbol": "HBAR", "decimals": 18 },
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": [self.explorer_url],
        })
    }
}
