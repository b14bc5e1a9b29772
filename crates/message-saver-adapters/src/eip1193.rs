use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{keccak256, Address, Bytes, B256};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use message_saver_core::domain::{EvmCall, EvmChainParams};
use message_saver_core::{EvmProviderPort, PortError};

use crate::AppConfig;

#[derive(Debug, Clone)]
pub struct Eip1193Adapter {
    mode: ProviderMode,
    state: Arc<Mutex<ProviderState>>,
}

#[derive(Debug, Clone)]
enum ProviderMode {
    Disabled(String),
    Deterministic,
    #[cfg(not(target_arch = "wasm32"))]
    Proxy(ProxyRuntime),
    #[cfg(target_arch = "wasm32")]
    Browser,
}

#[derive(Debug, Clone)]
#[cfg(not(target_arch = "wasm32"))]
struct ProxyRuntime {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
struct ProviderState {
    accounts: Vec<Address>,
    authorized: bool,
    chain_id: u64,
    known_chains: Vec<u64>,
    reject_requests: Option<String>,
    reject_add_chain: bool,
    call_results: VecDeque<Bytes>,
    sent: Vec<EvmCall>,
    receipts: HashMap<B256, Value>,
    receipt_status: String,
    pending_receipt_polls: u32,
    requests: Vec<String>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            accounts: vec!["0x1000000000000000000000000000000000000001"
                .parse()
                .expect("valid built-in deterministic account")],
            authorized: false,
            chain_id: 1,
            known_chains: vec![1],
            reject_requests: None,
            reject_add_chain: false,
            call_results: VecDeque::new(),
            sent: Vec::new(),
            receipts: HashMap::new(),
            receipt_status: "0x1".to_owned(),
            pending_receipt_polls: 0,
            requests: Vec::new(),
        }
    }
}

impl Eip1193Adapter {
    /// In-memory provider with one built-in account on chain 1.
    pub fn deterministic() -> Self {
        Self {
            mode: ProviderMode::Deterministic,
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    pub fn with_config(config: &AppConfig) -> Self {
        #[cfg(target_arch = "wasm32")]
        let mode = if browser_provider_available() {
            ProviderMode::Browser
        } else if config.strict_runtime_required() {
            ProviderMode::Disabled(
                "EIP-1193 browser provider not found in production runtime profile".to_owned(),
            )
        } else {
            ProviderMode::Deterministic
        };

        #[cfg(not(target_arch = "wasm32"))]
        let mode = if let Some(ref base_url) = config.eip1193_proxy_url {
            let timeout = std::time::Duration::from_millis(config.http_timeout_ms);
            match reqwest::Client::builder().timeout(timeout).build() {
                Ok(client) => ProviderMode::Proxy(ProxyRuntime {
                    base_url: base_url.clone(),
                    client,
                }),
                Err(e) => {
                    if config.strict_runtime_required() {
                        ProviderMode::Disabled(format!(
                            "failed to initialize EIP-1193 proxy client in production profile: {e}"
                        ))
                    } else {
                        ProviderMode::Deterministic
                    }
                }
            }
        } else if config.strict_runtime_required() {
            ProviderMode::Disabled(
                "EIP-1193 proxy URL not configured in production runtime profile".to_owned(),
            )
        } else {
            ProviderMode::Deterministic
        };

        Self {
            mode,
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self.mode, ProviderMode::Deterministic)
    }

    fn check_mode(&self) -> Result<(), PortError> {
        if let ProviderMode::Disabled(reason) = &self.mode {
            return Err(PortError::Policy(reason.clone()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ProviderState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))
    }

    fn record_request(&self, method: &str) -> Result<(), PortError> {
        self.lock()?.requests.push(method.to_owned());
        Ok(())
    }

    /// Routes one JSON-RPC request to the live provider. `Ok(None)` means
    /// the deterministic state answers instead.
    async fn remote(&self, method: &str, params: Value) -> Result<Option<Value>, PortError> {
        self.check_mode()?;
        self.record_request(method)?;
        match &self.mode {
            #[cfg(not(target_arch = "wasm32"))]
            ProviderMode::Proxy(proxy) => proxy_call(proxy, method, params).await.map(Some),
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser => wasm_request(method, params).await.map(Some),
            _ => {
                debug!(method, "deterministic provider request");
                Ok(None)
            }
        }
    }

    pub fn debug_set_accounts(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        self.lock()?.accounts = accounts;
        Ok(())
    }

    /// Marks the built-in accounts as already authorized for `eth_accounts`.
    pub fn debug_authorize(&self) -> Result<(), PortError> {
        self.lock()?.authorized = true;
        Ok(())
    }

    pub fn debug_reject_requests(&self, reason: Option<&str>) -> Result<(), PortError> {
        self.lock()?.reject_requests = reason.map(str::to_owned);
        Ok(())
    }

    pub fn debug_reject_add_chain(&self, reject: bool) -> Result<(), PortError> {
        self.lock()?.reject_add_chain = reject;
        Ok(())
    }

    pub fn debug_push_call_result(&self, output: Bytes) -> Result<(), PortError> {
        self.lock()?.call_results.push_back(output);
        Ok(())
    }

    pub fn debug_set_receipt_status(&self, status: &str) -> Result<(), PortError> {
        self.lock()?.receipt_status = status.to_owned();
        Ok(())
    }

    /// Receipts become visible only after this many empty polls.
    pub fn debug_delay_receipts(&self, polls: u32) -> Result<(), PortError> {
        self.lock()?.pending_receipt_polls = polls;
        Ok(())
    }

    pub fn debug_sent_transactions(&self) -> Result<Vec<EvmCall>, PortError> {
        Ok(self.lock()?.sent.clone())
    }

    pub fn debug_requests(&self) -> Result<Vec<String>, PortError> {
        Ok(self.lock()?.requests.clone())
    }

    pub fn debug_chain_id(&self) -> Result<u64, PortError> {
        Ok(self.lock()?.chain_id)
    }
}

#[async_trait(?Send)]
impl EvmProviderPort for Eip1193Adapter {
    async fn accounts(&self) -> Result<Vec<Address>, PortError> {
        if let Some(result) = self.remote("eth_accounts", serde_json::json!([])).await? {
            return parse_accounts("eth_accounts", &result);
        }
        let g = self.lock()?;
        Ok(if g.authorized { g.accounts.clone() } else { Vec::new() })
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, PortError> {
        if let Some(result) = self
            .remote("eth_requestAccounts", serde_json::json!([]))
            .await?
        {
            let accounts = parse_accounts("eth_requestAccounts", &result)?;
            self.lock()?.accounts = accounts.clone();
            return Ok(accounts);
        }
        let mut g = self.lock()?;
        if let Some(reason) = &g.reject_requests {
            return Err(PortError::Rejected(reason.clone()));
        }
        g.authorized = true;
        Ok(g.accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64, PortError> {
        if let Some(result) = self.remote("eth_chainId", serde_json::json!([])).await? {
            let chain_id = json_chain_id_to_u64(&result)?;
            self.lock()?.chain_id = chain_id;
            return Ok(chain_id);
        }
        Ok(self.lock()?.chain_id)
    }

    async fn add_chain(&self, chain: &EvmChainParams) -> Result<(), PortError> {
        if self
            .remote("wallet_addEthereumChain", serde_json::json!([chain.to_json()]))
            .await?
            .is_some()
        {
            return Ok(());
        }
        let mut g = self.lock()?;
        if g.reject_add_chain {
            return Err(PortError::Rejected("user rejected adding the chain".to_owned()));
        }
        if !g.known_chains.contains(&chain.chain_id) {
            g.known_chains.push(chain.chain_id);
        }
        Ok(())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), PortError> {
        let params = serde_json::json!([{ "chainId": format!("0x{chain_id:x}") }]);
        if self
            .remote("wallet_switchEthereumChain", params)
            .await?
            .is_some()
        {
            self.lock()?.chain_id = chain_id;
            return Ok(());
        }
        let mut g = self.lock()?;
        if !g.known_chains.contains(&chain_id) {
            return Err(PortError::NotFound(format!(
                "unrecognized chain id 0x{chain_id:x}"
            )));
        }
        g.chain_id = chain_id;
        Ok(())
    }

    async fn call(&self, call: &EvmCall) -> Result<Bytes, PortError> {
        let params = serde_json::json!([call.to_json(), "latest"]);
        if let Some(result) = self.remote("eth_call", params).await? {
            let raw = result
                .as_str()
                .ok_or_else(|| PortError::Transport("eth_call must return hex data".to_owned()))?;
            return raw
                .parse()
                .map_err(|e| PortError::Validation(format!("invalid eth_call result: {e}")));
        }
        self.lock()?
            .call_results
            .pop_front()
            .ok_or_else(|| PortError::NotFound("no scripted eth_call result".to_owned()))
    }

    async fn send_transaction(&self, call: &EvmCall) -> Result<B256, PortError> {
        let tx = call.to_json();
        if let Some(result) = self
            .remote("eth_sendTransaction", serde_json::json!([tx]))
            .await?
        {
            let hash = result.as_str().ok_or_else(|| {
                PortError::Transport("eth_sendTransaction must return tx hash".to_owned())
            })?;
            return hash
                .parse()
                .map_err(|e| PortError::Validation(format!("invalid tx hash: {e}")));
        }

        let mut g = self.lock()?;
        if let Some(reason) = &g.reject_requests {
            return Err(PortError::Rejected(reason.clone()));
        }
        let canonical = serde_json::to_vec(&serde_json::json!([g.sent.len(), tx]))
            .map_err(|e| PortError::Validation(format!("tx payload serialization failed: {e}")))?;
        let hash = keccak256(canonical);
        let receipt = serde_json::json!({
            "transactionHash": hash.to_string(),
            "status": g.receipt_status,
            "to": call.to.to_string(),
        });
        g.receipts.insert(hash, receipt);
        g.sent.push(call.clone());
        Ok(hash)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Value>, PortError> {
        let params = serde_json::json!([tx_hash.to_string()]);
        if let Some(result) = self.remote("eth_getTransactionReceipt", params).await? {
            return Ok((!result.is_null()).then_some(result));
        }
        let mut g = self.lock()?;
        if g.pending_receipt_polls > 0 {
            g.pending_receipt_polls -= 1;
            return Ok(None);
        }
        Ok(g.receipts.get(&tx_hash).cloned())
    }
}

fn parse_accounts(method: &str, result: &Value) -> Result<Vec<Address>, PortError> {
    let arr = result
        .as_array()
        .ok_or_else(|| PortError::Transport(format!("{method}: array expected")))?;
    arr.iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| PortError::Transport(format!("{method}: string expected")))?
                .parse()
                .map_err(|e| PortError::Validation(format!("invalid account address: {e}")))
        })
        .collect()
}

#[cfg(not(target_arch = "wasm32"))]
async fn proxy_call(proxy: &ProxyRuntime, method: &str, params: Value) -> Result<Value, PortError> {
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let response = proxy
        .client
        .post(&proxy.base_url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| PortError::Transport(format!("eip1193 proxy request failed: {e}")))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| PortError::Transport(format!("eip1193 proxy json decode failed: {e}")))?;
    if !status.is_success() {
        return Err(PortError::Transport(format!(
            "eip1193 proxy status {status}: {body}"
        )));
    }
    if let Some(err) = body.get("error") {
        // EIP-1193 code 4001: user rejected the request.
        if err.get("code").and_then(Value::as_i64) == Some(4001) {
            return Err(PortError::Rejected(err.to_string()));
        }
        return Err(PortError::Transport(format!(
            "eip1193 proxy returned error: {err}"
        )));
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| PortError::Transport("eip1193 proxy missing result".to_owned()))
}

fn json_chain_id_to_u64(value: &Value) -> Result<u64, PortError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let s = value
        .as_str()
        .ok_or_else(|| PortError::Validation("chain id must be string or number".to_owned()))?;
    parse_chain_id_str(s)
}

fn parse_chain_id_str(raw: &str) -> Result<u64, PortError> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)
            .map_err(|e| PortError::Validation(format!("invalid hex chain id: {e}"))),
        None => raw
            .parse()
            .map_err(|e| PortError::Validation(format!("invalid chain id: {e}"))),
    }
}

#[cfg(target_arch = "wasm32")]
async fn wasm_request(method: &str, params: Value) -> Result<Value, PortError> {
    use wasm_bindgen::JsCast;

    let provider = browser_provider()?;
    let request_fn = crate::browser::get_prop(&provider, "request")
        .ok()
        .and_then(|v| v.dyn_into::<js_sys::Function>().ok())
        .ok_or(PortError::NotImplemented(
            "window.ethereum.request is unavailable",
        ))?;

    let request = serde_json::json!({
        "method": method,
        "params": params,
    });
    let request_js = serde_wasm_bindgen::to_value(&request)
        .map_err(|e| PortError::Transport(format!("failed to encode wasm request: {e}")))?;
    let promise_js = request_fn
        .call1(&provider, &request_js)
        .map_err(|e| PortError::Transport(format!("provider request dispatch failed: {e:?}")))?;
    let promise = promise_js
        .dyn_into::<js_sys::Promise>()
        .map_err(|_| PortError::Transport("provider request did not return Promise".to_owned()))?;
    let result_js = wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(|e| PortError::Rejected(format!("provider request rejected: {e:?}")))?;
    if result_js.is_null() || result_js.is_undefined() {
        return Ok(Value::Null);
    }
    serde_wasm_bindgen::from_value(result_js)
        .map_err(|e| PortError::Transport(format!("failed to decode wasm response: {e}")))
}

#[cfg(target_arch = "wasm32")]
fn browser_provider_available() -> bool {
    browser_provider().is_ok()
}

#[cfg(target_arch = "wasm32")]
fn browser_provider() -> Result<wasm_bindgen::JsValue, PortError> {
    let window =
        web_sys::window().ok_or_else(|| PortError::Transport("missing window".to_owned()))?;
    let provider = crate::browser::get_prop(&window.into(), "ethereum")?;
    if provider.is_null() || provider.is_undefined() {
        return Err(PortError::NotFound("window.ethereum missing".to_owned()));
    }
    Ok(provider)
}
