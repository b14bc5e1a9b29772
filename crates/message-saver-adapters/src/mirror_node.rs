use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Bytes;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use message_saver_core::domain::ContractCallRequest;
use message_saver_core::{EntityId, Hbar, LedgerPort, PortError};

use crate::AppConfig;

/// Read-only ledger access through the Hedera mirror node REST API.
#[derive(Debug, Clone)]
pub struct MirrorNodeLedger {
    mode: LedgerMode,
    state: Arc<Mutex<LedgerState>>,
}

#[derive(Debug, Clone)]
enum LedgerMode {
    Disabled(String),
    Deterministic,
    Http(HttpRuntime),
}

#[derive(Debug, Clone)]
struct HttpRuntime {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Default)]
struct LedgerState {
    call_results: VecDeque<Result<Bytes, String>>,
    balances: HashMap<EntityId, Hbar>,
    call_requests: Vec<ContractCallRequest>,
}

#[derive(Debug, Deserialize)]
struct ContractCallResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    #[serde(default)]
    balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    balance: i64,
}

impl MirrorNodeLedger {
    pub fn deterministic() -> Self {
        Self {
            mode: LedgerMode::Deterministic,
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    /// Talks to the configured (or network default) mirror node. In the
    /// development profile a client build failure falls back to the
    /// deterministic ledger.
    pub fn with_config(config: &AppConfig) -> Self {
        let base_url = config.mirror_node_base_url();
        let mode = match build_client(config.http_timeout_ms) {
            Ok(client) => LedgerMode::Http(HttpRuntime { base_url, client }),
            Err(e) if config.strict_runtime_required() => LedgerMode::Disabled(format!(
                "failed to initialize mirror node client in production profile: {e}"
            )),
            Err(e) => {
                debug!("mirror node client unavailable, using deterministic ledger: {e}");
                LedgerMode::Deterministic
            }
        };
        Self {
            mode,
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self.mode, LedgerMode::Deterministic)
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("ledger lock poisoned: {e}")))
    }

    pub fn debug_push_call_result(&self, output: Bytes) -> Result<(), PortError> {
        self.lock()?.call_results.push_back(Ok(output));
        Ok(())
    }

    pub fn debug_push_call_error(&self, reason: &str) -> Result<(), PortError> {
        self.lock()?.call_results.push_back(Err(reason.to_owned()));
        Ok(())
    }

    pub fn debug_set_balance(&self, account: EntityId, balance: Hbar) -> Result<(), PortError> {
        self.lock()?.balances.insert(account, balance);
        Ok(())
    }

    pub fn debug_call_requests(&self) -> Result<Vec<ContractCallRequest>, PortError> {
        Ok(self.lock()?.call_requests.clone())
    }
}

fn build_client(timeout_ms: u64) -> Result<reqwest::Client, reqwest::Error> {
    let builder = reqwest::Client::builder();
    #[cfg(not(target_arch = "wasm32"))]
    let builder = builder.timeout(std::time::Duration::from_millis(timeout_ms));
    #[cfg(target_arch = "wasm32")]
    let _ = timeout_ms;
    builder.build()
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, PortError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(PortError::NotFound(format!("{what}: mirror node returned 404")));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PortError::Transport(format!(
            "{what}: mirror node status {status}: {body}"
        )));
    }
    response
        .json()
        .await
        .map_err(|e| PortError::Transport(format!("{what}: json decode failed: {e}")))
}

#[async_trait(?Send)]
impl LedgerPort for MirrorNodeLedger {
    async fn contract_call(&self, request: &ContractCallRequest) -> Result<Bytes, PortError> {
        match &self.mode {
            LedgerMode::Disabled(reason) => Err(PortError::Policy(reason.clone())),
            LedgerMode::Deterministic => {
                let mut g = self.lock()?;
                g.call_requests.push(request.clone());
                match g.call_results.pop_front() {
                    Some(Ok(output)) => Ok(output),
                    Some(Err(reason)) => Err(PortError::Transport(reason)),
                    None => Err(PortError::NotFound("no scripted contract call result".to_owned())),
                }
            }
            LedgerMode::Http(http) => {
                let to = request.contract_id.to_evm_alias().ok_or_else(|| {
                    PortError::Validation(format!(
                        "contract {} has no long-zero EVM alias",
                        request.contract_id
                    ))
                })?;
                let payload = json!({
                    "block": "latest",
                    "data": request.calldata.to_string(),
                    "estimate": false,
                    "gas": request.gas,
                    "to": to.to_string(),
                });
                let url = format!("{}/api/v1/contracts/call", http.base_url);
                debug!(url, function = ?request.function, "mirror node contract call");
                let response = http
                    .client
                    .post(&url)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| PortError::Transport(format!("contract call request failed: {e}")))?;
                let body: ContractCallResponse = read_json(response, "contracts/call").await?;
                body.result
                    .parse()
                    .map_err(|e| PortError::Validation(format!("invalid contract call result: {e}")))
            }
        }
    }

    async fn account_balance(&self, account: &EntityId) -> Result<Hbar, PortError> {
        match &self.mode {
            LedgerMode::Disabled(reason) => Err(PortError::Policy(reason.clone())),
            LedgerMode::Deterministic => Ok(self
                .lock()?
                .balances
                .get(account)
                .copied()
                .unwrap_or_default()),
            LedgerMode::Http(http) => {
                let url = format!("{}/api/v1/balances", http.base_url);
                let response = http
                    .client
                    .get(&url)
                    .query(&[("account.id", account.to_string())])
                    .send()
                    .await
                    .map_err(|e| PortError::Transport(format!("balance request failed: {e}")))?;
                let body: BalancesResponse = read_json(response, "balances").await?;
                body.balances
                    .first()
                    .map(|b| Hbar::from_tinybars(b.balance))
                    .ok_or_else(|| PortError::NotFound(format!("no balance for {account}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use message_saver_core::ContractFunction;

    use super::*;

    fn call_request() -> ContractCallRequest {
        ContractCallRequest {
            contract_id: EntityId::new(0, 0, 999),
            function: ContractFunction::GetMessageCount,
            gas: 50_000,
            calldata: Bytes::from_static(&[0x3d, 0xbb, 0x20, 0x2b]),
            max_query_payment: Hbar::from_hbar(1),
        }
    }

    #[tokio::test]
    async fn deterministic_ledger_replays_scripted_results() {
        let ledger = MirrorNodeLedger::deterministic();
        ledger
            .debug_push_call_result(Bytes::from_static(&[1, 2]))
            .expect("script");
        ledger.debug_push_call_error("node busy").expect("script");

        assert_eq!(
            ledger.contract_call(&call_request()).await.expect("first"),
            Bytes::from_static(&[1, 2])
        );
        assert!(matches!(
            ledger.contract_call(&call_request()).await,
            Err(PortError::Transport(_))
        ));
        assert!(matches!(
            ledger.contract_call(&call_request()).await,
            Err(PortError::NotFound(_))
        ));
        assert_eq!(ledger.debug_call_requests().expect("requests").len(), 3);
    }

    #[tokio::test]
    async fn unknown_accounts_have_zero_balance() {
        let ledger = MirrorNodeLedger::deterministic();
        let account = EntityId::new(0, 0, 4821);
        assert_eq!(ledger.account_balance(&account).await.expect("balance"), Hbar(0));
        ledger
            .debug_set_balance(account, Hbar::from_hbar(12))
            .expect("script");
        assert_eq!(
            ledger.account_balance(&account).await.expect("balance"),
            Hbar::from_hbar(12)
        );
    }
}
