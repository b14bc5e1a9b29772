//! Transaction Routing Layer.
//!
//! Every call classifies the active account into a [`Backend`] and
//! dispatches to the native (wallet-signed, ledger-queried) or the EVM
//! (injected provider) path. Execution failures are folded into
//! [`TransactionOutcome`]; only precondition failures surface as errors.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::domain::{
    AccountKind, AccountRef, ContractCallRequest, ContractExecuteRequest, ContractFunction,
    ContractId, EvmCall, QueryResult, TransactionOutcome, WalletTxResponse,
};
use crate::error::RouterError;
use crate::ports::{AbiPort, EvmProviderPort, LedgerPort, PortError, TimerPort};
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Native,
    Evm,
}

impl Backend {
    /// EVM iff the account is a hex address and an EVM contract is deployed.
    pub fn select(account: &AccountRef, evm_contract: Option<Address>) -> Self {
        if account.is_evm() && evm_contract.is_some() {
            Backend::Evm
        } else {
            Backend::Native
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Backend::Native => "native",
            Backend::Evm => "evm",
        }
    }
}

/// Contract bound to the injected provider, restricted to the four-entry
/// message interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmContractBinding {
    pub address: Address,
    pub interface: &'static [ContractFunction],
}

impl EvmContractBinding {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            interface: &ContractFunction::EVM_INTERFACE,
        }
    }

    pub fn supports(&self, function: ContractFunction) -> bool {
        self.interface.contains(&function)
    }
}

/// The `{execute, query}` surface shared by both backends.
#[async_trait(?Send)]
pub trait ContractGateway {
    async fn execute(
        &self,
        function: &str,
        args: &[Value],
        gas: Option<u64>,
    ) -> Result<TransactionOutcome, RouterError>;
    async fn query(&self, function: &str, args: &[Value]) -> Result<QueryResult, RouterError>;
}

#[async_trait(?Send)]
impl<G: ContractGateway + ?Sized> ContractGateway for Arc<G> {
    async fn execute(
        &self,
        function: &str,
        args: &[Value],
        gas: Option<u64>,
    ) -> Result<TransactionOutcome, RouterError> {
        (**self).execute(function, args, gas).await
    }

    async fn query(&self, function: &str, args: &[Value]) -> Result<QueryResult, RouterError> {
        (**self).query(function, args).await
    }
}

pub struct TransactionRouter<X, E, L, A, T>
where
    X: SessionContext,
    E: EvmProviderPort,
    L: LedgerPort,
    A: AbiPort,
    T: TimerPort,
{
    pub session: X,
    pub evm_provider: E,
    pub ledger: L,
    pub abi: A,
    pub timer: T,
    config: RouterConfig,
    evm_binding: Mutex<Option<Arc<EvmContractBinding>>>,
}

impl<X, E, L, A, T> TransactionRouter<X, E, L, A, T>
where
    X: SessionContext,
    E: EvmProviderPort,
    L: LedgerPort,
    A: AbiPort,
    T: TimerPort,
{
    pub fn new(session: X, evm_provider: E, ledger: L, abi: A, timer: T, config: RouterConfig) -> Self {
        Self {
            session,
            evm_provider,
            ledger,
            abi,
            timer,
            config,
            evm_binding: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Backend the next call would take, or `None` without an active account.
    pub fn current_backend(&self) -> Option<Backend> {
        self.session
            .active_account()
            .map(|account| Backend::select(&account, self.config.contract_evm_address))
    }

    /// The binding built by the first EVM call, if any.
    pub fn evm_binding(&self) -> Option<Arc<EvmContractBinding>> {
        self.evm_binding.lock().ok().and_then(|binding| binding.clone())
    }

    fn bind_evm_contract(&self, address: Address) -> Result<Arc<EvmContractBinding>, RouterError> {
        let mut binding = self
            .evm_binding
            .lock()
            .map_err(|e| RouterError::Lock(format!("evm binding lock poisoned: {e}")))?;
        if let Some(existing) = binding.as_ref().filter(|b| b.address == address) {
            return Ok(Arc::clone(existing));
        }
        info!(%address, "binding message contract on injected provider");
        let built = Arc::new(EvmContractBinding::new(address));
        *binding = Some(Arc::clone(&built));
        Ok(built)
    }

    fn active_account(&self) -> Result<AccountRef, RouterError> {
        self.session.active_account().ok_or(RouterError::NoSession)
    }

    fn native_contract(&self) -> Result<ContractId, RouterError> {
        self.config
            .contract_id
            .ok_or(RouterError::ContractNotConfigured("native"))
    }

    fn encode(&self, function: ContractFunction, args: &[Value]) -> Result<alloy::primitives::Bytes, RouterError> {
        self.abi
            .encode_call(function, args)
            .map_err(|source| RouterError::Encode {
                function: function.to_string(),
                source,
            })
    }

    fn decode(&self, function: ContractFunction, data: &[u8]) -> Result<QueryResult, RouterError> {
        self.abi
            .decode_output(function, data)
            .map_err(|e| RouterError::Decode {
                function: function.to_string(),
                message: e.to_string(),
            })
    }

    /// Signs (through the paired wallet or injected provider) and submits a
    /// contract call. `gas` defaults to the configured execution gas.
    pub async fn execute(
        &self,
        function_name: &str,
        args: &[Value],
        gas: Option<u64>,
    ) -> Result<TransactionOutcome, RouterError> {
        let account = self.active_account()?;
        let backend = Backend::select(&account, self.config.contract_evm_address);
        let function = parse_function(backend, function_name)?;
        let gas = gas.unwrap_or(self.config.default_gas);
        debug!(backend = backend.name(), %function, gas, "executing contract function");

        match backend {
            Backend::Evm => self.execute_evm(&account, function, args, gas).await,
            Backend::Native => self.execute_native(&account, function, args, gas).await,
        }
    }

    async fn execute_evm(
        &self,
        account: &AccountRef,
        function: ContractFunction,
        args: &[Value],
        gas: u64,
    ) -> Result<TransactionOutcome, RouterError> {
        let address = self
            .config
            .contract_evm_address
            .ok_or(RouterError::ContractNotConfigured("evm"))?;
        let binding = self.bind_evm_contract(address)?;
        if !binding.supports(function) || !function.is_mutation() {
            return Err(RouterError::UnsupportedOperation {
                backend: Backend::Evm.name(),
                function: function.abi_name().to_owned(),
            });
        }

        let data = match self.encode(function, args) {
            Ok(data) => data,
            Err(e) => return Ok(TransactionOutcome::failed(e.to_string())),
        };
        let call = EvmCall {
            from: account.evm_address(),
            to: binding.address,
            data,
            gas: Some(gas),
        };
        let tx_hash = match self.evm_provider.send_transaction(&call).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(%function, "evm transaction submission failed: {e}");
                return Ok(TransactionOutcome::failed(e.to_string()));
            }
        };
        info!(%tx_hash, "evm transaction submitted");

        match self.wait_for_receipt(tx_hash).await {
            Ok(Some(receipt)) if receipt_reverted(&receipt) => {
                warn!(%tx_hash, "evm transaction reverted");
                let mut outcome = TransactionOutcome::failed("Transaction reverted");
                outcome.transaction_id = Some(tx_hash.to_string());
                outcome.receipt = Some(receipt);
                Ok(outcome)
            }
            Ok(Some(receipt)) => Ok(TransactionOutcome::succeeded(tx_hash.to_string(), Some(receipt))),
            Ok(None) => {
                let mut outcome = TransactionOutcome::failed(format!(
                    "no receipt after {} polls",
                    self.config.receipt_max_polls
                ));
                outcome.transaction_id = Some(tx_hash.to_string());
                Ok(outcome)
            }
            Err(e) => {
                let mut outcome = TransactionOutcome::failed(e.to_string());
                outcome.transaction_id = Some(tx_hash.to_string());
                Ok(outcome)
            }
        }
    }

    async fn execute_native(
        &self,
        account: &AccountRef,
        function: ContractFunction,
        args: &[Value],
        gas: u64,
    ) -> Result<TransactionOutcome, RouterError> {
        let contract_id = self.native_contract()?;
        let calldata = match self.encode(function, args) {
            Ok(data) => data,
            Err(e) => return Ok(TransactionOutcome::failed(e.to_string())),
        };
        let request = ContractExecuteRequest {
            contract_id,
            function,
            gas,
            calldata,
            max_transaction_fee: self.config.max_transaction_fee,
        };
        match self.session.submit_contract_execution(account, &request).await {
            Ok(response) => Ok(outcome_from_wallet(response)),
            Err(e) => {
                warn!(%function, %contract_id, "contract execution failed: {e}");
                Ok(TransactionOutcome::failed(e.to_string()))
            }
        }
    }

    /// Read-only call; results are decoded into the shared [`QueryResult`].
    /// Without a session the read goes to the native ledger, which only
    /// needs a configured contract id.
    pub async fn query(&self, function_name: &str, args: &[Value]) -> Result<QueryResult, RouterError> {
        let account = self.session.active_account();
        let backend = account
            .as_ref()
            .map_or(Backend::Native, |a| Backend::select(a, self.config.contract_evm_address));
        let function = parse_function(backend, function_name)?;
        debug!(backend = backend.name(), %function, "querying contract function");

        match (backend, account) {
            (Backend::Evm, Some(account)) => self.query_evm(&account, function, args).await,
            _ => self.query_native(function, args).await,
        }
    }

    async fn query_evm(
        &self,
        account: &AccountRef,
        function: ContractFunction,
        args: &[Value],
    ) -> Result<QueryResult, RouterError> {
        let address = self
            .config
            .contract_evm_address
            .ok_or(RouterError::ContractNotConfigured("evm"))?;
        let binding = self.bind_evm_contract(address)?;
        if !binding.supports(function) || function.is_mutation() {
            return Err(RouterError::UnsupportedOperation {
                backend: Backend::Evm.name(),
                function: function.abi_name().to_owned(),
            });
        }
        let call = EvmCall {
            from: account.evm_address(),
            to: binding.address,
            data: self.encode(function, args)?,
            gas: None,
        };
        let output = self
            .evm_provider
            .call(&call)
            .await
            .map_err(|source| RouterError::Remote {
                function: function.to_string(),
                source,
            })?;
        self.decode(function, &output)
    }

    async fn query_native(
        &self,
        function: ContractFunction,
        args: &[Value],
    ) -> Result<QueryResult, RouterError> {
        let contract_id = self.native_contract()?;
        let request = ContractCallRequest {
            contract_id,
            function,
            gas: self.config.query_gas,
            calldata: self.encode(function, args)?,
            max_query_payment: self.config.max_query_payment,
        };
        let output = self
            .ledger
            .contract_call(&request)
            .await
            .map_err(|source| RouterError::Remote {
                function: function.to_string(),
                source,
            })?;
        self.decode(function, &output)
    }

    /// Balance of `account` as a display string, `"0"` when unavailable.
    pub async fn account_balance(&self, account: &AccountRef) -> String {
        let AccountKind::Native(entity) = account.kind() else {
            debug!(%account, "balance lookup skipped for non-native account");
            return "0".to_owned();
        };
        match self.ledger.account_balance(&entity).await {
            Ok(balance) => balance.to_string(),
            Err(e) => {
                warn!(%account, "balance lookup failed: {e}");
                "0".to_owned()
            }
        }
    }

    /// Polls for the receipt of `tx_hash`; `None` once `receipt_max_polls` polls come back empty.
    pub async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Option<Value>, PortError> {
        for poll in 0..self.config.receipt_max_polls {
            if let Some(receipt) = self.evm_provider.transaction_receipt(tx_hash).await? {
                debug!(%tx_hash, polls = poll + 1, "receipt available");
                return Ok(Some(receipt));
            }
            self.timer.sleep_ms(self.config.receipt_poll_interval_ms).await;
        }
        Ok(None)
    }
}

#[async_trait(?Send)]
impl<X, E, L, A, T> ContractGateway for TransactionRouter<X, E, L, A, T>
where
    X: SessionContext,
    E: EvmProviderPort,
    L: LedgerPort,
    A: AbiPort,
    T: TimerPort,
{
    async fn execute(
        &self,
        function: &str,
        args: &[Value],
        gas: Option<u64>,
    ) -> Result<TransactionOutcome, RouterError> {
        TransactionRouter::execute(self, function, args, gas).await
    }

    async fn query(&self, function: &str, args: &[Value]) -> Result<QueryResult, RouterError> {
        TransactionRouter::query(self, function, args).await
    }
}

fn parse_function(backend: Backend, name: &str) -> Result<ContractFunction, RouterError> {
    ContractFunction::from_str(name).map_err(|_| RouterError::UnsupportedOperation {
        backend: backend.name(),
        function: name.to_owned(),
    })
}

fn outcome_from_wallet(response: WalletTxResponse) -> TransactionOutcome {
    if response.success {
        TransactionOutcome {
            success: true,
            transaction_id: response.transaction_id,
            receipt: response.receipt,
            error: None,
        }
    } else {
        TransactionOutcome {
            success: false,
            transaction_id: response.transaction_id,
            receipt: response.receipt,
            error: Some(
                response
                    .error
                    .unwrap_or_else(|| "Transaction failed".to_owned()),
            ),
        }
    }
}

fn receipt_reverted(receipt: &Value) -> bool {
    match receipt.get("status") {
        Some(Value::String(status)) => status == "0x0",
        Some(Value::Number(status)) => status.as_u64() == Some(0),
        Some(Value::Bool(ok)) => !ok,
        _ => false,
    }
}
