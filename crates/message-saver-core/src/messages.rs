//! Message facade over a [`ContractGateway`]. Reads fall back to empty
//! values on failure so presentation code never handles router errors.

use alloy::primitives::Address;
use serde_json::{json, Value};
use tracing::warn;

use crate::domain::{ContractFunction, ContractMessage, QueryResult, TransactionOutcome};
use crate::error::RouterError;
use crate::router::ContractGateway;

pub const DEFAULT_RECENT_COUNT: u64 = 10;

pub struct MessageService<G: ContractGateway> {
    gateway: G,
}

impl<G: ContractGateway> MessageService<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub async fn store_message(&self, content: &str) -> TransactionOutcome {
        match self
            .gateway
            .execute(
                ContractFunction::StoreMessage.abi_name(),
                &[json!(content)],
                None,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("store message rejected: {e}");
                TransactionOutcome::failed(e.to_string())
            }
        }
    }

    pub async fn message_count(&self) -> u64 {
        match self.read(ContractFunction::GetMessageCount, &[]).await {
            Some(QueryResult::Count(count)) => count,
            _ => 0,
        }
    }

    pub async fn message(&self, id: u64) -> Option<ContractMessage> {
        match self.read(ContractFunction::GetMessage, &[json!(id)]).await {
            Some(QueryResult::Message(message)) => Some(message),
            _ => None,
        }
    }

    /// Up to `count` most recent messages, as ordered by the contract.
    pub async fn recent_messages(&self, count: Option<u64>) -> Vec<ContractMessage> {
        let count = count.unwrap_or(DEFAULT_RECENT_COUNT);
        match self
            .read(ContractFunction::GetRecentMessages, &[json!(count)])
            .await
        {
            Some(QueryResult::Messages(messages)) => messages,
            _ => Vec::new(),
        }
    }

    pub async fn user_messages(&self, user: Address) -> Vec<u64> {
        match self
            .read(ContractFunction::GetUserMessages, &[json!(user.to_string())])
            .await
        {
            Some(QueryResult::Ids(ids)) => ids,
            _ => Vec::new(),
        }
    }

    pub async fn user_message_count(&self, user: Address) -> u64 {
        match self
            .read(ContractFunction::GetUserMessageCount, &[json!(user.to_string())])
            .await
        {
            Some(QueryResult::Count(count)) => count,
            _ => 0,
        }
    }

    async fn read(&self, function: ContractFunction, args: &[Value]) -> Option<QueryResult> {
        let result: Result<QueryResult, RouterError> =
            self.gateway.query(function.abi_name(), args).await;
        match result {
            Ok(result) if expected_kind(function) == result.kind() => Some(result),
            Ok(result) => {
                warn!(%function, kind = result.kind(), "unexpected query result shape");
                None
            }
            Err(e) => {
                warn!(%function, "query failed: {e}");
                None
            }
        }
    }
}

fn expected_kind(function: ContractFunction) -> &'static str {
    match function {
        ContractFunction::GetMessageCount | ContractFunction::GetUserMessageCount => "count",
        ContractFunction::GetMessage => "message",
        ContractFunction::GetRecentMessages => "messages",
        ContractFunction::GetUserMessages => "ids",
        ContractFunction::StoreMessage => "none",
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use async_trait::async_trait;

    use super::*;

    struct ScriptedGateway {
        result: RefCell<Option<Result<QueryResult, RouterError>>>,
        calls: RefCell<Vec<(String, Vec<Value>)>>,
    }

    impl ScriptedGateway {
        fn returning(result: Result<QueryResult, RouterError>) -> Self {
            Self {
                result: RefCell::new(Some(result)),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    #[async_trait(?Send)]
    impl ContractGateway for ScriptedGateway {
        async fn execute(
            &self,
            _function: &str,
            _args: &[Value],
            _gas: Option<u64>,
        ) -> Result<TransactionOutcome, RouterError> {
            Err(RouterError::NoSession)
        }

        async fn query(&self, function: &str, args: &[Value]) -> Result<QueryResult, RouterError> {
            self.calls
                .borrow_mut()
                .push((function.to_owned(), args.to_vec()));
            self.result
                .borrow_mut()
                .take()
                .unwrap_or(Err(RouterError::NoSession))
        }
    }

    #[tokio::test]
    async fn store_message_folds_precondition_errors() {
        let service = MessageService::new(ScriptedGateway::returning(Ok(QueryResult::Count(0))));
        let outcome = service.store_message("hello").await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("wallet not connected"));
    }

    #[tokio::test]
    async fn recent_messages_defaults_to_ten() {
        let service = MessageService::new(ScriptedGateway::returning(Ok(QueryResult::Messages(
            Vec::new(),
        ))));
        assert!(service.recent_messages(None).await.is_empty());
        let calls = service.gateway().calls.borrow();
        assert_eq!(calls[0].0, "getRecentMessages");
        assert_eq!(calls[0].1, vec![json!(10)]);
    }

    #[tokio::test]
    async fn failed_count_reads_as_zero() {
        let service = MessageService::new(ScriptedGateway::returning(Err(RouterError::Decode {
            function: "getMessageCount".to_owned(),
            message: "short output".to_owned(),
        })));
        assert_eq!(service.message_count().await, 0);
    }

    #[tokio::test]
    async fn mismatched_shape_is_discarded() {
        let service = MessageService::new(ScriptedGateway::returning(Ok(QueryResult::Count(3))));
        assert_eq!(service.message(1).await, None);
    }
}
