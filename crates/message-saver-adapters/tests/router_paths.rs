mod common;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::Address;
use serde_json::json;

use message_saver_adapters::MirrorNodeLedger;
use message_saver_core::domain::{SavedPairing, WalletTxResponse};
use message_saver_core::{
    AccountRef, Backend, ContractMessage, EntityId, Hbar, MessageService, Network, QueryResult,
    RouterConfig, RouterError,
};

use common::{encoded, evm_contract, harness, native_contract, router, router_config, sender, uint, Harness};

async fn native_session() -> Harness {
    let h = harness();
    h.manager.initialize().await.expect("initialize");
    h.manager
        .connect_and_wait(Network::Testnet)
        .await
        .expect("connect");
    h
}

async fn injected_session() -> Harness {
    let h = harness();
    h.manager.connect_injected().await.expect("injected");
    h
}

#[tokio::test]
async fn execute_without_a_session_is_rejected() {
    let h = harness();
    let router = router(&h, router_config(), MirrorNodeLedger::deterministic());

    assert!(router.current_backend().is_none());
    assert!(matches!(
        router.execute("storeMessage", &[json!("hi")], None).await,
        Err(RouterError::NoSession)
    ));
}

#[tokio::test]
async fn query_without_a_session_reads_through_the_ledger() {
    let h = harness();
    let ledger = MirrorNodeLedger::deterministic();
    ledger
        .debug_push_call_result(encoded(vec![uint(3)]))
        .expect("script");
    let config = RouterConfig {
        contract_id: Some(EntityId::new(0, 0, 999)),
        ..router_config()
    };
    let router = router(&h, config, ledger.clone());

    let result = router.query("getMessageCount", &[]).await.expect("native read");
    assert_eq!(result, QueryResult::Count(3));
    let requests = ledger.debug_call_requests().expect("requests");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].contract_id, EntityId::new(0, 0, 999));
}

#[tokio::test]
async fn native_accounts_route_native_regardless_of_evm_config() {
    let h = native_session().await;
    let with_evm = router(&h, router_config(), MirrorNodeLedger::deterministic());
    assert_eq!(with_evm.current_backend(), Some(Backend::Native));

    let native_only = RouterConfig {
        contract_evm_address: None,
        ..router_config()
    };
    let without_evm = router(&h, native_only, MirrorNodeLedger::deterministic());
    assert_eq!(without_evm.current_backend(), Some(Backend::Native));
}

#[tokio::test]
async fn hex_accounts_route_evm_only_with_an_evm_contract() {
    let h = injected_session().await;
    let with_evm = router(&h, router_config(), MirrorNodeLedger::deterministic());
    assert_eq!(with_evm.current_backend(), Some(Backend::Evm));

    let native_only = RouterConfig {
        contract_evm_address: None,
        ..router_config()
    };
    let without_evm = router(&h, native_only, MirrorNodeLedger::deterministic());
    assert_eq!(without_evm.current_backend(), Some(Backend::Native));
}

#[tokio::test]
async fn restored_pairing_queries_count_through_the_ledger() {
    let h = harness();
    h.wallet
        .debug_save_pairing(SavedPairing {
            topic: "topic-saved".to_owned(),
            account_ids: vec![AccountRef::new("0.0.555")],
            metadata: None,
            network: Some(Network::Testnet),
        })
        .expect("seed pairing");
    h.manager.initialize().await.expect("initialize");

    let ledger = MirrorNodeLedger::deterministic();
    ledger
        .debug_push_call_result(encoded(vec![uint(42)]))
        .expect("script");
    let config = RouterConfig {
        contract_id: Some(EntityId::new(0, 0, 999)),
        contract_evm_address: None,
        ..RouterConfig::default()
    };
    let router = router(&h, config, ledger.clone());

    let result = router.query("get-message-count", &[]).await.expect("query");
    assert_eq!(result, QueryResult::Count(42));

    let requests = ledger.debug_call_requests().expect("requests");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].contract_id, EntityId::new(0, 0, 999));
    assert_eq!(requests[0].gas, 50_000);
    assert_eq!(requests[0].max_query_payment, Hbar::from_hbar(1));
}

#[tokio::test]
async fn native_execute_is_signed_by_the_paired_wallet() {
    let h = native_session().await;
    let router = router(&h, router_config(), MirrorNodeLedger::deterministic());

    let outcome = router
        .execute("storeMessage", &[json!("hello hedera")], None)
        .await
        .expect("execute");

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(
        outcome.transaction_id.as_deref(),
        Some("0.0.4821@1700000000.000000001")
    );
    let sent = h.wallet.debug_sent_transactions().expect("sent");
    assert_eq!(sent.len(), 1);
    let (account, request) = &sent[0];
    assert_eq!(account, &AccountRef::new("0.0.4821"));
    assert_eq!(request.contract_id, native_contract());
    assert_eq!(request.gas, 100_000);
    assert_eq!(request.max_transaction_fee, Hbar::from_hbar(2));
}

#[tokio::test]
async fn wallet_failures_become_failed_outcomes() {
    let h = native_session().await;
    h.wallet
        .debug_set_tx_response(WalletTxResponse {
            success: false,
            error: Some("INSUFFICIENT_PAYER_BALANCE".to_owned()),
            ..WalletTxResponse::default()
        })
        .expect("script");
    let router = router(&h, router_config(), MirrorNodeLedger::deterministic());

    let outcome = router
        .execute("storeMessage", &[json!("hi")], Some(250_000))
        .await
        .expect("execute");
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("INSUFFICIENT_PAYER_BALANCE"));
    assert_eq!(h.wallet.debug_sent_transactions().expect("sent")[0].1.gas, 250_000);
}

#[tokio::test]
async fn bad_arguments_fail_the_outcome_not_the_call() {
    let h = native_session().await;
    let router = router(&h, router_config(), MirrorNodeLedger::deterministic());

    let outcome = router
        .execute("storeMessage", &[], None)
        .await
        .expect("execute");
    assert!(!outcome.success);
    assert!(outcome.error.is_some());
    assert!(h.wallet.debug_sent_transactions().expect("sent").is_empty());
}

#[tokio::test]
async fn missing_native_contract_is_a_precondition_error() {
    let h = native_session().await;
    let router = router(&h, RouterConfig::default(), MirrorNodeLedger::deterministic());

    assert!(matches!(
        router.execute("storeMessage", &[json!("hi")], None).await,
        Err(RouterError::ContractNotConfigured("native"))
    ));
    assert!(matches!(
        router.query("getMessageCount", &[]).await,
        Err(RouterError::ContractNotConfigured("native"))
    ));
}

#[tokio::test]
async fn unknown_function_names_are_unsupported() {
    let h = native_session().await;
    let router = router(&h, router_config(), MirrorNodeLedger::deterministic());
    assert!(matches!(
        router.query("deleteMessage", &[]).await,
        Err(RouterError::UnsupportedOperation { backend: "native", .. })
    ));
}

#[tokio::test]
async fn native_query_surfaces_ledger_errors() {
    let h = native_session().await;
    let ledger = MirrorNodeLedger::deterministic();
    ledger.debug_push_call_error("CONTRACT_REVERT_EXECUTED").expect("script");
    let router = router(&h, router_config(), ledger);

    assert!(matches!(
        router.query("getMessageCount", &[]).await,
        Err(RouterError::Remote { .. })
    ));
}

#[tokio::test]
async fn evm_execute_submits_and_waits_for_receipt() {
    let h = injected_session().await;
    h.provider.debug_delay_receipts(2).expect("script");
    let router = router(&h, router_config(), MirrorNodeLedger::deterministic());

    let outcome = router
        .execute("storeMessage", &[json!("hello evm")], None)
        .await
        .expect("execute");

    assert!(outcome.success, "{outcome:?}");
    assert!(outcome.transaction_id.as_deref().is_some_and(|id| id.starts_with("0x")));
    assert_eq!(h.timer.sleeps(), vec![1_000, 1_000]);
    let sent = h.provider.debug_sent_transactions().expect("sent");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, evm_contract());
    assert_eq!(sent[0].gas, Some(100_000));
    assert_eq!(
        router.evm_binding().expect("binding").address,
        evm_contract()
    );
}

#[tokio::test]
async fn evm_revert_is_reported_with_the_transaction_hash() {
    let h = injected_session().await;
    h.provider.debug_set_receipt_status("0x0").expect("script");
    let router = router(&h, router_config(), MirrorNodeLedger::deterministic());

    let outcome = router
        .execute("storeMessage", &[json!("reverts")], None)
        .await
        .expect("execute");
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Transaction reverted"));
    assert!(outcome.transaction_id.is_some());
}

#[tokio::test]
async fn rejected_evm_transaction_never_propagates() {
    let h = injected_session().await;
    h.provider
        .debug_reject_requests(Some("User denied transaction signature."))
        .expect("script");
    let router = router(&h, router_config(), MirrorNodeLedger::deterministic());

    let outcome = router
        .execute("storeMessage", &[json!("nope")], None)
        .await
        .expect("execute");
    assert!(!outcome.success);
    assert!(outcome
        .error
        .as_deref()
        .is_some_and(|e| e.contains("User denied transaction signature.")));
}

#[tokio::test]
async fn evm_binding_excludes_per_user_reads_and_query_mutations() {
    let h = injected_session().await;
    let router = router(&h, router_config(), MirrorNodeLedger::deterministic());
    let user = json!(sender().to_string());

    assert!(matches!(
        router.query("getUserMessages", &[user]).await,
        Err(RouterError::UnsupportedOperation { backend: "evm", .. })
    ));
    assert!(matches!(
        router.execute("getMessageCount", &[], None).await,
        Err(RouterError::UnsupportedOperation { backend: "evm", .. })
    ));
    assert!(matches!(
        router.query("storeMessage", &[json!("x")]).await,
        Err(RouterError::UnsupportedOperation { backend: "evm", .. })
    ));
}

#[tokio::test]
async fn recent_messages_zip_parallel_arrays_in_order() {
    let h = injected_session().await;
    let a: Address = "0x000000000000000000000000000000000000000A".parse().expect("a");
    let b: Address = "0x000000000000000000000000000000000000000b".parse().expect("b");
    h.provider
        .debug_push_call_result(encoded(vec![
            DynSolValue::Array(vec![DynSolValue::Address(a), DynSolValue::Address(b)]),
            DynSolValue::Array(vec![
                DynSolValue::String("x".to_owned()),
                DynSolValue::String("y".to_owned()),
            ]),
            DynSolValue::Array(vec![uint(10), uint(20)]),
            DynSolValue::Array(vec![uint(1), uint(2)]),
        ]))
        .expect("script");
    let router = router(&h, router_config(), MirrorNodeLedger::deterministic());

    let result = router
        .query("get-recent-messages", &[json!(2)])
        .await
        .expect("query");

    assert_eq!(
        result,
        QueryResult::Messages(vec![
            ContractMessage {
                id: 1,
                sender: a.to_string(),
                content: "x".to_owned(),
                timestamp: 10,
            },
            ContractMessage {
                id: 2,
                sender: b.to_string(),
                content: "y".to_owned(),
                timestamp: 20,
            },
        ])
    );
}

#[tokio::test]
async fn message_service_reads_through_the_router() {
    let h = native_session().await;
    let ledger = MirrorNodeLedger::deterministic();
    ledger.debug_push_call_result(encoded(vec![uint(3)])).expect("script");
    ledger
        .debug_push_call_result(encoded(vec![DynSolValue::Array(vec![uint(4), uint(9)])]))
        .expect("script");
    let service = MessageService::new(router(&h, router_config(), ledger));

    assert_eq!(service.message_count().await, 3);
    assert_eq!(service.user_messages(sender()).await, vec![4, 9]);
    // Nothing scripted: reads fall back to defaults.
    assert_eq!(service.user_message_count(sender()).await, 0);
    assert!(service.recent_messages(None).await.is_empty());

    let stored = service.store_message("from the facade").await;
    assert!(stored.success);
}

#[tokio::test]
async fn balance_is_formatted_for_native_accounts_only() {
    let h = native_session().await;
    let ledger = MirrorNodeLedger::deterministic();
    ledger
        .debug_set_balance(EntityId::new(0, 0, 4821), Hbar::from_tinybars(1_250_000_000))
        .expect("script");
    let router = router(&h, router_config(), ledger);

    assert_eq!(router.account_balance(&AccountRef::new("0.0.4821")).await, "12.5 ℏ");
    assert_eq!(
        router
            .account_balance(&AccountRef::new("0x1000000000000000000000000000000000000001"))
            .await,
        "0"
    );
}
