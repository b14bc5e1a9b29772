mod common;

use std::cell::Cell;
use std::rc::Rc;

use message_saver_adapters::PairingBehavior;
use message_saver_core::domain::{SavedPairing, StorageArea};
use message_saver_core::{
    AccountRef, ConnectStatus, Network, SessionError, SessionPhase, StoragePort, TransportPort,
    WalletBackend,
};

use common::{harness, harness_with, session_config};

#[tokio::test]
async fn initialize_twice_builds_the_transport_once() {
    let h = harness();
    h.manager.initialize().await.expect("first initialize");
    h.manager.initialize().await.expect("second initialize");

    assert_eq!(h.wallet.debug_init_calls().expect("init calls"), 1);
    assert_eq!(
        h.wallet.debug_created_networks().expect("created"),
        vec![Network::Testnet]
    );
    let state = h.manager.session_state().expect("state");
    assert_eq!(state.phase, SessionPhase::Ready);
    assert!(state.initialized);
    assert!(!state.connected);
}

#[tokio::test]
async fn saved_pairing_restores_session_without_connect() {
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

    let wallet = h.manager.wallet_state();
    assert!(wallet.connected);
    assert_eq!(wallet.account_id, Some(AccountRef::new("0.0.555")));
    assert_eq!(
        h.manager.session_state().expect("state").phase,
        SessionPhase::Connected
    );
    assert_eq!(h.wallet.debug_connect_calls().expect("connect calls"), 0);
}

#[tokio::test]
async fn failed_init_returns_to_uninitialized_and_can_retry() {
    let h = harness();
    h.wallet.debug_fail_init(Some("relay offline")).expect("script");

    let err = h.manager.initialize().await.expect_err("init fails");
    assert!(matches!(err, SessionError::Initialization(_)));
    assert_eq!(
        h.manager.session_state().expect("state").phase,
        SessionPhase::Uninitialized
    );
    assert!(h.manager.transport().is_none());

    h.wallet.debug_fail_init(None).expect("script");
    h.manager.initialize().await.expect("retry");
    assert_eq!(
        h.manager.session_state().expect("state").phase,
        SessionPhase::Ready
    );
}

#[tokio::test]
async fn connect_before_initialize_times_out() {
    let h = harness();
    let err = h
        .manager
        .connect(Network::Testnet)
        .await
        .expect_err("not initialized");
    assert!(matches!(err, SessionError::InitializationTimeout(1_000)));
    assert_eq!(h.wallet.debug_connect_calls().expect("connect calls"), 0);

    // The slot was released, so a later attempt is not blocked.
    h.manager.initialize().await.expect("initialize");
    let state = h
        .manager
        .connect_and_wait(Network::Testnet)
        .await
        .expect("connect");
    assert!(state.connected);
}

#[tokio::test]
async fn pairing_event_connects_the_session() {
    let h = harness();
    h.wallet
        .debug_set_accounts(vec![AccountRef::new("0.0.1001"), AccountRef::new("0.0.1002")])
        .expect("accounts");
    h.manager.initialize().await.expect("initialize");

    let state = h
        .manager
        .connect_and_wait(Network::Testnet)
        .await
        .expect("connect");

    assert!(state.connected);
    let session = h.manager.session_state().expect("state");
    let selected = session.selected_account_id.clone().expect("selected");
    assert!(session.account_ids.contains(&selected));
    assert_eq!(selected, AccountRef::new("0.0.1002"));
    assert_eq!(session.phase, SessionPhase::Connected);
    assert_eq!(h.timer.sleeps()[0], 500, "connect delay precedes the wallet call");
}

#[tokio::test]
async fn second_connect_while_pending_is_ignored() {
    let h = harness();
    h.wallet
        .debug_set_default_behavior(PairingBehavior::Ignore)
        .expect("script");
    h.manager.initialize().await.expect("initialize");

    let first = h.manager.connect(Network::Testnet).await.expect("first");
    let ConnectStatus::Requested(pending) = first else {
        panic!("expected a pending connect, got {first:?}");
    };
    let before = h.manager.session_state().expect("state");

    let second = h.manager.connect(Network::Testnet).await.expect("second");
    assert_eq!(second, ConnectStatus::AlreadyConnecting(pending.attempt));
    assert_eq!(h.wallet.debug_connect_calls().expect("connect calls"), 1);
    assert_eq!(h.manager.session_state().expect("state"), before);
}

#[tokio::test]
async fn connect_when_connected_is_a_no_op() {
    let h = harness();
    h.manager.initialize().await.expect("initialize");
    h.manager
        .connect_and_wait(Network::Testnet)
        .await
        .expect("connect");

    let status = h.manager.connect(Network::Testnet).await.expect("connect");
    assert_eq!(status, ConnectStatus::AlreadyConnected);
    assert_eq!(h.wallet.debug_connect_calls().expect("connect calls"), 1);
}

#[tokio::test]
async fn wallet_connect_failure_returns_to_ready() {
    let h = harness();
    h.wallet
        .debug_fail_connect(Some("extension not installed"))
        .expect("script");
    h.manager.initialize().await.expect("initialize");

    let err = h
        .manager
        .connect(Network::Testnet)
        .await
        .expect_err("connect fails");
    assert!(matches!(err, SessionError::Transport(_)));
    assert_eq!(
        h.manager.session_state().expect("state").phase,
        SessionPhase::Ready
    );

    h.wallet.debug_fail_connect(None).expect("script");
    let state = h
        .manager
        .connect_and_wait(Network::Testnet)
        .await
        .expect("retry");
    assert!(state.connected);
}

#[tokio::test]
async fn disconnect_clears_state_even_when_transport_fails() {
    let h = harness();
    h.manager.initialize().await.expect("initialize");
    h.manager
        .connect_and_wait(Network::Testnet)
        .await
        .expect("connect");
    h.wallet.debug_fail_disconnect(true).expect("script");

    h.manager.disconnect().await;

    let state = h.manager.session_state().expect("state");
    assert!(!state.connected);
    assert!(state.account_ids.is_empty());
    assert_eq!(state.selected_account_id, None);
    assert_eq!(state.phase, SessionPhase::Ready);
    assert_eq!(h.wallet.debug_disconnect_calls().expect("calls"), 1);
}

#[tokio::test]
async fn disconnect_abandons_a_pending_connect() {
    let h = harness();
    h.wallet
        .debug_set_default_behavior(PairingBehavior::Ignore)
        .expect("script");
    h.manager.initialize().await.expect("initialize");
    let ConnectStatus::Requested(pending) =
        h.manager.connect(Network::Testnet).await.expect("connect")
    else {
        panic!("expected a pending connect");
    };
    let attempt = pending.attempt;

    let (waited, ()) = tokio::join!(h.manager.await_pairing(pending), async {
        common::until_elapsed(&h.clock, 2_000).await;
        h.manager.disconnect().await;
    });

    assert!(matches!(waited, Err(SessionError::ConnectAbandoned(a)) if a == attempt));
    assert!(!h.manager.wallet_state().connected);
}

#[tokio::test]
async fn switching_network_rebuilds_the_transport() {
    let h = harness();
    h.storage
        .set(StorageArea::Local, "hashconnect_network_testnet", "{}")
        .expect("seed");
    h.storage
        .set(StorageArea::Local, "theme", "dark")
        .expect("seed");
    h.manager.initialize().await.expect("initialize");

    let state = h
        .manager
        .connect_and_wait(Network::Mainnet)
        .await
        .expect("connect on mainnet");

    assert!(state.connected);
    assert_eq!(
        h.wallet.debug_created_networks().expect("created"),
        vec![Network::Testnet, Network::Mainnet]
    );
    assert_eq!(h.manager.session_state().expect("state").network, Network::Mainnet);
    let keys = h.storage.keys(StorageArea::Local).expect("keys");
    assert!(keys.contains(&"theme".to_owned()));
    assert!(!keys.contains(&"hashconnect_network_testnet".to_owned()));
}

#[tokio::test]
async fn clear_on_connect_wipes_storage_and_reinitializes() {
    let mut config = session_config();
    config.clear_on_connect = true;
    let h = harness_with(config, message_saver_adapters::ManualEntryAdapter::Disabled);
    h.storage
        .set(StorageArea::Local, "stale", "0.0.13")
        .expect("seed");
    h.manager.initialize().await.expect("initialize");

    let state = h
        .manager
        .connect_and_wait(Network::Testnet)
        .await
        .expect("connect");

    assert!(state.connected);
    assert_eq!(h.wallet.debug_init_calls().expect("init calls"), 2);
    assert_eq!(
        h.storage.get(StorageArea::Local, "stale").expect("get"),
        None
    );
}

#[tokio::test]
async fn manual_entry_validates_account_format() {
    let h = harness();
    h.manager.initialize().await.expect("initialize");

    for bad in ["0.0.12x", "1.0.5", "", "0x1000000000000000000000000000000000000001"] {
        let err = h.manager.connect_manual(bad).expect_err("rejected");
        assert!(matches!(err, SessionError::InvalidAccountId(_)), "{bad}");
    }
    assert!(!h.manager.wallet_state().connected);

    let state = h.manager.connect_manual(" 0.0.777 ").expect("accepted");
    assert_eq!(state.account_id, Some(AccountRef::new("0.0.777")));
}

#[tokio::test]
async fn injected_wallet_switches_chain_and_adopts_first_account() {
    let h = harness();
    let state = h.manager.connect_injected().await.expect("injected");

    assert!(state.connected);
    let expected = AccountRef::new("0x1000000000000000000000000000000000000001");
    assert_eq!(state.account_id, Some(expected));
    assert_eq!(h.provider.debug_chain_id().expect("chain"), 296);
    let requests = h.provider.debug_requests().expect("requests");
    assert_eq!(
        requests,
        vec![
            "wallet_addEthereumChain".to_owned(),
            "wallet_switchEthereumChain".to_owned(),
            "eth_requestAccounts".to_owned(),
        ]
    );
}

#[tokio::test]
async fn injected_wallet_tolerates_chain_errors_but_not_rejection() {
    let h = harness();
    h.provider.debug_reject_add_chain(true).expect("script");
    h.provider
        .debug_reject_requests(Some("User rejected the request."))
        .expect("script");

    let err = h.manager.connect_injected().await.expect_err("rejected");
    assert!(matches!(err, SessionError::Provider(_)));
    assert!(!h.manager.wallet_state().connected);
}

#[tokio::test]
async fn late_hashconnect_accounts_do_not_mix_into_an_injected_session() {
    let h = harness();
    h.wallet
        .debug_set_default_behavior(PairingBehavior::OnAdditionalAccounts)
        .expect("script");
    h.manager.initialize().await.expect("initialize");
    let ConnectStatus::Requested(pending) =
        h.manager.connect(Network::Testnet).await.expect("connect")
    else {
        panic!("expected a pending connect");
    };

    h.manager.connect_injected().await.expect("injected");
    let transport = h.manager.transport().expect("transport");
    let topic = transport.topic().expect("topic");
    transport
        .request_additional_accounts(&topic, Network::Testnet)
        .await
        .expect("additional accounts");

    let injected = AccountRef::new("0x1000000000000000000000000000000000000001");
    let state = h.manager.session_state().expect("state");
    assert_eq!(state.account_ids, vec![injected.clone()]);
    assert_eq!(state.selected_account_id, Some(injected));
    assert_eq!(state.backend, Some(WalletBackend::Injected));

    let waited = h.manager.await_pairing(pending).await;
    assert!(matches!(waited, Err(SessionError::ConnectAbandoned(_))));
}

#[tokio::test]
async fn restore_injected_requires_prior_authorization() {
    let h = harness();
    assert!(!h.manager.restore_injected().await.expect("restore"));

    h.provider.debug_authorize().expect("authorize");
    assert!(h.manager.restore_injected().await.expect("restore"));
    assert!(h.manager.wallet_state().connected);
}

#[tokio::test]
async fn unsubscribe_removes_exactly_one_handler() {
    let h = harness();
    let first = Rc::new(Cell::new(0u32));
    let second = Rc::new(Cell::new(0u32));

    let first_count = Rc::clone(&first);
    let first_sub = h.manager.on_state_change(move |_| first_count.set(first_count.get() + 1));
    let second_count = Rc::clone(&second);
    let _second_sub = h.manager.on_state_change(move |_| second_count.set(second_count.get() + 1));
    assert_eq!(h.manager.store().listener_count(), 2);

    first_sub.unsubscribe();
    assert_eq!(h.manager.store().listener_count(), 1);

    h.manager.initialize().await.expect("initialize");
    assert_eq!(first.get(), 0);
    assert!(second.get() > 0);
}

#[tokio::test]
async fn topic_is_exposed_after_init() {
    let h = harness();
    h.manager.initialize().await.expect("initialize");
    let transport = h.manager.transport().expect("transport");
    assert_eq!(transport.topic().as_deref(), Some("topic-1"));
}
