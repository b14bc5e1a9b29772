use alloy::primitives::address;
use message_saver_core::domain::{EvmCall, EvmChainParams, SavedPairing, WalletMetadata};
use message_saver_core::{AccountRef, Network, QueryResult, WalletState};

#[test]
fn network_serializes_lowercase() {
    let json = serde_json::to_string(&Network::Mainnet).expect("serialize network");
    assert_eq!(json, "\"mainnet\"");
    let parsed: Network = serde_json::from_str("\"testnet\"").expect("deserialize network");
    assert_eq!(parsed, Network::Testnet);
}

#[test]
fn wallet_state_roundtrip_keeps_account() {
    let state = WalletState {
        connected: true,
        account_id: Some(AccountRef::new("0.0.555")),
        evm_address: AccountRef::new("0.0.555").evm_address(),
        balance: Some("10 ℏ".to_owned()),
    };
    let json = serde_json::to_string(&state).expect("serialize state");
    let back: WalletState = serde_json::from_str(&json).expect("deserialize state");
    assert_eq!(back, state);
}

#[test]
fn saved_pairing_tolerates_missing_network() {
    let pairing = SavedPairing {
        topic: "topic-1".to_owned(),
        account_ids: vec![AccountRef::new("0.0.7")],
        metadata: Some(WalletMetadata::hashpack("HashPack Wallet")),
        network: None,
    };
    let value = serde_json::to_value(&pairing).expect("serialize pairing");
    assert_eq!(value["account_ids"][0], "0.0.7");
    assert!(value["network"].is_null());
}

#[test]
fn query_result_kind_names_shape() {
    assert_eq!(QueryResult::Count(3).kind(), "count");
    assert_eq!(QueryResult::Ids(vec![1, 2]).kind(), "ids");
    assert_eq!(QueryResult::Messages(Vec::new()).kind(), "messages");
}

#[test]
fn chain_params_match_hedera_chain_ids() {
    assert_eq!(EvmChainParams::for_network(Network::Mainnet).chain_id_hex(), "0x127");
    let testnet = EvmChainParams::for_network(Network::Testnet);
    assert_eq!(testnet.chain_id, 296);
    let json = testnet.to_json();
    assert_eq!(json["chainId"], "0x128");
    assert_eq!(json["nativeCurrency"]["decimals"], 18);
}

#[test]
fn evm_call_json_uses_hex_quantities() {
    let call = EvmCall {
        from: None,
        to: address!("1111111111111111111111111111111111111111"),
        data: vec![0xde, 0xad].into(),
        gas: Some(100_000),
    };
    let json = call.to_json();
    assert_eq!(json["data"], "0xdead");
    assert_eq!(json["gas"], "0x186a0");
    assert!(json.get("from").is_none());
}
