use std::sync::{Arc, Mutex};
use std::thread;

use alloy::primitives::Bytes;
use serde_json::{json, Value};
use tiny_http::{Method, Response, Server, StatusCode};

use message_saver_adapters::{AppConfig, Eip1193Adapter, MirrorNodeLedger};
use message_saver_core::domain::{ContractCallRequest, EvmCall, EvmChainParams};
use message_saver_core::{
    ContractFunction, EntityId, EvmProviderPort, Hbar, LedgerPort, Network, PortError,
};

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    url: String,
    body: Value,
}

fn spawn_mock_server(
    calls: Arc<Mutex<Vec<Recorded>>>,
    max_requests: usize,
) -> (String, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());

    let join = thread::spawn(move || {
        for _ in 0..max_requests {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let mut raw = String::new();
            let _ = req.as_reader().read_to_string(&mut raw);
            let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
            let method = req.method().clone();
            let url = req.url().to_owned();
            if let Ok(mut g) = calls.lock() {
                g.push(Recorded {
                    method: method.to_string(),
                    url: url.clone(),
                    body: body.clone(),
                });
            }

            let rpc_method = body.get("method").and_then(Value::as_str).unwrap_or_default();
            let (code, payload) = match (method, url.as_str()) {
                (Method::Post, "/api/v1/contracts/call") => (
                    200,
                    json!({ "result": "0x000000000000000000000000000000000000000000000000000000000000002a" }),
                ),
                (Method::Get, u) if u.starts_with("/api/v1/balances?account.id=0.0.4821") => (
                    200,
                    json!({ "balances": [{ "account": "0.0.4821", "balance": 250_000_000, "tokens": [] }] }),
                ),
                (Method::Get, u) if u.starts_with("/api/v1/balances") => (200, json!({ "balances": [] })),
                (Method::Post, "/rpc") => match rpc_method {
                    "eth_chainId" => (200, json!({ "jsonrpc": "2.0", "id": 1, "result": "0x128" })),
                    "eth_requestAccounts" => (
                        200,
                        json!({ "jsonrpc": "2.0", "id": 1, "result": ["0x1000000000000000000000000000000000000001"] }),
                    ),
                    "eth_sendTransaction" => (
                        200,
                        json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": 4001, "message": "User rejected the request." } }),
                    ),
                    "wallet_addEthereumChain" => (200, json!({ "jsonrpc": "2.0", "id": 1, "result": null })),
                    _ => (200, json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32601, "message": "method not found" } })),
                },
                _ => (404, json!({ "_status": { "messages": [{ "message": "Not found" }] } })),
            };

            let response =
                Response::from_string(payload.to_string()).with_status_code(StatusCode(code));
            let _ = req.respond(response);
        }
    });

    (addr, join)
}

#[tokio::test]
async fn mirror_node_contract_call_posts_long_zero_target() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (base_url, join) = spawn_mock_server(Arc::clone(&calls), 1);
    let config = AppConfig {
        mirror_node_url: Some(base_url),
        http_timeout_ms: 5_000,
        ..AppConfig::default()
    };
    let ledger = MirrorNodeLedger::with_config(&config);
    assert!(!ledger.is_deterministic());

    let output = ledger
        .contract_call(&ContractCallRequest {
            contract_id: EntityId::new(0, 0, 999),
            function: ContractFunction::GetMessageCount,
            gas: 50_000,
            calldata: Bytes::from_static(&[0x3d, 0xbb, 0x20, 0x2b]),
            max_query_payment: Hbar::from_hbar(1),
        })
        .await
        .expect("contract call");
    assert_eq!(output.len(), 32);
    assert_eq!(output[31], 42);
    join.join().expect("server thread");

    let calls = calls.lock().expect("calls");
    assert_eq!(calls[0].method, "POST");
    assert_eq!(
        calls[0].body["to"].as_str().map(str::to_lowercase).as_deref(),
        Some("0x00000000000000000000000000000000000003e7")
    );
    assert_eq!(calls[0].body["data"], "0x3dbb202b");
    assert_eq!(calls[0].body["gas"], 50_000);
    assert_eq!(calls[0].body["estimate"], false);
}

#[tokio::test]
async fn mirror_node_balance_reads_tinybars() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (base_url, join) = spawn_mock_server(Arc::clone(&calls), 2);
    let config = AppConfig {
        mirror_node_url: Some(format!("{base_url}/")),
        ..AppConfig::default()
    };
    let ledger = MirrorNodeLedger::with_config(&config);

    let balance = ledger
        .account_balance(&EntityId::new(0, 0, 4821))
        .await
        .expect("balance");
    assert_eq!(balance, Hbar::from_tinybars(250_000_000));

    let missing = ledger.account_balance(&EntityId::new(0, 0, 1)).await;
    assert!(matches!(missing, Err(PortError::NotFound(_))));
    join.join().expect("server thread");
}

#[tokio::test]
async fn eip1193_proxy_forwards_json_rpc() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (base_url, join) = spawn_mock_server(Arc::clone(&calls), 4);
    let config = AppConfig {
        eip1193_proxy_url: Some(format!("{base_url}/rpc")),
        ..AppConfig::default()
    };
    let provider = Eip1193Adapter::with_config(&config);
    assert!(!provider.is_deterministic());

    provider
        .add_chain(&EvmChainParams::for_network(Network::Testnet))
        .await
        .expect("add chain");
    assert_eq!(provider.chain_id().await.expect("chain id"), 296);
    let accounts = provider.request_accounts().await.expect("accounts");
    assert_eq!(accounts.len(), 1);

    let rejected = provider
        .send_transaction(&EvmCall {
            from: accounts.first().copied(),
            to: "0x00000000000000000000000000000000000013ad".parse().expect("to"),
            data: Bytes::from_static(&[0xde, 0xad]),
            gas: Some(100_000),
        })
        .await;
    assert!(matches!(rejected, Err(PortError::Rejected(_))));
    join.join().expect("server thread");

    let calls = calls.lock().expect("calls");
    let methods: Vec<&str> = calls
        .iter()
        .filter_map(|c| c.body.get("method").and_then(Value::as_str))
        .collect();
    assert_eq!(
        methods,
        vec![
            "wallet_addEthereumChain",
            "eth_chainId",
            "eth_requestAccounts",
            "eth_sendTransaction"
        ]
    );
    assert_eq!(calls[0].body["params"][0]["chainId"], "0x128");
}
