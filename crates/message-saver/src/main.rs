//! Message Saver: store and read messages on Hedera through HashPack or an
//! injected EVM wallet.

mod bridge;
#[cfg(not(target_arch = "wasm32"))]
mod cli;

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eyre::Result<()> {
    use clap::Parser;
    use message_saver_adapters::{AppConfig, ManualEntryAdapter};

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!(
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIME"),
        "Starting message-saver"
    );

    let cli = cli::Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(network) = cli.network {
        config.network = network;
    }
    let bridge = bridge::MessageSaverBridge::new(config, ManualEntryAdapter::Console)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(cli::run(cli, bridge))
}

#[cfg(target_arch = "wasm32")]
fn main() {
    use message_saver_adapters::{AppConfig, ManualEntryAdapter};

    tracing_wasm::set_as_global_default();
    tracing::info!(git = env!("GIT_HASH"), "Starting message-saver");

    wasm_bindgen_futures::spawn_local(async {
        let config = match AppConfig::from_env() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("invalid configuration: {e}");
                return;
            }
        };
        let bridge = match bridge::MessageSaverBridge::new(config, ManualEntryAdapter::BrowserPrompt) {
            Ok(bridge) => bridge,
            Err(e) => {
                tracing::error!("failed to build bridge: {e}");
                return;
            }
        };
        if let Err(e) = bridge.initialize().await {
            tracing::error!("session initialization failed: {e}");
            return;
        }
        match bridge.restore_injected().await {
            Ok(true) => tracing::info!("restored injected wallet session"),
            Ok(false) => {}
            Err(e) => tracing::warn!("injected wallet restore failed: {e}"),
        }
    });
}
