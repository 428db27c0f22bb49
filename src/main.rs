use std::sync::Arc;

use anyhow::Context;
use spaces_bridge::bridge::{BridgeDeps, SpaceBridge};
use spaces_bridge::chat::ModelsChatGateway;
use spaces_bridge::config::BridgeConfig;
use spaces_bridge::conversation::ConversationStore;
use spaces_bridge::protocol::{ProtocolAdapter, StreamableHttpTransport};
use spaces_bridge::server::bridge_routes;
use spaces_bridge::spaces::{ContextLoader, SpaceCatalog};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BridgeConfig::from_env().context("loading configuration")?;

    eprintln!("📚 Spaces Bridge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Tools: {}", config.mcp_url);
    eprintln!("   Chat: {} ({})", config.chat_url, config.chat_model);
    eprintln!("   API: http://0.0.0.0:{}/api/spaces\n", config.port);

    // ── Tool protocol ─────────────────────────────────────────────────────
    let transport = Arc::new(StreamableHttpTransport::new(
        config.mcp_url.clone(),
        config.token.clone(),
    ));
    let adapter = Arc::new(ProtocolAdapter::new(transport, config.protocol_timeout));

    // ── Spaces + chat ─────────────────────────────────────────────────────
    let chat = ModelsChatGateway::new(
        config.chat_url.clone(),
        config.chat_model.clone(),
        config.token.clone(),
        config.chat_timeout,
    )
    .context("creating chat client")?;

    let store = Arc::new(ConversationStore::new());
    let deps = BridgeDeps {
        catalog: Arc::new(SpaceCatalog::new(Arc::clone(&adapter), config.tools.list_spaces.clone())),
        loader: Arc::new(ContextLoader::new(adapter, config.tools.get_space.clone())),
        store: Arc::clone(&store),
        chat: Arc::new(chat),
    };
    let bridge = Arc::new(SpaceBridge::new(deps, config.retry, config.history_window));

    // ── HTTP server ───────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    tracing::info!(port = config.port, "Spaces bridge listening");

    axum::serve(listener, bridge_routes(bridge))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(conversations = store.len().await, "Spaces bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
