//! chat-relay server entry point.

use std::sync::Arc;

use chat_relay::adapters::ai::{InvocationSettings, ModelInvoker, NoTools, OpenAIConfig, OpenAIProvider};
use chat_relay::adapters::auth::PostgresSessionValidator;
use chat_relay::adapters::http::{build_router, AppState, AuthProxyState, AuthState, ChatAppState};
use chat_relay::adapters::postgres::{connect_pool, run_migrations, PostgresChatRepository};
use chat_relay::adapters::stream_store::{InMemoryStreamStore, RedisStreamStore};
use chat_relay::application::handlers::StreamChatSettings;
use chat_relay::config::{AppConfig, LogFormat, ResumableBackend, ServerConfig};
use chat_relay::ports::StreamResumption;
use secrecy::Secret;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging(server: &ServerConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.clone()));

    match server.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok(),
    };
}

async fn build_resumption(
    config: &AppConfig,
) -> Result<StreamResumption, Box<dyn std::error::Error>> {
    let streaming = &config.streaming;
    let resumption = match streaming.resumable {
        ResumableBackend::Disabled => StreamResumption::Disabled,
        ResumableBackend::Memory => StreamResumption::Enabled(Arc::new(InMemoryStreamStore::new(
            streaming.buffer_ttl(),
        ))),
        ResumableBackend::Redis => {
            let redis_config = config
                .redis
                .as_ref()
                .ok_or("redis stream buffer selected without redis configuration")?;
            let client = redis::Client::open(redis_config.url.as_str())?;
            let conn = tokio::time::timeout(
                redis_config.timeout(),
                client.get_multiplexed_tokio_connection(),
            )
            .await??;
            StreamResumption::Enabled(Arc::new(RedisStreamStore::new(
                conn,
                redis_config.key_prefix.clone(),
                streaming.buffer_ttl(),
                streaming.poll_interval(),
            )))
        }
    };
    tracing::info!(backend = ?streaming.resumable, "stream resumption configured");
    Ok(resumption)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_logging(&config.server);
    config.validate()?;

    let pool = connect_pool(&config.database)?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
        tracing::info!("migrations applied");
    }

    let api_key = config
        .ai
        .openai_api_key
        .clone()
        .ok_or("CHAT_RELAY__AI__OPENAI_API_KEY is required")?;
    let provider = OpenAIProvider::new(
        OpenAIConfig::new(api_key)
            .with_base_url(config.ai.base_url.clone())
            .with_timeout(config.ai.timeout())
            .with_max_retries(config.ai.max_retries),
    )?;
    let invoker = ModelInvoker::new(
        Arc::new(provider),
        Arc::new(NoTools),
        InvocationSettings::from_config(&config.ai, &config.streaming),
    );

    let state = AppState {
        chat: ChatAppState {
            repository: Arc::new(PostgresChatRepository::new(pool.clone())),
            invoker,
            resumption: build_resumption(&config).await?,
            settings: StreamChatSettings {
                daily_message_quota: config.features.daily_message_quota,
                forward_reasoning: config.features.send_reasoning,
            },
        },
        auth: AuthState::new(
            Arc::new(PostgresSessionValidator::new(
                pool,
                Secret::new(config.auth.secret.clone()),
            )),
            config.auth.cookie_names(),
        ),
        auth_proxy: AuthProxyState::new(
            config.auth.provider_url.clone(),
            config.server.request_timeout(),
        )?,
    };

    let app = build_router(state, &config.server);
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "chat-relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
