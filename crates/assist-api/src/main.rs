use anyhow::Context;
use assist_db::{workflow::ConfirmPolicy, Store};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod applicants;
mod applications;
mod caller;
mod config;
mod error;
mod export;
#[cfg(test)]
mod fixtures;
mod login;
mod maker_checker;
mod pdf;
mod reference;
mod routes;
mod tabular;
mod token;
mod uploads;
mod users;
mod views;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = config::load().context("loading configuration")?;
    init_tracing(&config.tracing);
    let tokens = Arc::new(
        token::Tokens::new(&config.jwt.secret, config.jwt.expiry).context("configuring tokens")?,
    );
    let store = assist_db::create(&config.database)
        .await
        .context("creating database store")?;
    let app_state = AppState {
        store: Arc::new(store),
        tokens,
        uploads: Arc::new(config.uploads),
        confirm_policy: ConfirmPolicy {
            allow_self_confirm: config.maker_checker.allow_self_confirm,
        },
    };
    let app = routes::setup(app_state);
    let listener = tokio::net::TcpListener::bind((config.bind_address.as_str(), config.bind_port))
        .await
        .context("binding listener")?;
    tracing::info!(address = %listener.local_addr()?, "listening");
    Ok(axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving application")?)
}

fn init_tracing(config: &config::TracingConfig) {
    if config.console {
        console_subscriber::init();
        return;
    }
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "unable to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutting down");
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) tokens: Arc<token::Tokens>,
    pub(crate) uploads: Arc<config::UploadsConfig>,
    pub(crate) confirm_policy: ConfirmPolicy,
}
