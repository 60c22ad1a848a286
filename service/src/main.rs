//! Binary entry point. Loads a [`Config`] from `TICKGATE_CONFIG` (a JSON
//! file; the loading mechanism itself is external per §1 Non-goals —
//! `serde_json` is used here only because it's already this crate's own
//! dependency, not because JSON is mandated), builds a [`Supervisor`]
//! over the external collaborators a real deployment must supply, and
//! runs until `SIGINT`/`SIGTERM`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tickgate_core::shutdown::AsyncShutdown;
use tickgate_core::{GatewayError, GatewayResult};
use tickgate_data::mode_manager::UnavailableCalendar;
use tickgate_data::token_refresher::TokenIssuer;
use tickgate_execution::broker::{BrokerError, BrokerOrderClient};
use tickgate_execution::store::JsonlTaskStore;
use tickgate_markets::{AccountId, InstrumentRegistry};
use tickgate_risk::OrderRequest;

use tickgate::config::Config;
use tickgate::supervisor::{ExternalCollaborators, Supervisor};
use tickgate::token_store::FsTokenStore;

const DEFAULT_CONFIG_PATH: &str = "tickgate.json";
const DEFAULT_STATE_DIR: &str = "tickgate-state";

/// Issues tokens from a fixed, operator-provided credential per account
/// rather than calling out to a broker auth endpoint — that RPC is an
/// external collaborator per §1, so this issuer only rotates the
/// `expires_at` it reports. A real deployment supplies its own
/// [`TokenIssuer`] that actually talks to the broker.
struct StaticCredentialIssuer {
    credentials: HashMap<AccountId, String>,
    ttl: chrono::Duration,
}

#[async_trait]
impl TokenIssuer for StaticCredentialIssuer {
    async fn issue(&self, account_id: &AccountId) -> GatewayResult<(String, DateTime<Utc>)> {
        let secret = self
            .credentials
            .get(account_id)
            .ok_or_else(|| GatewayError::Auth(format!("no credential configured for account {account_id}")))?;
        Ok((secret.clone(), Utc::now() + self.ttl))
    }
}

/// Placeholder broker order RPC client: fails every call with a
/// non-retriable error carrying a clear message, so wiring mistakes show
/// up immediately in the dead-letter queue rather than silently hanging.
/// A real deployment supplies its own [`BrokerOrderClient`].
#[derive(Debug, Default)]
struct UnconfiguredBrokerClient;

#[async_trait]
impl BrokerOrderClient for UnconfiguredBrokerClient {
    async fn place_order(&self, _account_id: &str, _request: &OrderRequest) -> Result<String, BrokerError> {
        Err(BrokerError::NonRetriable(
            "no broker order client configured; replace UnconfiguredBrokerClient in main.rs".to_string(),
        ))
    }

    async fn cancel_order(&self, _account_id: &str, _broker_order_id: &str) -> Result<(), BrokerError> {
        Err(BrokerError::NonRetriable(
            "no broker order client configured; replace UnconfiguredBrokerClient in main.rs".to_string(),
        ))
    }
}

fn load_config() -> Config {
    let path = std::env::var("TICKGATE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("failed to read config file {path}: {err}"));
    serde_json::from_str(&raw).unwrap_or_else(|err| panic!("failed to parse config file {path}: {err}"))
}

/// Builds the connect URL for an account from `TICKGATE_WS_URL_TEMPLATE`
/// (default `wss://broker.example/feed?account={account}`), substituting
/// the account id in place of the `{account}` placeholder. The real
/// upstream host is a deployment concern, not part of §6.6's config shape.
fn ws_url_template() -> String {
    std::env::var("TICKGATE_WS_URL_TEMPLATE")
        .unwrap_or_else(|_| "wss://broker.example/feed?account={account}".to_string())
}

#[tokio::main]
async fn main() {
    if std::env::var("TICKGATE_JSON_LOGS").is_ok() {
        tickgate_core::logging::init_json_logging();
    } else {
        tickgate_core::logging::init_logging();
    }

    let config = load_config();
    let state_dir = std::env::var("TICKGATE_STATE_DIR").unwrap_or_else(|_| DEFAULT_STATE_DIR.to_string());
    let state_dir = std::path::PathBuf::from(state_dir);

    let token_store = Arc::new(
        FsTokenStore::open(state_dir.join("tokens")).expect("failed to open token store directory"),
    );
    let task_store = Arc::new(
        JsonlTaskStore::open(state_dir.join("tasks.jsonl")).expect("failed to open task store file"),
    );

    let credentials: HashMap<AccountId, String> = std::env::vars()
        .filter_map(|(key, value)| key.strip_prefix("TICKGATE_CREDENTIAL_").map(|account| (account.to_string(), value)))
        .collect();

    let template = ws_url_template();
    let ws_url = Arc::new(move |account_id: &AccountId| template.replace("{account}", account_id));

    let collaborators = ExternalCollaborators {
        calendar: Box::new(UnavailableCalendar),
        token_issuer: Arc::new(StaticCredentialIssuer { credentials, ttl: chrono::Duration::hours(6) }),
        broker_order_client: Arc::new(UnconfiguredBrokerClient),
        task_store,
        token_store,
        ws_url,
    };

    let registry = Arc::new(InstrumentRegistry::new());
    let supervisor = Arc::new(Supervisor::new(config, registry, collaborators).expect("failed to construct supervisor"));

    supervisor.spawn_all_configured_accounts().expect("failed to spawn configured accounts");
    let token_refresh_scan = supervisor.spawn_token_refresh_scan();
    let mode_reevaluation = supervisor.spawn_mode_reevaluation(std::time::Duration::from_secs(60));
    tracing::info!("tickgate supervisor running");

    tokio::signal::ctrl_c().await.expect("failed to listen for shutdown signal");
    tracing::info!("shutdown signal received, draining account sessions");

    token_refresh_scan.abort();
    mode_reevaluation.abort();
    let _ = token_refresh_scan.await;
    let _ = mode_reevaluation.await;
    let mut supervisor = Arc::try_unwrap(supervisor).unwrap_or_else(|_| panic!("periodic background tasks outlived shutdown"));
    supervisor.shutdown().await;
}
