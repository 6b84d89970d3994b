//! Application state shared across routes

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::game::MatchRegistry;
use crate::store::{LedgerEconomy, RemoteEconomy, SharedEconomy, SupabaseClient};
use crate::util::rate_limit::{create_limiter, Limiter, MATCH_CREATE_RATE_LIMIT};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub economy: SharedEconomy,
    pub match_registry: Arc<MatchRegistry>,
    pub create_limiter: Arc<Limiter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Persist balances through Supabase when configured, otherwise keep them in memory
        let economy: SharedEconomy = match (&config.supabase_url, &config.supabase_service_role_key) {
            (Some(url), Some(key)) => {
                info!(url = %url, "Using Supabase economy ledger");
                Arc::new(RemoteEconomy::new(SupabaseClient::new(url, key)))
            }
            _ => {
                info!("Supabase not configured, using in-memory economy ledger");
                Arc::new(LedgerEconomy::new())
            }
        };

        Self {
            config,
            economy,
            match_registry: Arc::new(MatchRegistry::new()),
            create_limiter: create_limiter(MATCH_CREATE_RATE_LIMIT),
        }
    }
}
