// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, ledger::Ledger, store::Store};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            ledger: Ledger::new(store, config.retry_policy()),
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Ledger {
    fn from_ref(state: &AppState) -> Self {
        state.ledger.clone()
    }
}
