use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::screening::matcher::TwoPhaseMatcher;
use crate::store::JsonStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: JsonStore,
    pub llm: LlmClient,
    /// Owns the per-job requirements cache; clones share it.
    pub matcher: TwoPhaseMatcher,
    pub config: Config,
}
