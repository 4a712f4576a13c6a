//! Configuration for the reputation core.

/// Tunable limits shared by the registry, resolver and aggregator.
#[derive(Debug, Clone)]
pub struct ReputeConfig {
    /// Page cap for fragment-type catalog reads (default: 100)
    pub type_page_limit: u32,
    /// Row cap for user-facing name search (default: 500)
    pub entity_search_limit: u32,
    /// Concurrent ledger reads per aggregation batch (default: 8)
    pub fetch_concurrency: usize,
}

impl Default for ReputeConfig {
    fn default() -> Self {
        Self {
            type_page_limit: 100,
            entity_search_limit: 500,
            fetch_concurrency: 8,
        }
    }
}
