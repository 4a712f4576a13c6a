//! Fragment-type registry.
//!
//! Resolves the vote categories applicable to an entity by merging global
//! type definitions with those scoped to a base entity. Type catalogs are
//! best-effort reference data: a failed lookup yields an empty page, never
//! an error.

use std::sync::Arc;

use tracing::warn;

use crate::config::ReputeConfig;
use crate::ledger::{Ledger, ReadQuery, Table};
use crate::types::{RepType, Reputable};

/// Read-side registry over the `reptypes` table.
pub struct FragTypeRegistry {
    ledger: Arc<dyn Ledger>,
    config: ReputeConfig,
}

impl FragTypeRegistry {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self::with_config(ledger, ReputeConfig::default())
    }

    pub fn with_config(ledger: Arc<dyn Ledger>, config: ReputeConfig) -> Self {
        Self { ledger, config }
    }

    /// Type definitions whose `base` equals the argument; `0` selects the
    /// global catalog. Bounded to one page.
    pub async fn fragment_types(&self, base: u64) -> Vec<RepType> {
        let query = ReadQuery::new(Table::RepTypes)
            .index(base)
            .index_position(2)
            .key_type("i64")
            .limit(self.config.type_page_limit)
            .rows_only();

        match self.ledger.read(query).await {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| serde_json::from_value(row).ok())
                .collect(),
            Err(error) => {
                warn!(base, %error, "fragment type lookup failed, returning empty page");
                Vec::new()
            }
        }
    }

    /// The caller-facing merge: all global types, then the types based on
    /// the entity's fingerprint tagged `is_based`. Global types come first
    /// for UI precedence; order does not affect scoring.
    pub async fn fragment_types_for(&self, entity: Option<&Reputable>) -> Vec<RepType> {
        let mut types = self.fragment_types(0).await;
        if let Some(entity) = entity {
            let mut based = self.fragment_types(entity.fingerprint).await;
            for rep_type in &mut based {
                rep_type.is_based = true;
            }
            types.append(&mut based);
        }
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::types::EntityType;

    #[tokio::test]
    async fn merges_global_and_based_types() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.register_type("trust").await;
        ledger.register_type("security").await;

        let entity = Reputable::new(EntityType::BlockchainAddress, "eosio.token", "");
        ledger.register_based_type("solvency", entity.fingerprint).await;

        let registry = FragTypeRegistry::new(ledger);
        let merged = registry.fragment_types_for(Some(&entity)).await;

        assert_eq!(merged.len(), 3);
        assert!(merged[..2].iter().all(|t| !t.is_based && t.base == 0));
        assert_eq!(merged[2].frag_type, "solvency");
        assert!(merged[2].is_based);
        assert_eq!(merged[2].base, entity.fingerprint);
    }

    #[tokio::test]
    async fn no_entity_returns_globals_only() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.register_type("trust").await;
        ledger.register_based_type("solvency", 777).await;

        let registry = FragTypeRegistry::new(ledger);
        let types = registry.fragment_types_for(None).await;

        assert_eq!(types.len(), 1);
        assert_eq!(types[0].frag_type, "trust");
    }
}
