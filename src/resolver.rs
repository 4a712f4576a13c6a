//! Entity resolution.
//!
//! Point lookups by id or fingerprint, name search, and the one stateful
//! algorithm in the core: resolving or auto-creating the parent chain
//! before a child mutation is submitted. Store failures on the read path
//! are treated as not-found; only parent creation fails hard.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ReputeConfig;
use crate::error::{ReputeError, Result};
use crate::fingerprint::{compose, fingerprint, DELIMITER};
use crate::ledger::{Ledger, ReadQuery, ReputeIntent, Table};
use crate::types::{EntityType, ParentSpec, Reputable};

/// How to address an entity for a point lookup.
#[derive(Debug, Clone, Copy)]
pub enum EntityKey {
    /// Primary-index lookup by ledger row id
    Id(i64),
    /// Secondary-index lookup by content fingerprint
    Fingerprint(u64),
}

/// Read-side lookups and parent resolve-or-create over `reputables`.
pub struct EntityResolver {
    ledger: Arc<dyn Ledger>,
    config: ReputeConfig,
}

impl EntityResolver {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self::with_config(ledger, ReputeConfig::default())
    }

    pub fn with_config(ledger: Arc<dyn Ledger>, config: ReputeConfig) -> Self {
        Self { ledger, config }
    }

    /// Point lookup. Absent rows and store failures both come back as
    /// `None`; the caller decides whether to create.
    pub async fn get_entity(&self, key: EntityKey) -> Option<Reputable> {
        let query = match key {
            EntityKey::Id(id) => {
                if id < 0 {
                    return None;
                }
                ReadQuery::new(Table::Reputables)
                    .index(id as u64)
                    .index_position(1)
                    .first_only()
            }
            EntityKey::Fingerprint(fp) => ReadQuery::new(Table::Reputables)
                .index(fp)
                .index_position(2)
                .key_type("i64")
                .first_only(),
        };

        let rows = match self.ledger.read(query).await {
            Ok(rows) => rows,
            Err(error) => {
                debug!(?key, %error, "entity lookup failed, treating as not found");
                return None;
            }
        };
        rows.into_iter()
            .next()
            .and_then(|row| serde_json::from_value(row).ok())
    }

    /// Lookup by composed key, scoped under a parent id. Parent scope is
    /// part of the key: the same `(type, name)` under a different parent
    /// does not match.
    pub async fn search_by_fingerprint(
        &self,
        entity_type: EntityType,
        name: &str,
        network: &str,
        parent_id: i64,
    ) -> Option<Reputable> {
        let fp = fingerprint(&compose(entity_type.as_str(), name, network));
        let query = ReadQuery::new(Table::Reputables)
            .scope(parent_id as u64)
            .index(fp)
            .index_position(2)
            .key_type("i64")
            .first_only();

        let rows = match self.ledger.read(query).await {
            Ok(rows) => rows,
            Err(error) => {
                debug!(fingerprint = fp, parent_id, %error, "fingerprint search failed, treating as not found");
                return None;
            }
        };
        rows.into_iter()
            .next()
            .and_then(|row| serde_json::from_value(row).ok())
    }

    /// User-facing name search across all entity types, bounded. Matches
    /// name equality or prefix, case-sensitive.
    pub async fn search_for_entity(&self, name: &str) -> Vec<Reputable> {
        let query = ReadQuery::new(Table::Reputables)
            .limit(self.config.entity_search_limit)
            .rows_only();

        let rows = match self.ledger.read(query).await {
            Ok(rows) => rows,
            Err(error) => {
                debug!(name, %error, "entity search failed, returning empty result");
                return Vec::new();
            }
        };
        rows.into_iter()
            .filter_map(|row| serde_json::from_value::<Reputable>(row).ok())
            .filter(|entity| entity.name.starts_with(name))
            .collect()
    }

    /// Follow an entity's weak parent link.
    pub async fn parent_of(&self, entity: &Reputable) -> Option<Reputable> {
        let link = entity.parent.as_ref()?;
        self.get_entity(EntityKey::Id(link.id)).await
    }

    /// Resolve the parent named by a `ParentSpec`, creating it on the
    /// ledger when it does not exist yet.
    ///
    /// Idempotent: re-resolving an existing parent never creates a
    /// duplicate. Sequential by contract: the returned parent carries a
    /// valid id before any child mutation referencing it is submitted.
    pub async fn resolve_or_create_parent(
        &self,
        username: &str,
        spec: &ParentSpec,
    ) -> Result<Option<Reputable>> {
        match spec {
            ParentSpec::None => Ok(None),
            ParentSpec::Existing(id) => match self.get_entity(EntityKey::Id(*id)).await {
                Some(parent) => Ok(Some(parent)),
                None => Err(ReputeError::NotFound(format!("parent entity {id}"))),
            },
            ParentSpec::Placeholder(placeholder) => {
                if placeholder.is_resolved() {
                    return match self.get_entity(EntityKey::Id(placeholder.id)).await {
                        Some(parent) => Ok(Some(parent)),
                        None => Err(ReputeError::NotFound(format!(
                            "parent entity {}",
                            placeholder.id
                        ))),
                    };
                }
                match self
                    .get_entity(EntityKey::Fingerprint(placeholder.fingerprint))
                    .await
                {
                    Some(parent) => Ok(Some(parent)),
                    None => self
                        .create_parent(
                            username,
                            placeholder.entity_type,
                            &placeholder.name,
                            &placeholder.network,
                        )
                        .await
                        .map(Some),
                }
            }
            ParentSpec::Raw(raw) => {
                let (entity_type, name) = split_raw_parent(raw)?;
                match self
                    .search_by_fingerprint(entity_type, &name, "", 0)
                    .await
                {
                    Some(parent) => Ok(Some(parent)),
                    None => self
                        .create_parent(username, entity_type, &name, "")
                        .await
                        .map(Some),
                }
            }
        }
    }

    /// Submit an empty-fragment repute to create a top-level entity, then
    /// read it back. Fails hard: a child may never reference a parent that
    /// does not exist, even transiently.
    async fn create_parent(
        &self,
        username: &str,
        entity_type: EntityType,
        name: &str,
        network: &str,
    ) -> Result<Reputable> {
        info!(%entity_type, name, "auto-creating parent entity");
        let intent = ReputeIntent {
            username: username.to_string(),
            entity_type,
            name: name.to_string(),
            network: network.to_string(),
            fragments: Vec::new(),
            base_id: 0,
            details: String::new(),
        };
        let id = self.ledger.repute(intent).await?;
        self.get_entity(EntityKey::Id(id)).await.ok_or_else(|| {
            ReputeError::Ledger(format!("created parent {id} is not readable"))
        })
    }
}

/// Split a raw `"type::name"` parent string into its components.
fn split_raw_parent(raw: &str) -> Result<(EntityType, String)> {
    let (type_part, name) = raw.split_once(DELIMITER).ok_or_else(|| {
        ReputeError::Validation(format!("parent string missing '{DELIMITER}': {raw:?}"))
    })?;
    if name.is_empty() {
        return Err(ReputeError::Validation(format!(
            "parent string has empty name: {raw:?}"
        )));
    }
    Ok((type_part.parse()?, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::types::Fragment;

    fn ledger() -> Arc<MemoryLedger> {
        Arc::new(MemoryLedger::new())
    }

    async fn seed_entity(ledger: &MemoryLedger, entity_type: EntityType, name: &str) -> i64 {
        ledger
            .repute(ReputeIntent {
                username: "tester".into(),
                entity_type,
                name: name.into(),
                network: String::new(),
                fragments: vec![Fragment {
                    frag_type: "trust".into(),
                    quantity: 1.0,
                }],
                base_id: 0,
                details: String::new(),
            })
            .await
            .unwrap()
    }

    #[test]
    fn splits_raw_parent_strings() {
        let (entity_type, name) = split_raw_parent("acc::eosio.token").unwrap();
        assert_eq!(entity_type, EntityType::BlockchainAddress);
        assert_eq!(name, "eosio.token");

        assert!(split_raw_parent("eosio.token").is_err());
        assert!(split_raw_parent("acc::").is_err());
        assert!(split_raw_parent("bogus::name").is_err());
    }

    #[tokio::test]
    async fn get_entity_by_id_and_fingerprint() {
        let ledger = ledger();
        let id = seed_entity(&ledger, EntityType::Application, "domain.com").await;
        let resolver = EntityResolver::new(ledger);

        let by_id = resolver.get_entity(EntityKey::Id(id)).await.unwrap();
        assert_eq!(by_id.name, "domain.com");

        let fp = fingerprint("app::domain.com");
        let by_fp = resolver.get_entity(EntityKey::Fingerprint(fp)).await.unwrap();
        assert_eq!(by_fp.id, id);

        assert!(resolver.get_entity(EntityKey::Id(999)).await.is_none());
        assert!(resolver.get_entity(EntityKey::Id(-1)).await.is_none());
    }

    #[tokio::test]
    async fn raw_parent_resolution_is_idempotent() {
        let ledger = ledger();
        let resolver = EntityResolver::new(ledger.clone());
        let spec = ParentSpec::Raw("acc::eosio.token".into());

        let first = resolver
            .resolve_or_create_parent("tester", &spec)
            .await
            .unwrap()
            .unwrap();
        let second = resolver
            .resolve_or_create_parent("tester", &spec)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(ledger.entity_count().await, 1);
    }

    #[tokio::test]
    async fn placeholder_parent_resolves_or_creates() {
        let ledger = ledger();
        let resolver = EntityResolver::new(ledger.clone());

        let placeholder = Reputable::new(EntityType::BlockchainAddress, "scatterfunds", "");
        let created = resolver
            .resolve_or_create_parent("tester", &ParentSpec::Placeholder(placeholder.clone()))
            .await
            .unwrap()
            .unwrap();
        assert!(created.is_resolved());

        // second resolution finds the row instead of creating another
        let resolved = resolver
            .resolve_or_create_parent("tester", &ParentSpec::Placeholder(placeholder))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, created.id);
        assert_eq!(ledger.entity_count().await, 1);
    }

    #[tokio::test]
    async fn missing_existing_parent_is_an_error() {
        let resolver = EntityResolver::new(ledger());
        let result = resolver
            .resolve_or_create_parent("tester", &ParentSpec::Existing(42))
            .await;
        assert!(matches!(result, Err(ReputeError::NotFound(_))));
    }

    #[tokio::test]
    async fn parent_scope_is_part_of_the_lookup_key() {
        let ledger = ledger();
        let parent_id = seed_entity(&ledger, EntityType::BlockchainAddress, "eosio.token").await;
        ledger
            .repute(ReputeIntent {
                username: "tester".into(),
                entity_type: EntityType::Action,
                name: "transfer".into(),
                network: String::new(),
                fragments: vec![],
                base_id: parent_id,
                details: String::new(),
            })
            .await
            .unwrap();

        let resolver = EntityResolver::new(ledger);
        let under_parent = resolver
            .search_by_fingerprint(EntityType::Action, "transfer", "", parent_id)
            .await;
        assert!(under_parent.is_some());
        assert_eq!(under_parent.unwrap().parent.unwrap().id, parent_id);

        // same (type, name) under the wrong parent does not match
        let wrong_scope = resolver
            .search_by_fingerprint(EntityType::Action, "transfer", "", 0)
            .await;
        assert!(wrong_scope.is_none());
    }

    #[tokio::test]
    async fn searches_by_name_prefix() {
        let ledger = ledger();
        seed_entity(&ledger, EntityType::Application, "get-scatter.com").await;
        seed_entity(&ledger, EntityType::Application, "gets-scatter.com").await;
        seed_entity(&ledger, EntityType::Application, "telosfoundation.io").await;

        let resolver = EntityResolver::new(ledger);
        let hits = resolver.search_for_entity("get").await;
        assert_eq!(hits.len(), 2);
        let exact = resolver.search_for_entity("telosfoundation.io").await;
        assert_eq!(exact.len(), 1);
        assert!(resolver.search_for_entity("nothing").await.is_empty());
    }
}
