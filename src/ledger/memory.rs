//! In-memory ledger for tests and local development.
//!
//! Implements the contract semantics the core depends on: entity
//! auto-creation scoped under a base id, tally and running-total
//! accumulation as asset strings, and `last_repute_time` updates. Backed by
//! plain maps behind an async lock; no persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Ledger, ReadQuery, ReputeIntent, Table};
use crate::asset::{format_amount, parse_amount};
use crate::error::{ReputeError, Result};
use crate::fingerprint::{compose, fingerprint};
use crate::types::{FragTotal, ParentLink, RepType, Reputable, ReputationRow, TallyRow};

#[derive(Default)]
struct State {
    reputables: Vec<Reputable>,
    /// Keyed by entity fingerprint
    reputations: HashMap<u64, ReputationRow>,
    reptypes: Vec<RepType>,
    /// Keyed by fragment-type fingerprint
    fragtotals: HashMap<u64, FragTotal>,
    /// Recorded `votetype` submissions, (username, type)
    type_votes: Vec<(String, String)>,
    next_id: i64,
}

/// In-memory `Ledger` with contract semantics.
pub struct MemoryLedger {
    state: RwLock<State>,
    symbol: String,
    /// Fixed clock for deterministic tests, epoch seconds
    fixed_time: Option<i64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_id: 1,
                ..State::default()
            }),
            symbol: "RIDL".to_string(),
            fixed_time: None,
        }
    }

    /// Use a different asset symbol for stored quantities.
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    /// Pin the ledger clock to a fixed epoch-seconds value.
    pub fn with_time(mut self, epoch_seconds: i64) -> Self {
        self.fixed_time = Some(epoch_seconds);
        self
    }

    /// Seed a global fragment-type definition.
    pub async fn register_type(&self, frag_type: &str) {
        self.register_based_type(frag_type, 0).await;
    }

    /// Seed a fragment-type definition scoped to a base entity fingerprint.
    pub async fn register_based_type(&self, frag_type: &str, base: u64) {
        let mut state = self.state.write().await;
        state.reptypes.push(RepType {
            frag_type: frag_type.to_string(),
            fingerprint: fingerprint(frag_type),
            base,
            is_based: false,
        });
    }

    /// Recorded `votetype` submissions, oldest first.
    pub async fn type_votes(&self) -> Vec<(String, String)> {
        self.state.read().await.type_votes.clone()
    }

    /// Number of stored reputable entities.
    pub async fn entity_count(&self) -> usize {
        self.state.read().await.reputables.len()
    }

    fn now(&self) -> i64 {
        self.fixed_time.unwrap_or_else(|| Utc::now().timestamp())
    }

    fn add_to(&self, asset: &str, delta: f64) -> String {
        let current = parse_amount(asset).unwrap_or(0.0);
        format_amount(current + delta, &self.symbol)
    }

    fn zero_asset(&self) -> String {
        format_amount(0.0, &self.symbol)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn read(&self, query: ReadQuery) -> Result<Vec<serde_json::Value>> {
        let state = self.state.read().await;

        let rows: Vec<serde_json::Value> = match query.table {
            Table::Reputables => state
                .reputables
                .iter()
                .filter(|entity| match (query.index, query.index_position) {
                    // primary index is the row id
                    (Some(index), Some(1)) | (Some(index), None) => entity.id == index as i64,
                    // secondary index is the fingerprint
                    (Some(index), _) => entity.fingerprint == index,
                    (None, _) => true,
                })
                .filter(|entity| match query.scope {
                    // reputables are scoped under their parent id, 0 = top-level
                    Some(scope) => {
                        entity.parent.map(|p| p.id).unwrap_or(0) == scope as i64
                    }
                    None => true,
                })
                .map(|entity| serde_json::to_value(entity).map_err(ReputeError::from))
                .collect::<Result<_>>()?,
            Table::Reputations => match query.scope {
                Some(scope) => state
                    .reputations
                    .get(&scope)
                    .map(|row| serde_json::to_value(row).map_err(ReputeError::from))
                    .transpose()?
                    .into_iter()
                    .collect(),
                None => Vec::new(),
            },
            Table::RepTypes => state
                .reptypes
                .iter()
                .filter(|t| query.index.map(|base| t.base == base).unwrap_or(true))
                .map(|t| serde_json::to_value(t).map_err(ReputeError::from))
                .collect::<Result<_>>()?,
            Table::FragTotal => match query.scope {
                Some(scope) => state
                    .fragtotals
                    .get(&scope)
                    .map(|row| serde_json::to_value(row).map_err(ReputeError::from))
                    .transpose()?
                    .into_iter()
                    .collect(),
                None => Vec::new(),
            },
        };

        let cap = if query.first_only { 1 } else { query.limit as usize };
        Ok(rows.into_iter().take(cap).collect())
    }

    async fn repute(&self, intent: ReputeIntent) -> Result<i64> {
        let now = self.now();
        let mut state = self.state.write().await;

        let key = compose(intent.entity_type.as_str(), &intent.name, &intent.network);
        let entity_fp = fingerprint(&key);

        let parent = if intent.base_id != 0 {
            let base = state
                .reputables
                .iter()
                .find(|e| e.id == intent.base_id)
                .ok_or_else(|| {
                    ReputeError::Ledger(format!("unknown base entity: {}", intent.base_id))
                })?;
            Some(ParentLink {
                id: base.id,
                fingerprint: base.fingerprint,
            })
        } else {
            None
        };

        // resolve-or-create, scoped under the base id
        let position = state.reputables.iter().position(|e| {
            e.fingerprint == entity_fp && e.parent.map(|p| p.id).unwrap_or(0) == intent.base_id
        });
        let position = match position {
            Some(position) => position,
            None => {
                let id = state.next_id;
                state.next_id += 1;
                debug!(id, key = %key, base_id = intent.base_id, "creating reputable");
                state.reputables.push(Reputable {
                    id,
                    fingerprint: entity_fp,
                    entity_type: intent.entity_type,
                    name: intent.name.clone(),
                    network: intent.network.clone(),
                    parent,
                    last_repute_time: now,
                    reputation: None,
                });
                state.reputables.len() - 1
            }
        };
        state.reputables[position].last_repute_time = now;
        let entity_id = state.reputables[position].id;

        for fragment in &intent.fragments {
            let type_fp = fingerprint(&fragment.frag_type);
            let (up, down) = if fragment.quantity > 0.0 {
                (fragment.quantity, 0.0)
            } else {
                (0.0, -fragment.quantity)
            };

            let zero = self.zero_asset();
            let total = state
                .fragtotals
                .entry(type_fp)
                .or_insert_with(|| FragTotal {
                    frag_type: fragment.frag_type.clone(),
                    fingerprint: type_fp,
                    up: zero.clone(),
                    down: zero.clone(),
                });
            total.up = self.add_to(&total.up, up);
            total.down = self.add_to(&total.down, down);

            let row = state
                .reputations
                .entry(entity_fp)
                .or_insert_with(|| ReputationRow {
                    fingerprint: entity_fp,
                    fragments: Vec::new(),
                    last_repute_time: now,
                });
            row.last_repute_time = now;
            let slot = match row
                .fragments
                .iter()
                .position(|t| t.frag_type == fragment.frag_type)
            {
                Some(slot) => slot,
                None => {
                    row.fragments.push(TallyRow {
                        frag_type: fragment.frag_type.clone(),
                        up: zero.clone(),
                        down: zero,
                    });
                    row.fragments.len() - 1
                }
            };
            let tally = &mut row.fragments[slot];
            tally.up = self.add_to(&tally.up, up);
            tally.down = self.add_to(&tally.down, down);
        }

        Ok(entity_id)
    }

    async fn votetype(&self, username: &str, frag_type: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .type_votes
            .push((username.to_string(), frag_type.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityType, Fragment};

    fn intent(name: &str, base_id: i64, fragments: Vec<Fragment>) -> ReputeIntent {
        ReputeIntent {
            username: "tester".into(),
            entity_type: EntityType::Application,
            name: name.into(),
            network: String::new(),
            fragments,
            base_id,
            details: String::new(),
        }
    }

    fn trust(quantity: f64) -> Fragment {
        Fragment {
            frag_type: "trust".into(),
            quantity,
        }
    }

    #[tokio::test]
    async fn repute_creates_entity_once() {
        let ledger = MemoryLedger::new();
        let first = ledger.repute(intent("domain.com", 0, vec![trust(1.0)])).await.unwrap();
        let second = ledger.repute(intent("domain.com", 0, vec![trust(0.5)])).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger.entity_count().await, 1);
    }

    #[tokio::test]
    async fn repute_accumulates_tallies_and_totals() {
        let ledger = MemoryLedger::new();
        ledger
            .repute(intent("domain.com", 0, vec![trust(1.0), trust(-0.25)]))
            .await
            .unwrap();

        let scope = fingerprint("app::domain.com");
        let rows = ledger
            .read(ReadQuery::new(Table::Reputations).scope(scope).first_only())
            .await
            .unwrap();
        let row: ReputationRow = serde_json::from_value(rows[0].clone()).unwrap();
        assert_eq!(row.fragments.len(), 1);
        assert_eq!(row.fragments[0].up, "1.0000 RIDL");
        assert_eq!(row.fragments[0].down, "0.2500 RIDL");

        let totals = ledger
            .read(
                ReadQuery::new(Table::FragTotal)
                    .scope(fingerprint("trust"))
                    .first_only(),
            )
            .await
            .unwrap();
        let total: FragTotal = serde_json::from_value(totals[0].clone()).unwrap();
        assert_eq!(total.up, "1.0000 RIDL");
        assert_eq!(total.down, "0.2500 RIDL");
    }

    #[tokio::test]
    async fn same_name_under_different_parents_is_two_rows() {
        let ledger = MemoryLedger::new();
        let mut parent_intent = intent("eosio.token", 0, vec![trust(1.0)]);
        parent_intent.entity_type = EntityType::BlockchainAddress;
        let parent_id = ledger.repute(parent_intent).await.unwrap();

        let mut child = intent("transfer", parent_id, vec![trust(1.0)]);
        child.entity_type = EntityType::Action;
        let child_id = ledger.repute(child).await.unwrap();

        let mut top_level = intent("transfer", 0, vec![trust(1.0)]);
        top_level.entity_type = EntityType::Action;
        let top_id = ledger.repute(top_level).await.unwrap();

        assert_ne!(child_id, top_id);
        assert_eq!(ledger.entity_count().await, 3);
    }

    #[tokio::test]
    async fn repute_rejects_unknown_base() {
        let ledger = MemoryLedger::new();
        let result = ledger.repute(intent("orphan", 99, vec![trust(1.0)])).await;
        assert!(matches!(result, Err(ReputeError::Ledger(_))));
    }

    #[tokio::test]
    async fn votetype_is_recorded() {
        let ledger = MemoryLedger::new();
        ledger.votetype("tester", "solvency").await.unwrap();
        assert_eq!(ledger.type_votes().await, vec![("tester".into(), "solvency".into())]);
    }
}
