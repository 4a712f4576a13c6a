//! Ledger collaborator interface.
//!
//! The core treats the surrounding ledger as an abstract keyed-table
//! read/write service: a `read` over four known tables plus two
//! state-changing contract submissions. Transport, signing and retry policy
//! live behind this trait, outside the crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{EntityType, Fragment};

pub mod memory;

pub use memory::MemoryLedger;

/// Tables the core reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Reputables,
    Reputations,
    RepTypes,
    FragTotal,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Reputables => "reputables",
            Table::Reputations => "reputations",
            Table::RepTypes => "reptypes",
            Table::FragTotal => "fragtotal",
        }
    }
}

/// A keyed-table read request.
///
/// Built with the setter methods; `limit` defaults to 1.
#[derive(Debug, Clone)]
pub struct ReadQuery {
    pub table: Table,
    /// Row scope (e.g. entity fingerprint for `reputations`)
    pub scope: Option<u64>,
    /// Secondary-index value to match
    pub index: Option<u64>,
    /// Which index to match against: 1 = primary id, 2 = first secondary
    pub index_position: Option<u32>,
    /// Index key type, e.g. `"i64"`
    pub key_type: Option<String>,
    pub limit: u32,
    /// Return at most the first matching row
    pub first_only: bool,
    /// Strip response envelope, rows only
    pub rows_only: bool,
}

impl ReadQuery {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            scope: None,
            index: None,
            index_position: None,
            key_type: None,
            limit: 1,
            first_only: false,
            rows_only: false,
        }
    }

    pub fn scope(mut self, scope: u64) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn index_position(mut self, position: u32) -> Self {
        self.index_position = Some(position);
        self
    }

    pub fn key_type(mut self, key_type: impl Into<String>) -> Self {
        self.key_type = Some(key_type.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn first_only(mut self) -> Self {
        self.first_only = true;
        self.limit = 1;
        self
    }

    pub fn rows_only(mut self) -> Self {
        self.rows_only = true;
        self
    }
}

/// A validated `repute` submission.
///
/// Carries the entity key components rather than a composed string so the
/// contract can fingerprint and scope the row itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputeIntent {
    pub username: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub network: String,
    pub fragments: Vec<Fragment>,
    /// Resolved parent id, `0` for top-level entities
    pub base_id: i64,
    /// Free-text memo, passed through untouched
    #[serde(default)]
    pub details: String,
}

/// Abstract ledger the core reads from and submits to.
///
/// Reads are fail-soft at the call sites above this trait; writes surface
/// errors as-is since a mutation's outcome must be unambiguous.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Read up to `query.limit` rows from a table.
    async fn read(&self, query: ReadQuery) -> Result<Vec<serde_json::Value>>;

    /// Submit a repute transaction. Returns the id of the target entity,
    /// creating it (scoped under `base_id`) if it does not exist.
    async fn repute(&self, intent: ReputeIntent) -> Result<i64>;

    /// Submit a fragment-type registration vote.
    async fn votetype(&self, username: &str, frag_type: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder_defaults() {
        let query = ReadQuery::new(Table::RepTypes)
            .index(0)
            .index_position(2)
            .key_type("i64")
            .limit(100)
            .rows_only();

        assert_eq!(query.table.as_str(), "reptypes");
        assert_eq!(query.index, Some(0));
        assert_eq!(query.limit, 100);
        assert!(!query.first_only);
        assert!(query.rows_only);
    }

    #[test]
    fn first_only_caps_limit() {
        let query = ReadQuery::new(Table::Reputations).scope(42).limit(10).first_only();
        assert_eq!(query.limit, 1);
        assert!(query.first_only);
    }
}
