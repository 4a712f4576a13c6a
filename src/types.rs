//! Core data model.
//!
//! Entities under reputation (`Reputable`), vote contributions (`Fragment`),
//! vote-category definitions (`RepType`), running per-type totals
//! (`FragTotal`) and the computed per-entity `Reputation` view. Rows travel
//! to and from the ledger as JSON and are deserialized at the call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ReputeError;
use crate::fingerprint::{compose, fingerprint};

/// Category discriminator for reputable entities.
///
/// Serialized with the short table keys the ledger rows use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// A blockchain account or address (`acc`)
    #[serde(rename = "acc")]
    BlockchainAddress,
    /// A contract action (`act`)
    #[serde(rename = "act")]
    Action,
    /// An application or domain (`app`)
    #[serde(rename = "app")]
    Application,
    /// Anything else (`etc`)
    #[serde(rename = "etc")]
    Other,
}

impl EntityType {
    /// The short key used in composed entity keys and ledger rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::BlockchainAddress => "acc",
            EntityType::Action => "act",
            EntityType::Application => "app",
            EntityType::Other => "etc",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ReputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acc" => Ok(EntityType::BlockchainAddress),
            "act" => Ok(EntityType::Action),
            "app" => Ok(EntityType::Application),
            "etc" => Ok(EntityType::Other),
            other => Err(ReputeError::Validation(format!(
                "unknown entity type: {other:?}"
            ))),
        }
    }
}

/// Weak reference to a parent entity.
///
/// Resolved lazily by id; never an owning pointer, so parent chains cannot
/// form reference cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub id: i64,
    pub fingerprint: u64,
}

/// An entity under reputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reputable {
    /// Ledger-assigned row id, `-1` while unresolved
    pub id: i64,
    /// Content hash of `type::name[::network]`
    pub fingerprint: u64,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    /// Optional chain/namespace qualifier, empty when global
    #[serde(default)]
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentLink>,
    /// Epoch seconds of the most recent repute against this entity
    #[serde(default)]
    pub last_repute_time: i64,
    /// Computed view attached by the aggregator, never read from the ledger
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub reputation: Option<Reputation>,
}

impl Reputable {
    /// Build an unresolved entity from its key components.
    pub fn new(entity_type: EntityType, name: impl Into<String>, network: impl Into<String>) -> Self {
        let name = name.into();
        let network = network.into();
        let key = compose(entity_type.as_str(), &name, &network);
        Self {
            id: -1,
            fingerprint: fingerprint(&key),
            entity_type,
            name,
            network,
            parent: None,
            last_repute_time: 0,
            reputation: None,
        }
    }

    /// The canonical `type::name[::network]` key this entity hashes under.
    pub fn key(&self) -> String {
        compose(self.entity_type.as_str(), &self.name, &self.network)
    }

    /// Whether the entity has been assigned a ledger id.
    pub fn is_resolved(&self) -> bool {
        self.id >= 0
    }
}

/// One vote contribution toward an entity.
///
/// Positive quantity is an up-vote, negative a down-vote; zero is invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(rename = "type")]
    pub frag_type: String,
    pub quantity: f64,
}

/// A fragment-type definition from the `reptypes` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepType {
    #[serde(rename = "type")]
    pub frag_type: String,
    pub fingerprint: u64,
    /// `0` for global types, else the fingerprint of the base entity
    pub base: u64,
    /// Set by the caller-facing merge, not stored on the ledger
    #[serde(default)]
    pub is_based: bool,
}

impl RepType {
    /// Build a fragment of this type with the given signed quantity.
    pub fn to_fragment(&self, quantity: f64) -> Fragment {
        Fragment {
            frag_type: self.frag_type.clone(),
            quantity,
        }
    }
}

/// Global running totals for one fragment type, as asset strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragTotal {
    #[serde(rename = "type")]
    pub frag_type: String,
    pub fingerprint: u64,
    /// Sum of positive contributions, e.g. `"12.3400 RIDL"`
    pub up: String,
    /// Sum of magnitudes of negative contributions
    pub down: String,
}

/// One per-type tally as stored on a `reputations` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyRow {
    #[serde(rename = "type")]
    pub frag_type: String,
    pub up: String,
    pub down: String,
}

/// A `reputations` row, scoped under the entity fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationRow {
    pub fingerprint: u64,
    #[serde(default)]
    pub fragments: Vec<TallyRow>,
    #[serde(default)]
    pub last_repute_time: i64,
}

/// A per-type tally enriched with computed scores.
#[derive(Debug, Clone, Serialize)]
pub struct FragmentTally {
    #[serde(rename = "type")]
    pub frag_type: String,
    pub fingerprint: u64,
    pub up: String,
    pub down: String,
    /// Normalized share-of-totals score in `[-1, 1]`, 4 decimals
    pub reputation: f64,
    /// `reputation` after time decay, same sign, at least half the magnitude
    pub time_scaled_reputation: f64,
}

/// Computed per-entity aggregate.
///
/// Constructed fresh on every aggregation call and attached to the entity
/// for the duration of one response; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Reputation {
    pub fragments: Vec<FragmentTally>,
    /// Sum of the time-scaled per-fragment scores, 4 decimals
    pub total_reputation: f64,
    pub last_repute_time: i64,
}

impl Reputation {
    /// The zero-valued reputation of an entity with no tallies yet.
    pub fn zero() -> Self {
        Self {
            fragments: Vec::new(),
            total_reputation: 0.0,
            last_repute_time: 0,
        }
    }
}

/// How a caller names the parent of a repute target.
///
/// Consumed by a single resolution routine instead of branching on runtime
/// shape.
#[derive(Debug, Clone, Default)]
pub enum ParentSpec {
    /// Top-level entity, no parent
    #[default]
    None,
    /// An already-resolved parent with a valid ledger id
    Existing(i64),
    /// A resolved `Reputable` placeholder with `id = -1`, matched by fingerprint
    Placeholder(Reputable),
    /// A raw `"type::name"` string, resolved or auto-created before the child
    Raw(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    #[test]
    fn entity_type_round_trips() {
        for key in ["acc", "act", "app", "etc"] {
            assert_eq!(key.parse::<EntityType>().unwrap().as_str(), key);
        }
        assert!("bogus".parse::<EntityType>().is_err());
    }

    #[test]
    fn reputable_fingerprints_its_key() {
        let entity = Reputable::new(EntityType::Application, "domain.com", "");
        assert_eq!(entity.id, -1);
        assert!(!entity.is_resolved());
        assert_eq!(entity.key(), "app::domain.com");
        assert_eq!(entity.fingerprint, fingerprint("app::domain.com"));

        let chained = Reputable::new(EntityType::BlockchainAddress, "eosio.system", "eos");
        assert_eq!(chained.key(), "acc::eosio.system::eos");
    }

    #[test]
    fn rep_type_builds_fragments() {
        let rep_type = RepType {
            frag_type: "trust".into(),
            fingerprint: fingerprint("trust"),
            base: 0,
            is_based: false,
        };
        let frag = rep_type.to_fragment(-0.5);
        assert_eq!(frag.frag_type, "trust");
        assert_eq!(frag.quantity, -0.5);
    }

    #[test]
    fn reputable_row_round_trips_as_json() {
        let mut entity = Reputable::new(EntityType::Action, "transfer", "");
        entity.id = 4;
        entity.parent = Some(ParentLink {
            id: 2,
            fingerprint: fingerprint("acc::eosio.token"),
        });

        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["type"], "act");
        let back: Reputable = serde_json::from_value(value).unwrap();
        assert_eq!(back.id, 4);
        assert_eq!(back.parent.unwrap().id, 2);
        assert!(back.reputation.is_none());
    }
}
