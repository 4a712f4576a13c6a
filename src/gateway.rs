//! Mutation gateway.
//!
//! Validates `repute` and `votetype` intents and submits them to the
//! ledger. Validation failures are raised before any network call; parent
//! resolution happens sequentially before the child submission; write
//! failures surface as-is since a mutation's outcome must be unambiguous.

use std::sync::Arc;

use tracing::info;

use crate::config::ReputeConfig;
use crate::error::{ReputeError, Result};
use crate::fingerprint::{compose, fingerprint, DELIMITER};
use crate::ledger::{Ledger, ReputeIntent};
use crate::registry::FragTypeRegistry;
use crate::resolver::EntityResolver;
use crate::types::{EntityType, Fragment, ParentSpec};

/// Options for a `repute` submission.
#[derive(Debug, Clone, Default)]
pub struct ReputeOptions {
    /// Optional chain/namespace qualifier, empty when global
    pub network: String,
    /// How the parent entity is named, if any
    pub parent: ParentSpec,
    /// Free-text memo, passed through untouched
    pub details: String,
}

/// Validates and submits state-changing intents.
pub struct MutationGateway {
    ledger: Arc<dyn Ledger>,
    resolver: EntityResolver,
    registry: FragTypeRegistry,
}

impl MutationGateway {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self::with_config(ledger, ReputeConfig::default())
    }

    pub fn with_config(ledger: Arc<dyn Ledger>, config: ReputeConfig) -> Self {
        Self {
            resolver: EntityResolver::with_config(ledger.clone(), config.clone()),
            registry: FragTypeRegistry::with_config(ledger.clone(), config),
            ledger,
        }
    }

    /// Submit votes against an entity, resolving or creating its parent
    /// first. Returns the ledger id of the reputed entity.
    pub async fn repute(
        &self,
        username: &str,
        entity_type: EntityType,
        name: &str,
        fragments: &[Fragment],
        options: ReputeOptions,
    ) -> Result<i64> {
        validate_inputs(username, name, fragments, &options.network)?;

        // parent must exist before the child mutation is submitted
        let parent = self
            .resolver
            .resolve_or_create_parent(username, &options.parent)
            .await?;

        let key = compose(entity_type.as_str(), name, &options.network);
        let child_fp = fingerprint(&key);
        if let Some(parent) = &parent {
            if parent.fingerprint == child_fp {
                return Err(ReputeError::Validation(format!(
                    "entity cannot be its own parent: {key}"
                )));
            }
        }

        // every fragment must be a known type for the resolved base
        let known = self.registry.fragment_types_for(parent.as_ref()).await;
        for fragment in fragments {
            if !known.iter().any(|t| t.frag_type == fragment.frag_type) {
                return Err(ReputeError::Validation(format!(
                    "unknown fragment type: {}",
                    fragment.frag_type
                )));
            }
        }

        let base_id = parent.map(|p| p.id).unwrap_or(0);
        let intent = ReputeIntent {
            username: username.to_string(),
            entity_type,
            name: name.to_string(),
            network: options.network,
            fragments: fragments.to_vec(),
            base_id,
            details: options.details,
        };
        info!(username, entity = %key, base_id, fragments = fragments.len(), "submitting repute");
        self.ledger.repute(intent).await
    }

    /// Submit a fragment-type registration vote. Pass-through beyond
    /// non-empty arguments.
    pub async fn votetype(&self, username: &str, frag_type: &str) -> Result<()> {
        if username.trim().is_empty() {
            return Err(ReputeError::Validation("username must not be empty".into()));
        }
        if frag_type.trim().is_empty() {
            return Err(ReputeError::Validation("fragment type must not be empty".into()));
        }
        info!(username, frag_type, "submitting votetype");
        self.ledger.votetype(username, frag_type).await
    }
}

/// Synchronous input checks, raised before any I/O.
fn validate_inputs(
    username: &str,
    name: &str,
    fragments: &[Fragment],
    network: &str,
) -> Result<()> {
    if username.trim().is_empty() {
        return Err(ReputeError::Validation("username must not be empty".into()));
    }
    if name.trim().is_empty() {
        return Err(ReputeError::Validation("entity name must not be empty".into()));
    }
    if name.contains(DELIMITER) {
        return Err(ReputeError::Validation(format!(
            "entity name must not contain '{DELIMITER}': {name:?}"
        )));
    }
    if network.chars().any(char::is_whitespace) {
        return Err(ReputeError::Validation(format!(
            "network must not contain whitespace: {network:?}"
        )));
    }
    if fragments.is_empty() {
        return Err(ReputeError::Validation(
            "at least one fragment is required".into(),
        ));
    }
    for fragment in fragments {
        if fragment.frag_type.trim().is_empty() {
            return Err(ReputeError::Validation("fragment type must not be empty".into()));
        }
        if fragment.quantity == 0.0 || !fragment.quantity.is_finite() {
            return Err(ReputeError::Validation(format!(
                "fragment quantity must be non-zero and finite: {} = {}",
                fragment.frag_type, fragment.quantity
            )));
        }
    }
    Ok(())
}
