//! Batch reputation scoring.
//!
//! Fetches per-entity tallies and per-type global totals, normalizes each
//! tally into a share-of-totals score in `[-1, 1]`, applies the asymmetric
//! time-decay clamp, and attaches the resulting `Reputation` view to every
//! entity in the batch. Totals are deduplicated through a cache constructed
//! fresh for each top-level call, so concurrent batches never observe each
//! other's entries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::asset::parse_amount;
use crate::config::ReputeConfig;
use crate::error::{ReputeError, Result};
use crate::fingerprint::fingerprint;
use crate::ledger::{Ledger, ReadQuery, Table};
use crate::types::{FragTotal, FragmentTally, Reputable, Reputation, ReputationRow};

/// Divisor turning elapsed seconds into decay units; roughly 3.17 years
/// per whole unit.
const TIME_DECAY_DIVISOR: f64 = 100_000_000.0;

/// Per-batch cache of fragment-type totals, keyed by type fingerprint.
///
/// Owned by one `attach_reputation` call; it deduplicates reads within a
/// batch, not across calls, so slightly-stale totals between calls are
/// acceptable.
struct TotalsCache {
    totals: HashMap<u64, FragTotal>,
}

impl TotalsCache {
    fn new() -> Self {
        Self {
            totals: HashMap::new(),
        }
    }

    /// Fetch every type fingerprint not already cached, concurrently and at
    /// most once each. A failed or absent row simply stays out of the cache
    /// and later contributes zero.
    async fn populate(
        &mut self,
        ledger: &dyn Ledger,
        needed: HashSet<u64>,
        concurrency: usize,
    ) {
        let missing: Vec<u64> = needed
            .into_iter()
            .filter(|fp| {
                let hit = self.totals.contains_key(fp);
                if hit {
                    debug!(fingerprint = fp, "fragment total cache hit");
                }
                !hit
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let fetches = missing.into_iter().map(|fp| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                let query = ReadQuery::new(Table::FragTotal).scope(fp).first_only();
                match ledger.read(query).await {
                    Ok(rows) => rows
                        .into_iter()
                        .next()
                        .and_then(|row| serde_json::from_value::<FragTotal>(row).ok()),
                    Err(error) => {
                        warn!(fingerprint = fp, %error, "fragment total read failed, treating as absent");
                        None
                    }
                }
            }
        });

        for total in join_all(fetches).await.into_iter().flatten() {
            self.totals.insert(total.fingerprint, total);
        }
    }

    fn get(&self, fp: u64) -> Option<&FragTotal> {
        self.totals.get(&fp)
    }
}

/// Turns raw per-fragment tallies into comparable, decayed reputation
/// values for whole batches of entities.
pub struct ReputationAggregator {
    ledger: Arc<dyn Ledger>,
    config: ReputeConfig,
}

impl ReputationAggregator {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self::with_config(ledger, ReputeConfig::default())
    }

    pub fn with_config(ledger: Arc<dyn Ledger>, config: ReputeConfig) -> Self {
        Self { ledger, config }
    }

    /// Attach a computed `Reputation` to every entity in the batch,
    /// evaluated at the current time.
    pub async fn attach_reputation(&self, entities: Vec<Reputable>) -> Result<Vec<Reputable>> {
        let now = Utc::now().timestamp();
        self.attach_reputation_at(entities, now).await
    }

    /// Attach reputation evaluated at a fixed epoch-seconds instant.
    ///
    /// Every entity comes back with a populated `reputation` field; an
    /// entity with no tallies yet gets the zero-valued view, never an
    /// error.
    pub async fn attach_reputation_at(
        &self,
        mut entities: Vec<Reputable>,
        now: i64,
    ) -> Result<Vec<Reputable>> {
        // fresh cache per call
        let mut cache = TotalsCache::new();

        // per-entity tally reads are independent, fan out bounded
        let semaphore = Arc::new(Semaphore::new(self.config.fetch_concurrency.max(1)));
        let fetches = entities.iter().map(|entity| {
            let semaphore = semaphore.clone();
            let scope = entity.fingerprint;
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                self.fetch_reputation_row(scope).await
            }
        });
        let rows: Vec<Option<ReputationRow>> = join_all(fetches).await;

        // one totals read per distinct type across the whole batch
        let needed: HashSet<u64> = rows
            .iter()
            .flatten()
            .flat_map(|row| row.fragments.iter().map(|tally| fingerprint(&tally.frag_type)))
            .collect();
        cache
            .populate(self.ledger.as_ref(), needed, self.config.fetch_concurrency)
            .await;

        for (entity, row) in entities.iter_mut().zip(rows) {
            entity.reputation = Some(score_row(row, now, &cache));
        }
        Ok(entities)
    }

    /// Single-entity convenience over the batch path; shares the cache and
    /// scoring code.
    pub async fn entity_reputation(&self, entity: Reputable) -> Result<Reputable> {
        let mut enriched = self.attach_reputation(vec![entity]).await?;
        enriched
            .pop()
            .ok_or_else(|| ReputeError::Internal("empty aggregation result".to_string()))
    }

    /// Read one entity's tally row by scope. Absent rows and read failures
    /// both come back as `None` so one bad row never fails the batch.
    async fn fetch_reputation_row(&self, scope: u64) -> Option<ReputationRow> {
        let query = ReadQuery::new(Table::Reputations).scope(scope).first_only();
        match self.ledger.read(query).await {
            Ok(rows) => rows
                .into_iter()
                .next()
                .and_then(|row| serde_json::from_value(row).ok()),
            Err(error) => {
                warn!(scope, %error, "reputation read failed, treating as absent");
                None
            }
        }
    }
}

/// Score one entity's tally row against the batch totals.
///
/// The entity's own scope fingerprint is dropped here; it is redundant
/// with the fingerprint the entity already carries.
fn score_row(row: Option<ReputationRow>, now: i64, cache: &TotalsCache) -> Reputation {
    let row = match row {
        Some(row) => row,
        None => return Reputation::zero(),
    };

    // decay can only move a score toward zero, so negative elapsed time
    // (a last repute stamped ahead of `now`) is clamped out
    let time_mod = (now - row.last_repute_time).max(0) as f64 / TIME_DECAY_DIVISOR;

    let fragments: Vec<FragmentTally> = row
        .fragments
        .into_iter()
        .map(|tally| {
            let type_fp = fingerprint(&tally.frag_type);
            let up = parse_amount(&tally.up).unwrap_or(0.0);
            let down = parse_amount(&tally.down).unwrap_or(0.0);

            // a type missing from the fetched totals contributes zero
            let (total_up, total_down) = cache
                .get(type_fp)
                .map(|total| {
                    (
                        parse_amount(&total.up).unwrap_or(0.0),
                        parse_amount(&total.down).unwrap_or(0.0),
                    )
                })
                .unwrap_or((0.0, 0.0));

            let mut raw = 0.0;
            if up > 0.0 && total_up > 0.0 {
                raw += up / total_up;
            }
            if down > 0.0 && total_down > 0.0 {
                raw -= down / total_down;
            }

            let scaled = if raw > 0.0 {
                (raw - time_mod).max(raw / 2.0)
            } else if raw < 0.0 {
                (raw + time_mod).min(raw / 2.0)
            } else {
                0.0
            };

            FragmentTally {
                frag_type: tally.frag_type,
                fingerprint: type_fp,
                up: tally.up,
                down: tally.down,
                reputation: round4(raw),
                time_scaled_reputation: round4(scaled),
            }
        })
        .collect();

    let total = fragments.iter().map(|f| f.time_scaled_reputation).sum();
    Reputation {
        fragments,
        total_reputation: round4(total),
        last_repute_time: row.last_repute_time,
    }
}

/// Round to 4 decimal places for presentation.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
