//! Cache-backed fan-out fetcher.
//!
//! For each alias: cache lookup, else one upstream call, normalize, cache
//! store. A failure for one alias never aborts the rest of a bundle; the
//! batch always completes with a mix of per-alias outcomes, ordered by the
//! resolved input list rather than completion order.

use crate::cache::{self, Namespace, TtlCache};
use crate::client::{BridgeClient, BridgeError, FileKey};
use crate::metrics_defs;
use crate::normalize::NormalizedRecord;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Upper bound on concurrent upstream calls within one bundle.
const MAX_PARALLEL_FETCHES: usize = 4;

/// Per-alias result of a fan-out. A failure never carries document text;
/// a success always does, possibly empty.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FetchOutcome {
    Success {
        #[serde(flatten)]
        record: NormalizedRecord,
        cached: bool,
    },
    Failure {
        ok: bool,
        alias: String,
        status: Option<u16>,
        error: String,
    },
}

impl FetchOutcome {
    fn failure(alias: String, err: &BridgeError) -> Self {
        FetchOutcome::Failure {
            ok: false,
            alias,
            status: err.status(),
            error: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

/// Aggregated result of a bundle fetch. `results` lines up index-for-index
/// with `aliases`.
#[derive(Debug, Serialize)]
pub struct BundleResult {
    pub total: usize,
    pub loaded: usize,
    pub aliases: Vec<String>,
    pub results: Vec<FetchOutcome>,
}

#[derive(Clone)]
pub struct Fetcher {
    client: BridgeClient,
    cache: Arc<TtlCache<NormalizedRecord>>,
}

impl Fetcher {
    pub fn new(client: BridgeClient, cache: Arc<TtlCache<NormalizedRecord>>) -> Self {
        Fetcher { client, cache }
    }

    /// Fetches a single document through the cache. Returns the record and
    /// whether it came from the cache. Failed fetches are never cached, so
    /// a retry always re-attempts upstream.
    pub async fn fetch_one(
        &self,
        namespace: Namespace,
        key: &FileKey,
    ) -> Result<(NormalizedRecord, bool), BridgeError> {
        let cache_key = cache::cache_key(namespace, key.label());

        if let Some(record) = self.cache.get(&cache_key) {
            metrics::counter!(metrics_defs::CACHE_HIT).increment(1);
            tracing::debug!(key = %cache_key, "cache hit");
            return Ok((record, true));
        }
        metrics::counter!(metrics_defs::CACHE_MISS).increment(1);

        let record = self.client.fetch_text(key).await.inspect_err(|_| {
            metrics::counter!(metrics_defs::FETCH_FAILED).increment(1);
        })?;
        self.cache.insert(&cache_key, record.clone());
        Ok((record, false))
    }

    /// Fetches every alias in the list, concurrently up to a small cap,
    /// and aggregates per-alias outcomes in input order.
    pub async fn fetch_bundle(&self, namespace: Namespace, aliases: Vec<String>) -> BundleResult {
        let semaphore = Arc::new(Semaphore::new(MAX_PARALLEL_FETCHES));
        let mut join_set = JoinSet::new();

        for (index, alias) in aliases.iter().cloned().enumerate() {
            let fetcher = self.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                // The semaphore is never closed, so acquire only fails if
                // the bundle is already being torn down.
                let _permit = semaphore.acquire().await;
                let outcome = match fetcher
                    .fetch_one(namespace, &FileKey::Alias(alias.clone()))
                    .await
                {
                    Ok((record, cached)) => FetchOutcome::Success { record, cached },
                    Err(err) => {
                        tracing::warn!(alias = %alias, "bundle fetch failed: {err}");
                        FetchOutcome::failure(alias, &err)
                    }
                };
                (index, outcome)
            });
        }

        // Slot outcomes by input index so ordering follows the resolved
        // alias list, not upstream arrival order.
        let mut slots: Vec<Option<FetchOutcome>> = aliases.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(err) => tracing::error!("bundle task panicked: {err}"),
            }
        }

        let results: Vec<FetchOutcome> = slots
            .into_iter()
            .zip(&aliases)
            .map(|(slot, alias)| {
                slot.unwrap_or_else(|| FetchOutcome::Failure {
                    ok: false,
                    alias: alias.clone(),
                    status: None,
                    error: "fetch task failed".to_string(),
                })
            })
            .collect();

        let loaded = results.iter().filter(|o| o.is_success()).count();
        BundleResult {
            total: aliases.len(),
            loaded,
            aliases,
            results,
        }
    }
}
