use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;

use crate::error::AppError;
use crate::extract::extract_links;
use crate::models::CandidateLink;
use crate::traits::{SeenLinkStore, TrafficSource};

/// Orchestrates discovery for one profile: fetch → extract → filter → record.
///
/// Generic over the traffic source and seen-link store so tests can run the
/// whole pipeline without network or database access.
#[derive(Clone)]
pub struct DiscoveryPipeline<T, S>
where
    T: TrafficSource,
    S: SeenLinkStore,
{
    source: T,
    store: S,
    fetch_timeout: Option<Duration>,
}

impl<T, S> DiscoveryPipeline<T, S>
where
    T: TrafficSource,
    S: SeenLinkStore,
{
    pub fn new(source: T, store: S) -> Self {
        Self {
            source,
            store,
            fetch_timeout: None,
        }
    }

    /// Bound every traffic fetch; an expired fetch fails with [`AppError::Timeout`].
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Discover referrers of `profile_id` never seen before in `[start, end]`.
    ///
    /// 1. Fetch every traffic row in the window
    /// 2. Extract candidate links, dropping rows without a referral path
    /// 3. Keep links not present in the seen-link store
    /// 4. Collapse repeats within the window, keeping first occurrence
    /// 5. Record exactly the returned links
    ///
    /// Any error is scoped to this profile; nothing is recorded unless the
    /// fetch and the lookup both succeeded.
    pub async fn run_profile(
        &self,
        profile_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CandidateLink>, AppError> {
        // 1. Fetch
        let fetch = self.source.fetch(profile_id, start, end);
        let rows = match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| AppError::Timeout(limit.as_secs()))??,
            None => fetch.await?,
        };
        tracing::debug!(%profile_id, rows = rows.len(), "Fetched traffic rows");

        // 2. Extract
        let candidates = extract_links(&rows);

        // 3. Filter against the store
        let unseen = self.store.filter_new(profile_id, &candidates).await?;

        // 4. Collapse repeats
        let mut emitted = HashSet::with_capacity(unseen.len());
        let fresh: Vec<CandidateLink> = unseen
            .into_iter()
            .filter(|link| emitted.insert(link.clone()))
            .collect();

        // 5. Record
        if !fresh.is_empty() {
            let inserted = self.store.record(profile_id, &fresh).await?;
            if inserted < fresh.len() as u64 {
                tracing::warn!(
                    %profile_id,
                    expected = fresh.len(),
                    inserted,
                    "Some new links were already recorded"
                );
            }
        }

        tracing::info!(
            %profile_id,
            candidates = candidates.len(),
            new_links = fresh.len(),
            "Profile discovery complete"
        );

        Ok(fresh)
    }
}
