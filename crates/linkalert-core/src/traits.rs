use std::future::Future;

use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::{DeliveryReport, ProfileNames, RawTrafficRow, RunResult};

/// Fetches referral traffic for one analytics profile.
///
/// Implementations page through provider limits themselves and return one flat,
/// ordered sequence. Credential renewal is their own concern; unusable
/// credentials surface as [`AppError::AuthError`].
pub trait TrafficSource: Send + Sync + Clone {
    /// Fetch all rows for `[start, end]`, both dates inclusive.
    fn fetch(
        &self,
        profile_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<RawTrafficRow>, AppError>> + Send;
}

/// Append-only set of referring URLs already seen, scoped per profile.
pub trait SeenLinkStore: Send + Sync + Clone {
    /// True iff the (profile, URL) fingerprint has been recorded.
    fn exists(
        &self,
        profile_id: &str,
        url: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Return the subsequence of `urls` not yet recorded, in input order.
    ///
    /// Duplicates inside `urls` are kept. Never mutates the store.
    fn filter_new(
        &self,
        profile_id: &str,
        urls: &[String],
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send {
        async move {
            let mut fresh = Vec::with_capacity(urls.len());
            for url in urls {
                if !self.exists(profile_id, url).await? {
                    fresh.push(url.clone());
                }
            }
            Ok(fresh)
        }
    }

    /// Record every URL for the profile. Already-present fingerprints are
    /// skipped silently. Returns the number of records actually inserted.
    fn record(
        &self,
        profile_id: &str,
        urls: &[String],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Account state: checkpoint, tracked profiles, and subscribers.
///
/// Every call reads through to storage; there is no cached account document.
pub trait AccountStore: Send + Sync + Clone {
    /// The inclusive start of the next fetch window, if a run ever completed.
    fn get_checkpoint(&self) -> impl Future<Output = Result<Option<NaiveDate>, AppError>> + Send;

    fn set_checkpoint(&self, date: NaiveDate) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Tracked profiles, id → display name.
    fn get_profiles(&self) -> impl Future<Output = Result<ProfileNames, AppError>> + Send;

    /// Addresses that receive the digest.
    fn get_emails(&self) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;
}

/// Delivers the new-link digest.
pub trait Notifier: Send + Sync + Clone {
    /// Send one digest of `result` to every recipient.
    ///
    /// A failure for one recipient is recorded in the report and does not stop
    /// delivery to the rest. `Err` is reserved for failures that prevent any
    /// delivery attempt (e.g. the digest cannot be built).
    fn send(
        &self,
        result: &RunResult,
        profile_names: &ProfileNames,
        recipients: &[String],
    ) -> impl Future<Output = Result<DeliveryReport, AppError>> + Send;
}

/// A notifier that drops every digest, for dry runs.
#[derive(Debug, Clone)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    async fn send(
        &self,
        _result: &RunResult,
        _profile_names: &ProfileNames,
        recipients: &[String],
    ) -> Result<DeliveryReport, AppError> {
        tracing::info!(
            recipients = recipients.len(),
            "Dry run: digest not delivered"
        );
        Ok(DeliveryReport::default())
    }
}
