use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::discovery::DiscoveryPipeline;
use crate::error::AppError;
use crate::models::{
    CandidateLink, DeliveryReport, ProfileFailure, ProfileNames, RunResult, RunStatus, RunSummary,
    Window,
};
use crate::traits::{AccountStore, Notifier, SeenLinkStore, TrafficSource};

/// Events emitted by the coordinator for monitoring/logging.
#[derive(Debug, Clone)]
pub enum RunEvent<'a> {
    Started {
        run_id: Uuid,
        window: Window,
        profiles: usize,
    },
    Skipped {
        run_id: Uuid,
        reason: &'a str,
    },
    ProfileStarted {
        profile_id: &'a str,
    },
    ProfileCompleted {
        profile_id: &'a str,
        new_links: usize,
    },
    ProfileFailed {
        profile_id: &'a str,
        error: &'a str,
        retryable: bool,
    },
    NotificationSent {
        recipients: usize,
        delivered: usize,
    },
    DeliveryFailed {
        recipient: &'a str,
        error: &'a str,
    },
    CheckpointAdvanced {
        date: NaiveDate,
    },
    CheckpointHeld {
        start: NaiveDate,
        failed_profiles: usize,
    },
    Finished {
        summary: &'a RunSummary,
    },
}

/// Trait for receiving run events (decoupled logging).
pub trait RunReporter: Send + Sync {
    fn report(&self, event: RunEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunReporter;

impl RunReporter for TracingRunReporter {
    fn report(&self, event: RunEvent<'_>) {
        match event {
            RunEvent::Started {
                run_id,
                window,
                profiles,
            } => {
                tracing::info!(
                    %run_id,
                    start = %window.start,
                    end = %window.end,
                    %profiles,
                    "Run started"
                );
            }
            RunEvent::Skipped { run_id, reason } => {
                tracing::info!(%run_id, %reason, "Run skipped");
            }
            RunEvent::ProfileStarted { profile_id } => {
                tracing::debug!(%profile_id, "Discovering profile");
            }
            RunEvent::ProfileCompleted {
                profile_id,
                new_links,
            } => {
                tracing::info!(%profile_id, %new_links, "Profile completed");
            }
            RunEvent::ProfileFailed {
                profile_id,
                error,
                retryable,
            } => {
                tracing::warn!(%profile_id, %error, %retryable, "Profile failed");
            }
            RunEvent::NotificationSent {
                recipients,
                delivered,
            } => {
                tracing::info!(%recipients, %delivered, "Digest sent");
            }
            RunEvent::DeliveryFailed { recipient, error } => {
                tracing::warn!(%recipient, %error, "Digest delivery failed");
            }
            RunEvent::CheckpointAdvanced { date } => {
                tracing::info!(%date, "Checkpoint advanced");
            }
            RunEvent::CheckpointHeld {
                start,
                failed_profiles,
            } => {
                tracing::warn!(
                    %start,
                    %failed_profiles,
                    "Checkpoint held; failed profiles will be retried from the same start date"
                );
            }
            RunEvent::Finished { summary } => {
                tracing::info!(
                    run_id = %summary.run_id,
                    status = summary.status.as_str(),
                    processed = summary.profiles_processed,
                    failed = summary.profiles_failed,
                    new_links = summary.total_new_links,
                    "Run finished"
                );
            }
        }
    }
}

/// Drives discovery across every tracked profile and commits the checkpoint.
///
/// A run either completes (every profile succeeded, checkpoint moved to the
/// end of the window) or partially fails (checkpoint untouched, so the next run
/// re-queries the same window). Runs against one account must not overlap.
pub struct RunCoordinator<T, S, A, N>
where
    T: TrafficSource,
    S: SeenLinkStore,
    A: AccountStore,
    N: Notifier,
{
    pipeline: DiscoveryPipeline<T, S>,
    account: A,
    notifier: N,
    config: RunConfig,
}

impl<T, S, A, N> RunCoordinator<T, S, A, N>
where
    T: TrafficSource,
    S: SeenLinkStore,
    A: AccountStore,
    N: Notifier,
{
    pub fn new(source: T, store: S, account: A, notifier: N, config: RunConfig) -> Self {
        let pipeline = DiscoveryPipeline::new(source, store).with_fetch_timeout(config.fetch_timeout);
        Self {
            pipeline,
            account,
            notifier,
            config,
        }
    }

    /// Run once for today's date, logging through `tracing`.
    pub async fn execute(&self) -> Result<RunSummary, AppError> {
        self.execute_on(Utc::now().date_naive(), &TracingRunReporter)
            .await
    }

    /// Run once as if the current date were `today`.
    ///
    /// Returns `Err` only when account state cannot be read or the checkpoint
    /// cannot be written; profile failures are reported in the summary.
    pub async fn execute_on<R: RunReporter>(
        &self,
        today: NaiveDate,
        reporter: &R,
    ) -> Result<RunSummary, AppError> {
        let run_id = Uuid::new_v4();

        // 1. Window
        let checkpoint = self.account.get_checkpoint().await?;
        let Some(window) = Window::for_run(checkpoint, today, self.config.bootstrap_days) else {
            return Ok(finish_skipped(run_id, None, "window is empty", reporter));
        };

        let profiles = self.account.get_profiles().await?;
        if profiles.is_empty() {
            return Ok(finish_skipped(
                run_id,
                Some(window),
                "no tracked profiles",
                reporter,
            ));
        }

        reporter.report(RunEvent::Started {
            run_id,
            window,
            profiles: profiles.len(),
        });

        // 2. Discover every profile, bounded concurrency, wait for all
        let outcomes: Vec<(&String, Result<Vec<CandidateLink>, AppError>)> =
            stream::iter(profiles.keys())
                .map(|profile_id| async move {
                    reporter.report(RunEvent::ProfileStarted { profile_id });
                    let outcome = self
                        .pipeline
                        .run_profile(profile_id, window.start, window.end)
                        .await;
                    (profile_id, outcome)
                })
                .buffer_unordered(self.config.max_concurrency.max(1))
                .collect()
                .await;

        // 3. Aggregate
        let mut result = RunResult::new();
        let mut failures = Vec::new();
        for (profile_id, outcome) in outcomes {
            match outcome {
                Ok(links) => {
                    reporter.report(RunEvent::ProfileCompleted {
                        profile_id,
                        new_links: links.len(),
                    });
                    if !links.is_empty() {
                        result.insert(profile_id.clone(), links);
                    }
                }
                Err(e) => {
                    let error = e.to_string();
                    reporter.report(RunEvent::ProfileFailed {
                        profile_id,
                        error: &error,
                        retryable: e.is_retryable(),
                    });
                    failures.push(ProfileFailure {
                        profile_id: profile_id.clone(),
                        error,
                        retryable: e.is_retryable(),
                    });
                }
            }
        }
        failures.sort_by(|a, b| a.profile_id.cmp(&b.profile_id));
        let total_new_links: usize = result.values().map(Vec::len).sum();

        // 4. Notify
        let delivery = if total_new_links > 0 {
            self.notify(&result, &profiles, reporter).await
        } else {
            None
        };

        // 5. Commit
        let (status, checkpoint_advanced_to) = if failures.is_empty() {
            self.account.set_checkpoint(window.end).await?;
            reporter.report(RunEvent::CheckpointAdvanced { date: window.end });
            (RunStatus::Completed, Some(window.end))
        } else {
            reporter.report(RunEvent::CheckpointHeld {
                start: window.start,
                failed_profiles: failures.len(),
            });
            (RunStatus::PartiallyFailed, None)
        };

        let summary = RunSummary {
            run_id,
            status,
            window: Some(window),
            profiles_processed: profiles.len(),
            profiles_failed: failures.len(),
            total_new_links,
            failures,
            delivery,
            checkpoint_advanced_to,
        };
        reporter.report(RunEvent::Finished { summary: &summary });

        Ok(summary)
    }

    /// Send the digest to every subscriber. Never fails the run.
    async fn notify<R: RunReporter>(
        &self,
        result: &RunResult,
        profiles: &ProfileNames,
        reporter: &R,
    ) -> Option<DeliveryReport> {
        let recipients = match self.account.get_emails().await {
            Ok(emails) => emails,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load subscriber emails; digest not sent");
                return None;
            }
        };

        if recipients.is_empty() {
            tracing::warn!("New links found but no subscriber emails configured");
            return None;
        }

        let report = match self.notifier.send(result, profiles, &recipients).await {
            Ok(report) => report,
            Err(e) => {
                let error = e.to_string();
                DeliveryReport {
                    delivered: Vec::new(),
                    failed: recipients
                        .iter()
                        .map(|r| (r.clone(), error.clone()))
                        .collect(),
                }
            }
        };

        for (recipient, error) in &report.failed {
            reporter.report(RunEvent::DeliveryFailed { recipient, error });
        }
        reporter.report(RunEvent::NotificationSent {
            recipients: recipients.len(),
            delivered: report.delivered.len(),
        });

        Some(report)
    }
}

fn finish_skipped<R: RunReporter>(
    run_id: Uuid,
    window: Option<Window>,
    reason: &str,
    reporter: &R,
) -> RunSummary {
    reporter.report(RunEvent::Skipped { run_id, reason });
    let summary = RunSummary::skipped(run_id, window);
    reporter.report(RunEvent::Finished { summary: &summary });
    summary
}
