pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod models;
pub mod traits;


pub use config::RunConfig;
pub use coordinator::{RunCoordinator, RunEvent, RunReporter, TracingRunReporter};
pub use discovery::DiscoveryPipeline;
pub use error::AppError;
pub use extract::{NOT_SET, extract_links};
pub use fingerprint::{Fingerprint, fingerprint};
pub use models::{
    CandidateLink, DeliveryReport, ProfileFailure, ProfileNames, RawTrafficRow,
    RunResult, RunStatus, RunSummary, Window,
};
pub use traits::{AccountStore, Notifier, NullNotifier, SeenLinkStore, TrafficSource};
