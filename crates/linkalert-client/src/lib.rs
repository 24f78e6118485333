pub mod analytics;
pub mod mailer;
pub mod oauth;

pub use analytics::{AnalyticsProfile, GoogleAnalyticsSource};
pub use mailer::{Digest, PostmarkNotifier};
pub use oauth::{OAuthCredentials, TokenProvider};
