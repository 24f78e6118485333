pub mod account;
pub mod config;
pub mod database;
pub mod seen_links;

pub use account::{Account, AccountRepository};
pub use config::DatabaseConfig;
pub use database::Database;
pub use seen_links::SeenLinkRepository;
