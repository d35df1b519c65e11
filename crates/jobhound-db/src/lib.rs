pub mod config;
pub mod database;
pub mod posting_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use posting_repository::{
    NameCount, PostingQuery, PostingRepository, PostingStats, StoredPosting,
};
