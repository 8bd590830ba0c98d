pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod search;
pub mod utils;

#[cfg(feature = "ssr")]
pub mod api;

pub use db::ReviewStore;
pub use error::ReviewError;
pub use models::movie::MovieSummary;
pub use models::review::{average_score, Review, UserReview};
pub use utils::CoalescingGate;
