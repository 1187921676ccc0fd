mod client;
mod errors;
pub mod html;
mod listing;
mod query;
mod retry;
pub mod types;
mod user_agent;
pub use self::client::MerPubClient;
pub use self::errors::Error;
pub use self::listing::{parse_search_page, SearchResultsPage, SearchRow};
pub use self::query::SearchQuery;
pub use self::retry::{with_retry, BackoffPolicy};
pub use self::types::{
    CategoryFilter, Credentials, Session, TenderSnapshot, TenderStatus, VirtualFile,
};
