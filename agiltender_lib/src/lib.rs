//! Library layer for AgilTender: staging, parsing and storage for crawled
//! agile tenders.
//!
//! Wraps the `merpub_api` portal client with a disk staging area for fetched
//! pages, a tolerant parser producing [`model::TenderRecord`]s, and SQLite
//! persistence with idempotent merges.

pub mod db;
pub mod dedup;
pub mod dump;
pub mod model;
pub mod parse;
pub mod store;
pub mod validation;
pub mod window;

pub use merpub_api;
pub use merpub_api::{
    BackoffPolicy, CategoryFilter, Credentials, MerPubClient, SearchQuery, Session,
    TenderSnapshot, TenderStatus, VirtualFile,
};

pub use db::{Db, DbError, MergeOutcome, MergeReport};
pub use dedup::KnownIds;
pub use dump::DumpDir;
pub use model::TenderRecord;
pub use parse::{parse_tender, ParseError};
pub use store::{PageStore, StoreError};
pub use validation::ValidationError;
pub use window::{CrawlWindow, WindowError};
