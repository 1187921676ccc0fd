//! Shared types for the portal client.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format used on portal pages (`12-08-2026 15:30:00`).
pub const PAGE_DATETIME_FMT: &str = "%d-%m-%Y %H:%M:%S";
/// Date format used inside quote modals (`12-08-2026`).
pub const PAGE_DATE_FMT: &str = "%d-%m-%Y";
/// Compact date format expected by the search form (`12082026`).
pub(crate) const FORM_DATE_FMT: &str = "%d%m%Y";

/// Lifecycle status of an agile tender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenderStatus {
    Published,
    Closed,
    /// A buying order has been emitted for the winning quote.
    BoEmitted,
    Cancelled,
}

impl TenderStatus {
    /// Stable numeric code stored in the database.
    pub fn code(self) -> i64 {
        match self {
            TenderStatus::Published => 1,
            TenderStatus::Closed => 2,
            TenderStatus::BoEmitted => 3,
            TenderStatus::Cancelled => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(TenderStatus::Published),
            2 => Some(TenderStatus::Closed),
            3 => Some(TenderStatus::BoEmitted),
            4 => Some(TenderStatus::Cancelled),
            _ => None,
        }
    }

    /// Maps the status label rendered on portal pages.
    pub fn from_page_text(text: &str) -> Option<Self> {
        match text.trim() {
            "Publicada" => Some(TenderStatus::Published),
            "Cerrada" => Some(TenderStatus::Closed),
            "OC Emitida" => Some(TenderStatus::BoEmitted),
            "Cancelada" => Some(TenderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TenderStatus::Published => "PUBLISHED",
            TenderStatus::Closed => "CLOSED",
            TenderStatus::BoEmitted => "BO_EMITTED",
            TenderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Code the search form's status dropdown expects for this status.
    pub(crate) fn ddl_state(self) -> u8 {
        match self {
            TenderStatus::Published => 2,
            TenderStatus::Closed => 3,
            TenderStatus::BoEmitted => 4,
            TenderStatus::Cancelled => 5,
        }
    }
}

impl fmt::Display for TenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUBLISHED" => Ok(TenderStatus::Published),
            "CLOSED" => Ok(TenderStatus::Closed),
            "BO_EMITTED" => Ok(TenderStatus::BoEmitted),
            "CANCELLED" => Ok(TenderStatus::Cancelled),
            other => Err(format!(
                "unknown status '{}', expected PUBLISHED, CLOSED, BO_EMITTED or CANCELLED",
                other
            )),
        }
    }
}

/// Status filter for the search form: a single status or everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(TenderStatus),
}

impl CategoryFilter {
    pub(crate) fn ddl_state(self) -> u8 {
        match self {
            CategoryFilter::All => 0,
            CategoryFilter::Only(status) => status.ddl_state(),
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("*"),
            CategoryFilter::Only(status) => f.write_str(status.as_str()),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            Ok(CategoryFilter::All)
        } else {
            Ok(CategoryFilter::Only(s.parse()?))
        }
    }
}

/// Portal login pair. `Debug` redacts the password.
#[derive(Clone)]
pub struct Credentials {
    pub rut: String,
    pub password: String,
}

impl Credentials {
    pub fn new(rut: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            rut: rut.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("rut", &self.rut)
            .field("password", &"***")
            .finish()
    }
}

/// Proof of an authenticated portal session.
///
/// Cookies live in the client's jar; this token serializes their use. Fetch
/// methods take `&mut Session` so that when the portal logs us out and the
/// client re-authenticates, the renewed session replaces this one before
/// the request is replayed.
#[derive(Debug, Clone)]
pub struct Session {
    /// Organism selected at login (the portal requires picking one).
    pub organism: String,
    pub established_at: DateTime<Utc>,
    /// Whether this session replaced one the portal dropped mid-run.
    pub renewed: bool,
}

impl Session {
    pub(crate) fn new(organism: String) -> Self {
        Self {
            organism,
            established_at: Utc::now(),
            renewed: false,
        }
    }
}

/// A downloaded attachment kept under its upstream filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Everything fetched for one tender while the session was live.
///
/// Staging this bundle is what makes the pipeline resumable: parsing later
/// needs no network access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenderSnapshot {
    /// The tender detail page.
    pub detail_html: String,
    /// Provider quotes export, when the detail page advertises one.
    pub provider_listing: Option<VirtualFile>,
    /// Per-quote modal bodies, in grid row order, as returned by the portal
    /// (outer JSON envelope included).
    pub modals: Vec<String>,
    /// Modal body for the awarded quote, when one is selected.
    pub selected_modal: Option<String>,
    /// Emitted buying-order page, when the detail page links one.
    pub buying_order_html: Option<String>,
}
