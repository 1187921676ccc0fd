//! Domain records produced by the parser and merged into the database.

use chrono::{NaiveDate, NaiveDateTime};
use merpub_api::TenderStatus;
use serde::{Deserialize, Serialize};

/// An amount with its currency, as rendered by the portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub amount: f64,
    /// Lowercase currency code; the portal's `$` means Chilean pesos.
    pub currency: String,
}

impl Money {
    /// Builds a money value from the page's symbol and amount texts.
    ///
    /// Amounts use dots for thousands and a comma for decimals
    /// (`1.234.567,89`).
    pub fn from_parts(symbol: &str, amount: &str) -> Option<Self> {
        let currency = match symbol.trim() {
            "" => return None,
            "$" => "clp".to_string(),
            other => other.to_lowercase(),
        };
        let normalized = amount.trim().replace('.', "").replace(',', ".");
        let amount = normalized.parse().ok()?;
        Some(Self { amount, currency })
    }
}

/// One requested product line of a tender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// 1-based position in the products table.
    pub ord: i64,
    /// Numeric classifier code, when the page shows one.
    pub type_code: Option<i64>,
    pub title: String,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Normalized RUT, when present and its check digit verifies.
    pub rut: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub surnames: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A provider quote for a tender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub organization: Organization,
    /// Date the quote was sent, from the quote modal.
    pub sent: Option<NaiveDate>,
    /// Free-text remarks from the quote modal.
    pub summary: Option<String>,
    /// Whether this quote was awarded. `None` while no provider has been
    /// selected yet.
    pub accepted: Option<bool>,
    pub total: Option<Money>,
    pub items: Vec<ApplicationItem>,
}

/// One product line inside a provider quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationItem {
    /// Product position this line quotes, matching [`Product::ord`].
    pub product_ord: i64,
    pub unit: Option<Money>,
}

/// Everything parsed out of one tender's staged pages.
///
/// Only the identifier is guaranteed; every other field survives as `None`
/// when the page omitted or mangled it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderRecord {
    pub idn: String,
    pub status: Option<TenderStatus>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub published: Option<NaiveDateTime>,
    pub closed: Option<NaiveDateTime>,
    /// Delivery term in days.
    pub delivery_days: Option<i64>,
    /// Maximum available budget.
    pub budget: Option<Money>,
    pub organization: Organization,
    pub contact: Contact,
    pub products: Vec<Product>,
    pub applications: Vec<Application>,
}
