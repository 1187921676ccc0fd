//! Extraction of tender records from staged pages.
//!
//! Parsing is tolerant: any field the page omits or mangles becomes `None`
//! and the record survives. Only a detail page without its tender
//! identifier is rejected, since nothing else can anchor the record.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;

use merpub_api::html::{element_by_id, elements_by_class, elements_by_tag, strip_tags, text_by_id};
use merpub_api::types::{PAGE_DATETIME_FMT, PAGE_DATE_FMT};
use merpub_api::{TenderSnapshot, TenderStatus};

use crate::model::{
    Application, ApplicationItem, Contact, Money, Organization, Product, TenderRecord,
};
use crate::validation::{normalize_full_name, validate_email, validate_phone, validate_rut};

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("detail page carries no tender identifier")]
    MissingIdentifier,
    #[error("staged pages belong to {found}, expected {requested}")]
    IdentifierMismatch { requested: String, found: String },
}

/// Builds a [`TenderRecord`] from one tender's staged pages.
///
/// The identifier printed on the detail page must match `idn`; a mismatch
/// means the staging directory holds someone else's pages.
pub fn parse_tender(idn: &str, snapshot: &TenderSnapshot) -> Result<TenderRecord, ParseError> {
    let detail = snapshot.detail_html.as_str();
    let found =
        text_by_id(detail, "lblExternalCodeQuote").ok_or(ParseError::MissingIdentifier)?;
    if found != idn {
        return Err(ParseError::IdentifierMismatch {
            requested: idn.to_string(),
            found,
        });
    }

    Ok(TenderRecord {
        idn: found,
        status: text_by_id(detail, "lblrstStatus")
            .and_then(|text| TenderStatus::from_page_text(&text)),
        title: text_by_id(detail, "lblTextName"),
        summary: text_by_id(detail, "lblTextDescription"),
        published: datetime_by_id(detail, "lblFechaPublicacion"),
        closed: datetime_by_id(detail, "lblFechaCierre"),
        delivery_days: text_by_id(detail, "lblPlazoEntrega").and_then(|text| leading_int(&text)),
        budget: money_by_ids(detail, "lblMonedaSymbol", "lblMontoTotalDisponible"),
        organization: Organization {
            rut: text_by_id(detail, "lblRutOrganismo").and_then(|raw| lenient_rut(&raw)),
            name: text_by_id(detail, "lblNombreOrganismo"),
        },
        contact: parse_contact(detail),
        products: parse_products(detail),
        applications: parse_applications(snapshot),
    })
}

fn parse_contact(detail: &str) -> Contact {
    let (name, surnames) = match text_by_id(detail, "lblDescContacto") {
        Some(full) => {
            let (name, surnames) = normalize_full_name(&full);
            (none_if_empty(name), none_if_empty(surnames))
        }
        None => (None, None),
    };
    let email = text_by_id(detail, "lblDescEmail").and_then(|raw| match validate_email(&raw) {
        Ok(email) => Some(email),
        Err(e) => {
            tracing::debug!("dropping contact email: {}", e);
            None
        }
    });
    let phone = text_by_id(detail, "lblDescTelefono").and_then(|raw| match validate_phone(&raw) {
        Ok(phone) => Some(phone),
        Err(e) => {
            tracing::debug!("dropping contact phone: {}", e);
            None
        }
    });
    Contact {
        name,
        surnames,
        email,
        phone,
    }
}

/// Requested product lines from the `gvCategory` table. Each row shows the
/// product name, a `Tipo <code>` classifier and the quantity.
fn parse_products(detail: &str) -> Vec<Product> {
    let Some(table) = element_by_id(detail, "gvCategory") else {
        return Vec::new();
    };
    let mut products = Vec::new();
    for row in elements_by_class(table, "dccp-row") {
        let title = elements_by_class(row, "d-block")
            .first()
            .map(|frag| strip_tags(frag))
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }
        let type_code = elements_by_class(row, "text-gray")
            .first()
            .map(|frag| strip_tags(frag))
            .and_then(|text| text.split_whitespace().nth(1)?.parse().ok());
        let quantity = elements_by_class(row, "text-font-15")
            .first()
            .map(|frag| strip_tags(frag))
            .and_then(|text| leading_int(&text));
        products.push(Product {
            ord: products.len() as i64 + 1,
            type_code,
            title,
            quantity,
        });
    }
    products
}

/// Quote modal envelope: the portal wraps the payload JSON in a string
/// under `d`, so decoding happens twice.
#[derive(Deserialize)]
struct AjaxEnvelope {
    d: String,
}

#[derive(Deserialize)]
struct ModalInfo {
    #[serde(rename = "FechaEnvio")]
    sent: Option<String>,
    #[serde(rename = "Descripcion")]
    description: Option<String>,
}

fn decode_modal(raw: &str) -> Option<ModalInfo> {
    let envelope: AjaxEnvelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!("skipping quote modal envelope: {}", e);
            return None;
        }
    };
    match serde_json::from_str(&envelope.d) {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::debug!("skipping quote modal payload: {}", e);
            None
        }
    }
}

/// Provider quotes, joined from the provider export and the quote modals.
///
/// The export lists one totals row (Orden 0) followed by one row per quoted
/// product line, so the rows chunk by `max(Orden) + 1`. Modals pair with
/// quotes by position; a missing or garbled modal leaves its quote without
/// a sent date and remarks.
fn parse_applications(snapshot: &TenderSnapshot) -> Vec<Application> {
    let Some(listing) = &snapshot.provider_listing else {
        return Vec::new();
    };
    let content = String::from_utf8_lossy(&listing.content);
    let Some(table) = elements_by_tag(&content, "table").into_iter().next() else {
        return Vec::new();
    };
    let mut rows = elements_by_tag(table, "tr").into_iter();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = elements_by_tag(header, "th")
        .into_iter()
        .map(strip_tags)
        .collect();
    let col = |name: &str| headers.iter().position(|h| h == name);
    let (Some(orden), Some(rut), Some(name)) =
        (col("Orden"), col("Rut Proveedor"), col("Razon Social"))
    else {
        tracing::debug!("provider export is missing expected columns");
        return Vec::new();
    };
    let currency = col("Moneda");
    let unit_price = col("Precio Unitario");
    let total = col("Monto Total Cotizacion");

    let data: Vec<Vec<String>> = rows
        .map(|row| elements_by_tag(row, "td").into_iter().map(strip_tags).collect())
        .filter(|cells: &Vec<String>| !cells.is_empty())
        .collect();
    if data.is_empty() {
        return Vec::new();
    }

    let group = data
        .iter()
        .filter_map(|row| row.get(orden)?.parse::<i64>().ok())
        .filter(|&ord| ord >= 0)
        .max()
        .unwrap_or(0)
        + 1;
    let selected = selected_provider_rut(&snapshot.detail_html);

    let mut applications = Vec::new();
    for (i, chunk) in data.chunks(group as usize).enumerate() {
        let head = &chunk[0];
        let organization = Organization {
            rut: lenient_rut(cell(head, Some(rut))),
            name: none_if_empty(cell(head, Some(name)).to_string()),
        };
        let (sent, summary) = match snapshot.modals.get(i).and_then(|raw| decode_modal(raw)) {
            Some(info) => (
                info.sent
                    .and_then(|text| NaiveDate::parse_from_str(&text, PAGE_DATE_FMT).ok()),
                info.description.filter(|text| !text.trim().is_empty()),
            ),
            None => (None, None),
        };
        let accepted = match (&selected, &organization.rut) {
            (Some(selected), Some(rut)) => Some(selected == rut),
            _ => None,
        };
        let items = chunk[1..]
            .iter()
            .filter_map(|row| {
                let product_ord: i64 = row.get(orden)?.parse().ok()?;
                if product_ord < 1 {
                    return None;
                }
                Some(ApplicationItem {
                    product_ord,
                    unit: Money::from_parts(cell(row, currency), cell(row, unit_price)),
                })
            })
            .collect();
        applications.push(Application {
            organization,
            sent,
            summary,
            accepted,
            total: Money::from_parts(cell(head, currency), cell(head, total)),
            items,
        });
    }
    applications
}

/// RUT of the awarded provider, when the detail page shows the selection
/// table. The cell mixes RUT and company name in one string.
fn selected_provider_rut(detail: &str) -> Option<String> {
    let table = element_by_id(detail, "gvSeleccionado")?;
    let text = elements_by_class(table, "declaracion-rutRazonSocial")
        .first()
        .map(|frag| strip_tags(frag))?;
    let re = Regex::new(r"\d{1,3}(?:\.\d{3}){1,3}-[\dkK]|\d{6,9}-[\dkK]").ok()?;
    let matched = re.find(&text)?;
    validate_rut(matched.as_str()).ok()
}

/// Validates a RUT but tolerates failure: pages occasionally render a
/// blank or truncated RUT and the record is still worth keeping.
fn lenient_rut(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    match validate_rut(raw) {
        Ok(rut) => Some(rut),
        Err(e) => {
            tracing::debug!("dropping rut: {}", e);
            None
        }
    }
}

fn datetime_by_id(detail: &str, id: &str) -> Option<NaiveDateTime> {
    let text = text_by_id(detail, id)?;
    NaiveDateTime::parse_from_str(&text, PAGE_DATETIME_FMT).ok()
}

fn money_by_ids(detail: &str, symbol_id: &str, amount_id: &str) -> Option<Money> {
    Money::from_parts(
        &text_by_id(detail, symbol_id)?,
        &text_by_id(detail, amount_id)?,
    )
}

/// First run of digits, for fields rendered like `10 días`.
fn leading_int(text: &str) -> Option<i64> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn cell(row: &[String], col: Option<usize>) -> &str {
    col.and_then(|i| row.get(i)).map(|s| s.as_str()).unwrap_or("")
}

fn none_if_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
