//! Search listing pages.
//!
//! The results grid is the `gvResultados` table: one row per tender with
//! identifier, name, buying unit, publication and closing timestamps, and
//! the status label. `lblTotalResultados` carries the count across pages;
//! an empty result set renders `lblSinResultados` instead of the grid.

use chrono::NaiveDateTime;

use crate::types::{TenderStatus, PAGE_DATETIME_FMT};
use crate::{html, Error};

/// One row of the search results grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRow {
    pub idn: String,
    pub name: String,
    pub buying_unit: String,
    pub published: Option<NaiveDateTime>,
    pub closed: Option<NaiveDateTime>,
    pub status_text: String,
}

impl SearchRow {
    /// Status parsed from the row label, when recognized.
    pub fn status(&self) -> Option<TenderStatus> {
        TenderStatus::from_page_text(&self.status_text)
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResultsPage {
    pub rows: Vec<SearchRow>,
    /// Total result count across all pages, when the portal reports it.
    pub total: Option<u64>,
}

/// Parses one listing page.
///
/// A page carrying the explicit no-results marker is an empty page. A page
/// with neither the marker nor the results grid does not look like a
/// listing at all; the body rides along in the error for dumping.
pub fn parse_search_page(body: &str) -> Result<SearchResultsPage, Error> {
    let Some(table) = html::element_by_id(body, "gvResultados") else {
        if html::element_by_id(body, "lblSinResultados").is_some() {
            return Ok(SearchResultsPage::default());
        }
        return Err(Error::Structure {
            what: "listing page without results grid or empty marker".into(),
            body: body.to_string(),
        });
    };

    let total = html::text_by_id(body, "lblTotalResultados").and_then(|t| t.parse().ok());

    let mut rows = Vec::new();
    for row in html::elements_by_tag(table, "tr") {
        let cells = html::elements_by_tag(row, "td");
        if cells.is_empty() {
            // header row (th cells)
            continue;
        }
        if cells.len() < 6 {
            return Err(Error::Structure {
                what: format!("listing row with {} cells, expected 6", cells.len()),
                body: body.to_string(),
            });
        }
        let idn = html::strip_tags(cells[0]);
        if idn.is_empty() {
            return Err(Error::Structure {
                what: "listing row without tender identifier".into(),
                body: body.to_string(),
            });
        }
        rows.push(SearchRow {
            idn,
            name: html::strip_tags(cells[1]),
            buying_unit: html::strip_tags(cells[2]),
            published: parse_page_datetime(&html::strip_tags(cells[3])),
            closed: parse_page_datetime(&html::strip_tags(cells[4])),
            status_text: html::strip_tags(cells[5]),
        });
    }

    Ok(SearchResultsPage { rows, total })
}

fn parse_page_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, PAGE_DATETIME_FMT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body>
        <span id="lblTotalResultados">137</span>
        <table id="gvResultados">
          <tr><th>ID</th><th>Nombre</th><th>Unidad</th><th>Publicada</th><th>Cierre</th><th>Estado</th></tr>
          <tr class="dccp-row">
            <td>1057-430-AG26</td>
            <td>Compra de guantes de nitrilo</td>
            <td>Hospital Regional</td>
            <td>12-08-2026 10:30:00</td>
            <td>19-08-2026 15:00:00</td>
            <td>OC Emitida</td>
          </tr>
          <tr class="dccp-row">
            <td>1057-431-AG26</td>
            <td>Servicio de aseo</td>
            <td>Municipalidad de Arica</td>
            <td>13-08-2026 09:00:00</td>
            <td></td>
            <td>Publicada</td>
          </tr>
        </table></body></html>"#;

    #[test]
    fn parses_rows_and_total() {
        let page = parse_search_page(LISTING).expect("listing should parse");
        assert_eq!(page.total, Some(137));
        assert_eq!(page.rows.len(), 2);

        let first = &page.rows[0];
        assert_eq!(first.idn, "1057-430-AG26");
        assert_eq!(first.buying_unit, "Hospital Regional");
        assert_eq!(first.status(), Some(TenderStatus::BoEmitted));
        assert_eq!(
            first.published.expect("published").format("%d-%m-%Y").to_string(),
            "12-08-2026"
        );

        let second = &page.rows[1];
        assert_eq!(second.closed, None);
        assert_eq!(second.status(), Some(TenderStatus::Published));
    }

    #[test]
    fn no_results_marker_is_empty_page() {
        let body = r#"<html><body><span id="lblSinResultados">No se encontraron resultados</span></body></html>"#;
        let page = parse_search_page(body).expect("empty page should parse");
        assert!(page.rows.is_empty());
        assert_eq!(page.total, None);
    }

    #[test]
    fn unrecognizable_page_is_structural() {
        let err = parse_search_page("<html><body>mantenimiento</body></html>")
            .expect_err("should not parse");
        assert!(matches!(err, Error::Structure { .. }));
    }

    #[test]
    fn short_row_is_structural() {
        let body = r#"<table id="gvResultados"><tr><td>1057-1-AG26</td><td>x</td></tr></table>"#;
        let err = parse_search_page(body).expect_err("should not parse");
        assert!(matches!(err, Error::Structure { .. }));
    }
}
