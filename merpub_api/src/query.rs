//! Search form query serialization.

use chrono::NaiveDate;
use url::Url;

use crate::types::{CategoryFilter, FORM_DATE_FMT};

/// Parameters for one search over the agile-tender listing. The window is
/// inclusive on both ends; pagination is supplied per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchQuery {
    pub status: CategoryFilter,
    pub from: NaiveDate,
    pub until: NaiveDate,
}

impl SearchQuery {
    pub fn new(status: CategoryFilter, from: NaiveDate, until: NaiveDate) -> Self {
        Self {
            status,
            from,
            until,
        }
    }

    /// Appends this query's parameters plus the page number to the given
    /// URL, returning the modified URL. Dates use the portal's compact
    /// form format.
    pub fn add_to_url(&self, url: &Url, page: u32) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("estado", &self.status.ddl_state().to_string())
            .append_pair("desde", &self.from.format(FORM_DATE_FMT).to_string())
            .append_pair("hasta", &self.until.format(FORM_DATE_FMT).to_string())
            .append_pair("pagina", &page.to_string());
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TenderStatus;

    #[test]
    fn serializes_window_and_page() {
        let query = SearchQuery::new(
            CategoryFilter::Only(TenderStatus::BoEmitted),
            NaiveDate::from_ymd_opt(2026, 8, 1).expect("valid date"),
            NaiveDate::from_ymd_opt(2026, 8, 25).expect("valid date"),
        );
        let base = Url::parse("https://portal.example/Buscar").expect("valid url");
        let url = query.add_to_url(&base, 3);
        assert_eq!(
            url.query(),
            Some("estado=4&desde=01082026&hasta=25082026&pagina=3")
        );
    }

    #[test]
    fn all_statuses_serialize_as_zero() {
        let query = SearchQuery::new(
            CategoryFilter::All,
            NaiveDate::from_ymd_opt(2026, 1, 5).expect("valid date"),
            NaiveDate::from_ymd_opt(2026, 1, 6).expect("valid date"),
        );
        let base = Url::parse("https://portal.example/Buscar").expect("valid url");
        let url = query.add_to_url(&base, 1);
        assert!(url.query().expect("query").starts_with("estado=0&"));
    }
}
