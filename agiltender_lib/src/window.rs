//! Crawl window resolution.

use chrono::NaiveDate;

/// Inclusive date window a crawl covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlWindow {
    pub from: NaiveDate,
    pub until: NaiveDate,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("invalid date '{0}': expected ISO format YYYY-MM-DD")]
    BadDate(String),
    #[error("--days-before cannot be combined with --from or --until")]
    MixedModes,
    #[error("--days-before must be zero or positive, got {0}")]
    BadDays(i64),
    #[error("--until needs --from")]
    UntilWithoutFrom,
    #[error("a date window is required: pass --from (and optionally --until) or --days-before")]
    Missing,
    #[error("window start {from} is after its end {until}")]
    Inverted { from: NaiveDate, until: NaiveDate },
}

impl CrawlWindow {
    /// Resolves the CLI window flags into an inclusive window. Exactly one
    /// derivation path is taken: explicit bounds or the relative
    /// days-before form; mixing them is an error. A lone `--from` closes
    /// the window at `today`.
    pub fn resolve(
        from: Option<&str>,
        until: Option<&str>,
        days_before: Option<i64>,
        today: NaiveDate,
    ) -> Result<Self, WindowError> {
        if days_before.is_some() && (from.is_some() || until.is_some()) {
            return Err(WindowError::MixedModes);
        }
        if let Some(days) = days_before {
            if days < 0 {
                return Err(WindowError::BadDays(days));
            }
            return Ok(Self {
                from: today - chrono::Duration::days(days),
                until: today,
            });
        }
        let window = match (from, until) {
            (Some(from), Some(until)) => Self {
                from: parse_iso(from)?,
                until: parse_iso(until)?,
            },
            (Some(from), None) => Self {
                from: parse_iso(from)?,
                until: today,
            },
            (None, Some(_)) => return Err(WindowError::UntilWithoutFrom),
            (None, None) => return Err(WindowError::Missing),
        };
        if window.from > window.until {
            return Err(WindowError::Inverted {
                from: window.from,
                until: window.until,
            });
        }
        Ok(window)
    }
}

fn parse_iso(text: &str) -> Result<NaiveDate, WindowError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| WindowError::BadDate(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 25).expect("valid date")
    }

    #[test]
    fn explicit_bounds() {
        let window =
            CrawlWindow::resolve(Some("2026-08-01"), Some("2026-08-10"), None, today())
                .expect("valid window");
        assert_eq!(window.from, NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        assert_eq!(window.until, NaiveDate::from_ymd_opt(2026, 8, 10).unwrap());
    }

    #[test]
    fn lone_from_closes_at_today() {
        let window = CrawlWindow::resolve(Some("2026-08-20"), None, None, today())
            .expect("valid window");
        assert_eq!(window.until, today());
    }

    #[test]
    fn days_before_is_relative_to_today() {
        let window = CrawlWindow::resolve(None, None, Some(7), today()).expect("valid window");
        assert_eq!(window.from, NaiveDate::from_ymd_opt(2026, 8, 18).unwrap());
        assert_eq!(window.until, today());
    }

    #[test]
    fn mixing_modes_is_rejected() {
        let err = CrawlWindow::resolve(Some("2026-08-01"), None, Some(7), today())
            .expect_err("mixed modes");
        assert_eq!(err, WindowError::MixedModes);
    }

    #[test]
    fn partial_and_missing_windows_are_rejected() {
        assert_eq!(
            CrawlWindow::resolve(None, Some("2026-08-10"), None, today()),
            Err(WindowError::UntilWithoutFrom)
        );
        assert_eq!(
            CrawlWindow::resolve(None, None, None, today()),
            Err(WindowError::Missing)
        );
        assert_eq!(
            CrawlWindow::resolve(None, None, Some(-1), today()),
            Err(WindowError::BadDays(-1))
        );
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = CrawlWindow::resolve(Some("2026-08-10"), Some("2026-08-01"), None, today())
            .expect_err("inverted");
        assert!(matches!(err, WindowError::Inverted { .. }));
    }

    #[test]
    fn bad_date_text_is_friendly() {
        let err = CrawlWindow::resolve(Some("01-08-2026"), None, None, today())
            .expect_err("wrong format");
        assert_eq!(err.to_string(), "invalid date '01-08-2026': expected ISO format YYYY-MM-DD");
    }
}
