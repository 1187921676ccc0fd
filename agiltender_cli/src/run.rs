//! The crawl-parse-merge pipeline behind the `agiltender` binary.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};

use agiltender_lib::merpub_api::Error as ApiError;
use agiltender_lib::validation;
use agiltender_lib::{
    parse_tender, CategoryFilter, CrawlWindow, Credentials, Db, DumpDir, KnownIds, MerPubClient,
    PageStore, SearchQuery, Session, TenderSnapshot,
};

use crate::Cli;

#[derive(Default)]
struct RunSummary {
    fetched: usize,
    skipped_known: usize,
    failed_fetch: usize,
    parsed: usize,
    failed_parse: usize,
    inserted: usize,
    updated: usize,
    failed_merge: usize,
}

pub async fn run(cli: &Cli) -> Result<()> {
    let db_path = database_path(&cli.database)?;
    let mut db = Db::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    db.init().context("initializing database schema")?;

    let store = PageStore::new(&cli.work_dir);
    let dumps = DumpDir::new(&cli.dump_dir);

    let mut summary = RunSummary::default();
    let mut queued: Vec<(String, TenderSnapshot)> = Vec::new();
    let mut window: Option<CrawlWindow> = None;

    if cli.scrape {
        window = Some(
            scrape_stage(cli, &db, &store, &dumps, &mut summary, &mut queued).await?,
        );
    } else if cli.from.is_some() || cli.until.is_some() || cli.days_before.is_some() {
        eprintln!("Note: window flags are ignored without --scrape.");
    }

    let staged = if queued.is_empty() && !cli.no_save_files {
        store.load_all().context("loading staged pages")?
    } else {
        queued
    };

    let mut records = Vec::new();
    for (idn, snapshot) in &staged {
        match parse_tender(idn, snapshot) {
            Ok(record) => {
                summary.parsed += 1;
                records.push(record);
            }
            Err(e) => {
                eprintln!("Failed to parse {}: {}", idn, e);
                dumps.write(&format!("parse_{}", idn), &snapshot.detail_html);
                summary.failed_parse += 1;
            }
        }
    }

    if cli.no_merge {
        eprintln!("Skipping merge (--no-merge).");
    } else {
        let report = db.merge(&records);
        summary.inserted = report.inserted;
        summary.updated = report.updated;
        summary.failed_merge = report.failed;
        if let Some(window) = &window {
            db.set_meta("last_crawl_from", &window.from.to_string())?;
            db.set_meta("last_crawl_until", &window.until.to_string())?;
        }
        eprintln!("Database now holds {} tenders", db.tender_count()?);
    }

    eprintln!(
        "Run complete: {} fetched, {} skipped known, {} fetch failures, {} parsed, \
         {} parse failures, {} inserted, {} updated, {} merge failures",
        summary.fetched,
        summary.skipped_known,
        summary.failed_fetch,
        summary.parsed,
        summary.failed_parse,
        summary.inserted,
        summary.updated,
        summary.failed_merge
    );
    Ok(())
}

/// Crawls the portal: paginated listing search, per-row snapshot fetch,
/// staging to disk. Fills `queued` with everything fetched this run.
async fn scrape_stage(
    cli: &Cli,
    db: &Db,
    store: &PageStore,
    dumps: &DumpDir,
    summary: &mut RunSummary,
    queued: &mut Vec<(String, TenderSnapshot)>,
) -> Result<CrawlWindow> {
    let window = CrawlWindow::resolve(
        cli.from.as_deref(),
        cli.until.as_deref(),
        cli.days_before,
        Local::now().date_naive(),
    )?;
    let category: CategoryFilter = cli.category.parse().map_err(|e: String| anyhow!(e))?;
    let credentials = resolve_credentials(cli)?;

    let mut known = KnownIds::from_sets(
        db.known_tender_ids().context("reading known tenders")?,
        store.known_identifiers().context("scanning staging area")?,
    );

    let client = MerPubClient::new(credentials)?;
    let mut session = client.login().await.context("portal login failed")?;
    eprintln!("Logged in; portal organism {}", session.organism);
    eprintln!(
        "Scraping {} to {} (category {})",
        window.from, window.until, category
    );

    let query = SearchQuery::new(category, window.from, window.until);
    let mut page: u32 = 1;
    let mut total: Option<u64> = None;
    let mut seen: u64 = 0;

    'pages: loop {
        let results = match client.search_page(&mut session, &query, page).await {
            Ok(results) => results,
            Err(ApiError::Structure { what, body }) => {
                eprintln!("Listing page {} rejected ({}), retrying once", page, what);
                dumps.write(&format!("listing_page_{}", page), &body);
                client
                    .search_page(&mut session, &query, page)
                    .await
                    .with_context(|| format!("listing page {} failed twice", page))?
            }
            Err(e) => {
                return Err(e).with_context(|| format!("fetching listing page {}", page));
            }
        };
        total = total.or(results.total);
        seen += results.rows.len() as u64;

        if results.rows.is_empty() {
            break;
        }

        let bar = ProgressBar::new(results.rows.len() as u64);
        bar.set_style(progress_style());
        bar.set_message(format!("page {}", page));

        for row in &results.rows {
            bar.inc(1);
            if cli.only_missing && known.contains(&row.idn) {
                summary.skipped_known += 1;
                continue;
            }
            if let Some(limit) = cli.limit {
                if summary.fetched >= limit {
                    bar.finish_and_clear();
                    eprintln!("Reached fetch limit of {}", limit);
                    break 'pages;
                }
            }
            match fetch_one(&client, &mut session, &row.idn, dumps).await {
                Ok(snapshot) => {
                    if !cli.no_save_files {
                        store
                            .save(&row.idn, &snapshot)
                            .with_context(|| format!("staging pages for {}", row.idn))?;
                    }
                    known.insert(row.idn.clone());
                    summary.fetched += 1;
                    queued.push((row.idn.clone(), snapshot));
                }
                Err(e) => {
                    eprintln!("Failed to fetch tender {}: {}", row.idn, e);
                    summary.failed_fetch += 1;
                }
            }
        }
        bar.finish_and_clear();
        eprintln!(
            "Listing page {} done ({} rows, {} fetched so far)",
            page,
            results.rows.len(),
            summary.fetched
        );

        if total.map(|t| seen >= t).unwrap_or(false) {
            break;
        }
        page += 1;
    }

    if session.renewed {
        eprintln!("Note: the portal dropped the session mid-run; it was renewed.");
    }
    Ok(window)
}

/// Fetches one tender's pages, retrying once when the detail page comes
/// back structurally broken. The portal occasionally serves a half
/// rendered page that a fresh request fixes.
async fn fetch_one(
    client: &MerPubClient,
    session: &mut Session,
    idn: &str,
    dumps: &DumpDir,
) -> Result<TenderSnapshot, ApiError> {
    match client.tender_snapshot(session, idn).await {
        Err(ApiError::Structure { what, body }) => {
            eprintln!("Detail for {} rejected ({}), retrying once", idn, what);
            dumps.write(&format!("detail_{}", idn), &body);
            client.tender_snapshot(session, idn).await
        }
        other => other,
    }
}

fn resolve_credentials(cli: &Cli) -> Result<Credentials> {
    let login = cli
        .login
        .clone()
        .or_else(|| std::env::var("MERPUB_RUT").ok())
        .context("missing login RUT: pass --login or set MERPUB_RUT")?;
    let password = cli
        .password
        .clone()
        .or_else(|| std::env::var("MERPUB_PASSWORD").ok())
        .context("missing password: pass --password or set MERPUB_PASSWORD")?;
    let rut = validation::validate_rut(&login).context("login RUT failed validation")?;
    Ok(Credentials::new(rut, password))
}

/// Accepts `sqlite://path` or a bare filesystem path.
fn database_path(raw: &str) -> Result<PathBuf> {
    if let Some(path) = raw.strip_prefix("sqlite://") {
        return Ok(PathBuf::from(path));
    }
    if raw.contains("://") {
        bail!("unsupported database '{}': only sqlite is supported", raw);
    }
    Ok(PathBuf::from(raw))
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::database_path;

    #[test]
    fn database_url_forms() {
        assert_eq!(
            database_path("sqlite://agiltender.db").unwrap(),
            std::path::PathBuf::from("agiltender.db")
        );
        assert_eq!(
            database_path("data/tenders.db").unwrap(),
            std::path::PathBuf::from("data/tenders.db")
        );
        assert!(database_path("postgres://localhost/tenders").is_err());
    }
}
