mod run;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;

#[derive(Parser)]
#[command(name = "agiltender")]
#[command(about = "Crawl agile tenders from Mercado Publico into SQLite")]
struct Cli {
    /// Crawl the portal; without it, only staged pages are parsed and merged
    #[arg(long)]
    scrape: bool,

    /// Portal login RUT (falls back to MERPUB_RUT)
    #[arg(short = 'l', long)]
    login: Option<String>,

    /// Portal password (falls back to MERPUB_PASSWORD)
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Window start, YYYY-MM-DD (inclusive)
    #[arg(long)]
    from: Option<String>,

    /// Window end, YYYY-MM-DD (inclusive)
    #[arg(long)]
    until: Option<String>,

    /// Relative window: the last N days up to today
    #[arg(long)]
    days_before: Option<i64>,

    /// Status filter: PUBLISHED, CLOSED, BO_EMITTED, CANCELLED or *
    #[arg(long, default_value = "*")]
    category: String,

    /// Stop after fetching this many new tenders
    #[arg(long)]
    limit: Option<usize>,

    /// Keep fetched pages in memory only; disables resuming from disk
    #[arg(long)]
    no_save_files: bool,

    /// Skip tenders already present in the database or the staging area
    #[arg(long)]
    only_missing: bool,

    /// Stop before the database stage
    #[arg(long)]
    no_merge: bool,

    /// sqlite://path or a bare file path
    #[arg(long, default_value = "sqlite://agiltender.db")]
    database: String,

    /// Staging area for fetched pages
    #[arg(long, default_value = "workdir")]
    work_dir: PathBuf,

    /// Where diagnostic dumps of rejected pages land
    #[arg(long, default_value = "dumps")]
    dump_dir: PathBuf,

    /// Log file receiving a copy of everything logged to stderr
    #[arg(long, default_value = "agiltender.log")]
    log_file: PathBuf,
}

/// Duplicates log output to stderr and, when it could be opened, the log
/// file.
struct TeeWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn init_tracing(log_file: &Path) {
    let file = match File::options().create(true).append(true).open(log_file) {
        Ok(file) => Some(Arc::new(Mutex::new(file))),
        Err(e) => {
            eprintln!(
                "Warning: cannot open log file {}: {}",
                log_file.display(),
                e
            );
            None
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agiltender_lib=info".parse().unwrap())
                .add_directive("merpub_api=info".parse().unwrap()),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(move || TeeWriter { file: file.clone() })
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_file);

    run::run(&cli).await
}
