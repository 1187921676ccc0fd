//! Disk staging for fetched tender pages.
//!
//! One directory per tender identifier, holding the detail page plus every
//! secondary artifact the crawl captured. The staged pages are what makes
//! the pipeline resumable: parse and merge run from here without touching
//! the network.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use merpub_api::{TenderSnapshot, VirtualFile};

/// Filename of the detail page inside a tender's directory. A directory
/// without it is not a staged tender.
const DETAIL_FILE: &str = "bid.html";
const SELECTED_MODAL_FILE: &str = "selected_modal.json";
const BUYING_ORDER_FILE: &str = "bo.html";
/// Provider exports keep their upstream filename; loading scans by prefix.
const PROVIDER_PREFIX: &str = "ProveedoresCotizacionCAgil_";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("identifier '{0}' cannot name a directory")]
    BadIdentifier(String),
    #[error("no staged pages for {0}")]
    NotStaged(String),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Directory-per-identifier staging area.
#[derive(Debug, Clone)]
pub struct PageStore {
    root: PathBuf,
}

impl PageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stages a snapshot, replacing whatever was staged for the identifier
    /// before. The directory is removed and rebuilt whole, so a re-crawl
    /// leaves exactly one copy and no stale members.
    pub fn save(&self, idn: &str, snapshot: &TenderSnapshot) -> Result<PathBuf, StoreError> {
        let dir = self.tender_dir(idn)?;
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        }
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        write_atomic(&dir.join(DETAIL_FILE), snapshot.detail_html.as_bytes())?;
        if let Some(file) = &snapshot.provider_listing {
            write_atomic(&dir.join(safe_filename(file)), &file.content)?;
        }
        for (i, modal) in snapshot.modals.iter().enumerate() {
            write_atomic(&dir.join(format!("modal_{}.json", i)), modal.as_bytes())?;
        }
        if let Some(modal) = &snapshot.selected_modal {
            write_atomic(&dir.join(SELECTED_MODAL_FILE), modal.as_bytes())?;
        }
        if let Some(page) = &snapshot.buying_order_html {
            write_atomic(&dir.join(BUYING_ORDER_FILE), page.as_bytes())?;
        }
        tracing::debug!("staged {} at {}", idn, dir.display());
        Ok(dir)
    }

    pub fn exists(&self, idn: &str) -> bool {
        self.tender_dir(idn)
            .map(|dir| dir.join(DETAIL_FILE).is_file())
            .unwrap_or(false)
    }

    /// Reassembles a staged snapshot. Optional members absent on disk come
    /// back as `None`; a missing detail page means the tender was never
    /// staged.
    pub fn load(&self, idn: &str) -> Result<TenderSnapshot, StoreError> {
        let dir = self.tender_dir(idn)?;
        let detail_path = dir.join(DETAIL_FILE);
        if !detail_path.is_file() {
            return Err(StoreError::NotStaged(idn.to_string()));
        }

        let mut snapshot = TenderSnapshot {
            detail_html: read_string(&detail_path)?,
            ..Default::default()
        };

        let mut i = 0;
        loop {
            let path = dir.join(format!("modal_{}.json", i));
            if !path.is_file() {
                break;
            }
            snapshot.modals.push(read_string(&path)?);
            i += 1;
        }

        let path = dir.join(SELECTED_MODAL_FILE);
        if path.is_file() {
            snapshot.selected_modal = Some(read_string(&path)?);
        }
        let path = dir.join(BUYING_ORDER_FILE);
        if path.is_file() {
            snapshot.buying_order_html = Some(read_string(&path)?);
        }

        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let entry = entry.map_err(io_err(&dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(PROVIDER_PREFIX) {
                let path = entry.path();
                snapshot.provider_listing = Some(VirtualFile {
                    filename: name,
                    content: fs::read(&path).map_err(io_err(&path))?,
                });
                break;
            }
        }

        Ok(snapshot)
    }

    /// Identifiers with staged pages, sorted.
    pub fn known_identifiers(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut ids = BTreeSet::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(io_err(&self.root)(e)),
        };
        for entry in entries {
            let entry = entry.map_err(io_err(&self.root))?;
            if entry.path().join(DETAIL_FILE).is_file() {
                ids.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(ids)
    }

    /// Loads every staged tender, sorted by identifier. This is the resume
    /// path when a run starts at the parse stage.
    pub fn load_all(&self) -> Result<Vec<(String, TenderSnapshot)>, StoreError> {
        let mut out = Vec::new();
        for idn in self.known_identifiers()? {
            let snapshot = self.load(&idn)?;
            out.push((idn, snapshot));
        }
        Ok(out)
    }

    fn tender_dir(&self, idn: &str) -> Result<PathBuf, StoreError> {
        let ok = !idn.is_empty()
            && idn
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !ok {
            return Err(StoreError::BadIdentifier(idn.to_string()));
        }
        Ok(self.root.join(idn))
    }
}

/// Temp file in the same directory, then rename: readers never observe a
/// half-written member.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}

fn read_string(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(io_err(path))
}

/// Upstream filenames are kept, but only the final path component.
fn safe_filename(file: &VirtualFile) -> String {
    Path::new(&file.filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}export.xls", PROVIDER_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_snapshot() -> TenderSnapshot {
        TenderSnapshot {
            detail_html: "<html>detail</html>".to_string(),
            provider_listing: Some(VirtualFile {
                filename: "ProveedoresCotizacionCAgil_1057-430-AG26.xls".to_string(),
                content: b"<table>quotes</table>".to_vec(),
            }),
            modals: vec!["{\"d\":\"{}\"}".to_string(), "{\"d\":\"{}\"}".to_string()],
            selected_modal: Some("{\"d\":\"{}\"}".to_string()),
            buying_order_html: Some("<html>bo</html>".to_string()),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PageStore::new(dir.path());
        let snapshot = full_snapshot();

        store.save("1057-430-AG26", &snapshot).expect("save");
        assert!(store.exists("1057-430-AG26"));
        let loaded = store.load("1057-430-AG26").expect("load");
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn save_replaces_stale_members() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PageStore::new(dir.path());

        store.save("1057-430-AG26", &full_snapshot()).expect("save");
        let bare = TenderSnapshot {
            detail_html: "<html>v2</html>".to_string(),
            ..Default::default()
        };
        store.save("1057-430-AG26", &bare).expect("save again");

        let loaded = store.load("1057-430-AG26").expect("load");
        assert_eq!(loaded, bare);
        assert!(loaded.modals.is_empty());
        assert!(loaded.provider_listing.is_none());
    }

    #[test]
    fn load_without_staging_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PageStore::new(dir.path());
        assert!(matches!(
            store.load("1057-999-AG26"),
            Err(StoreError::NotStaged(_))
        ));
        assert!(!store.exists("1057-999-AG26"));
    }

    #[test]
    fn known_identifiers_skips_directories_without_detail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PageStore::new(dir.path());
        store.save("1057-1-AG26", &full_snapshot()).expect("save");
        fs::create_dir(dir.path().join("leftover")).expect("mkdir");

        let ids = store.known_identifiers().expect("ids");
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("1057-1-AG26"));
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PageStore::new(dir.path().join("not-created-yet"));
        assert!(store.known_identifiers().expect("ids").is_empty());
        assert!(store.load_all().expect("load_all").is_empty());
    }

    #[test]
    fn hostile_identifier_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PageStore::new(dir.path());
        assert!(matches!(
            store.save("../escape", &full_snapshot()),
            Err(StoreError::BadIdentifier(_))
        ));
        assert!(matches!(
            store.load(""),
            Err(StoreError::BadIdentifier(_))
        ));
    }

    #[test]
    fn load_all_returns_sorted_pairs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PageStore::new(dir.path());
        store.save("1057-2-AG26", &full_snapshot()).expect("save");
        store.save("1057-1-AG26", &full_snapshot()).expect("save");

        let all = store.load_all().expect("load_all");
        let ids: Vec<&str> = all.iter().map(|(idn, _)| idn.as_str()).collect();
        assert_eq!(ids, vec!["1057-1-AG26", "1057-2-AG26"]);
    }
}
