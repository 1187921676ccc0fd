//! SQLite storage for crawled tenders.

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::model::TenderRecord;

const SQL_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
const SQL_DATE_FMT: &str = "%Y-%m-%d";

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// What an upsert did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
}

/// Tally of one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for tests).
    #[doc(hidden)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn init(&self) -> Result<(), DbError> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        let schema = include_str!("../../schema/sqlite.sql");
        self.conn.execute_batch(schema)?;

        if version < 1 {
            self.conn.pragma_update(None, "user_version", 1)?;
        }
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>, DbError> {
        self.conn
            .query_row(
                "SELECT value FROM crawl_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO crawl_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Identifiers already merged, for skipping known tenders on re-crawl.
    pub fn known_tender_ids(&self) -> Result<BTreeSet<String>, DbError> {
        let mut stmt = self.conn.prepare("SELECT idn FROM tenders")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = BTreeSet::new();
        for idn in rows {
            ids.insert(idn?);
        }
        Ok(ids)
    }

    pub fn tender_count(&self) -> Result<i64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(1) FROM tenders", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Upserts one tender and all of its children in a single transaction.
    ///
    /// The tender row merges field by field: a freshly parsed value wins,
    /// a `None` never clobbers what an earlier merge stored. Children
    /// (products, applications, their items) are replaced whole, since the
    /// page always renders the complete set.
    pub fn upsert_tender(&mut self, record: &TenderRecord) -> Result<MergeOutcome, DbError> {
        let tx = self.conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT idn FROM tenders WHERE idn = ?1",
                params![record.idn],
                |row| row.get(0),
            )
            .optional()?;

        {
            let mut stmt_org = tx.prepare(
                "INSERT INTO organizations (rut, name) VALUES (?1, ?2)
                 ON CONFLICT(rut) DO UPDATE SET
                   name = COALESCE(excluded.name, organizations.name)",
            )?;
            let mut stmt_tender = tx.prepare(
                "INSERT INTO tenders (
                   idn, status, title, summary, published_at, closed_at,
                   delivery_days, budget_amount, budget_currency,
                   organization_rut, organization_name,
                   contact_name, contact_surnames, contact_email, contact_phone
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(idn) DO UPDATE SET
                   status = COALESCE(excluded.status, tenders.status),
                   title = COALESCE(excluded.title, tenders.title),
                   summary = COALESCE(excluded.summary, tenders.summary),
                   published_at = COALESCE(excluded.published_at, tenders.published_at),
                   closed_at = COALESCE(excluded.closed_at, tenders.closed_at),
                   delivery_days = COALESCE(excluded.delivery_days, tenders.delivery_days),
                   budget_amount = COALESCE(excluded.budget_amount, tenders.budget_amount),
                   budget_currency = COALESCE(excluded.budget_currency, tenders.budget_currency),
                   organization_rut = COALESCE(excluded.organization_rut, tenders.organization_rut),
                   organization_name = COALESCE(excluded.organization_name, tenders.organization_name),
                   contact_name = COALESCE(excluded.contact_name, tenders.contact_name),
                   contact_surnames = COALESCE(excluded.contact_surnames, tenders.contact_surnames),
                   contact_email = COALESCE(excluded.contact_email, tenders.contact_email),
                   contact_phone = COALESCE(excluded.contact_phone, tenders.contact_phone),
                   updated_at = datetime('now')",
            )?;
            let mut stmt_application = tx.prepare(
                "INSERT INTO applications (
                   tender_idn, seq, organization_rut, organization_name,
                   sent_at, summary, accepted, total_amount, total_currency
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            let mut stmt_item = tx.prepare(
                "INSERT INTO application_items (
                   tender_idn, application_seq, product_ord, unit_amount, unit_currency
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut stmt_product = tx.prepare(
                "INSERT INTO products (tender_idn, ord, type_code, title, quantity)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            if let Some(rut) = &record.organization.rut {
                stmt_org.execute(params![rut, record.organization.name])?;
            }

            stmt_tender.execute(params![
                record.idn,
                record.status.map(|s| s.code()),
                record.title,
                record.summary,
                record
                    .published
                    .map(|dt| dt.format(SQL_DATETIME_FMT).to_string()),
                record
                    .closed
                    .map(|dt| dt.format(SQL_DATETIME_FMT).to_string()),
                record.delivery_days,
                record.budget.as_ref().map(|m| m.amount),
                record.budget.as_ref().map(|m| m.currency.as_str()),
                record.organization.rut,
                record.organization.name,
                record.contact.name,
                record.contact.surnames,
                record.contact.email,
                record.contact.phone
            ])?;

            tx.execute(
                "DELETE FROM products WHERE tender_idn = ?1",
                params![record.idn],
            )?;
            for product in &record.products {
                stmt_product.execute(params![
                    record.idn,
                    product.ord,
                    product.type_code,
                    product.title,
                    product.quantity
                ])?;
            }

            tx.execute(
                "DELETE FROM application_items WHERE tender_idn = ?1",
                params![record.idn],
            )?;
            tx.execute(
                "DELETE FROM applications WHERE tender_idn = ?1",
                params![record.idn],
            )?;
            for (i, application) in record.applications.iter().enumerate() {
                if let Some(rut) = &application.organization.rut {
                    stmt_org.execute(params![rut, application.organization.name])?;
                }
                let seq = (i + 1) as i64;
                stmt_application.execute(params![
                    record.idn,
                    seq,
                    application.organization.rut,
                    application.organization.name,
                    application.sent.map(|d| d.format(SQL_DATE_FMT).to_string()),
                    application.summary,
                    application.accepted,
                    application.total.as_ref().map(|m| m.amount),
                    application.total.as_ref().map(|m| m.currency.as_str())
                ])?;
                for item in &application.items {
                    stmt_item.execute(params![
                        record.idn,
                        seq,
                        item.product_ord,
                        item.unit.as_ref().map(|m| m.amount),
                        item.unit.as_ref().map(|m| m.currency.as_str())
                    ])?;
                }
            }
        }

        tx.commit()?;
        Ok(if existing.is_some() {
            MergeOutcome::Updated
        } else {
            MergeOutcome::Inserted
        })
    }

    /// Merges a batch, isolating failures: one bad record rolls back its
    /// own transaction and the rest still land.
    pub fn merge(&mut self, records: &[TenderRecord]) -> MergeReport {
        let mut report = MergeReport::default();
        for record in records {
            match self.upsert_tender(record) {
                Ok(MergeOutcome::Inserted) => report.inserted += 1,
                Ok(MergeOutcome::Updated) => report.updated += 1,
                Err(e) => {
                    tracing::error!("merge failed for {}: {}", record.idn, e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Application, ApplicationItem, Contact, Money, Organization, Product,
    };
    use chrono::NaiveDate;
    use merpub_api::TenderStatus;

    fn clp(amount: f64) -> Option<Money> {
        Some(Money {
            amount,
            currency: "clp".to_string(),
        })
    }

    fn make_record(idn: &str) -> TenderRecord {
        TenderRecord {
            idn: idn.to_string(),
            status: Some(TenderStatus::BoEmitted),
            title: Some("Compra de guantes de nitrilo".to_string()),
            summary: Some("Guantes y mascarillas".to_string()),
            published: NaiveDate::from_ymd_opt(2026, 8, 12)
                .and_then(|d| d.and_hms_opt(10, 30, 0)),
            closed: NaiveDate::from_ymd_opt(2026, 8, 19).and_then(|d| d.and_hms_opt(15, 0, 0)),
            delivery_days: Some(10),
            budget: clp(1_500_000.0),
            organization: Organization {
                rut: Some("61.606.200-K".to_string()),
                name: Some("Hospital Regional de Antofagasta".to_string()),
            },
            contact: Contact {
                name: Some("María José".to_string()),
                surnames: Some("de la Fuente Rojas".to_string()),
                email: Some("mjfuente@hospital.cl".to_string()),
                phone: Some("+56 9 8765 4321".to_string()),
            },
            products: vec![
                Product {
                    ord: 1,
                    type_code: Some(42132203),
                    title: "Guantes de nitrilo".to_string(),
                    quantity: Some(500),
                },
                Product {
                    ord: 2,
                    type_code: Some(42131713),
                    title: "Mascarillas".to_string(),
                    quantity: Some(100),
                },
            ],
            applications: vec![
                Application {
                    organization: Organization {
                        rut: Some("76.123.456-0".to_string()),
                        name: Some("COMERCIAL ANDES SPA".to_string()),
                    },
                    sent: NaiveDate::from_ymd_opt(2026, 8, 15),
                    summary: Some("Despacho en 5 dias habiles.".to_string()),
                    accepted: Some(true),
                    total: clp(178_500.0),
                    items: vec![
                        ApplicationItem {
                            product_ord: 1,
                            unit: clp(300.0),
                        },
                        ApplicationItem {
                            product_ord: 2,
                            unit: clp(150.0),
                        },
                    ],
                },
                Application {
                    organization: Organization {
                        rut: Some("77.890.123-4".to_string()),
                        name: Some("SUMINISTROS DEL SUR LTDA".to_string()),
                    },
                    sent: NaiveDate::from_ymd_opt(2026, 8, 16),
                    summary: None,
                    accepted: Some(false),
                    total: clp(200_600.0),
                    items: vec![ApplicationItem {
                        product_ord: 1,
                        unit: clp(320.0),
                    }],
                },
            ],
        }
    }

    fn test_db() -> Db {
        let db = Db::open_in_memory().expect("open");
        db.init().expect("init");
        db
    }

    fn count(db: &Db, sql: &str) -> i64 {
        db.conn()
            .query_row(sql, [], |row| row.get(0))
            .expect("count query")
    }

    #[test]
    fn init_is_idempotent() {
        let db = test_db();
        db.init().expect("re-init");
        assert_eq!(db.tender_count().expect("count"), 0);
    }

    #[test]
    fn first_upsert_inserts_everything() {
        let mut db = test_db();
        let outcome = db.upsert_tender(&make_record("1057-430-AG26")).expect("upsert");
        assert_eq!(outcome, MergeOutcome::Inserted);

        assert_eq!(count(&db, "SELECT COUNT(1) FROM tenders"), 1);
        assert_eq!(count(&db, "SELECT COUNT(1) FROM products"), 2);
        assert_eq!(count(&db, "SELECT COUNT(1) FROM applications"), 2);
        assert_eq!(count(&db, "SELECT COUNT(1) FROM application_items"), 3);
        // Buyer plus both providers.
        assert_eq!(count(&db, "SELECT COUNT(1) FROM organizations"), 3);

        let status: i64 = db
            .conn()
            .query_row(
                "SELECT status FROM tenders WHERE idn = '1057-430-AG26'",
                [],
                |row| row.get(0),
            )
            .expect("status");
        assert_eq!(status, TenderStatus::BoEmitted.code());

        let ids = db.known_tender_ids().expect("ids");
        assert!(ids.contains("1057-430-AG26"));
    }

    #[test]
    fn second_upsert_updates_and_replaces_children() {
        let mut db = test_db();
        db.upsert_tender(&make_record("1057-430-AG26")).expect("first");
        db.conn()
            .execute(
                "UPDATE tenders SET created_at = '2020-01-01 00:00:00' WHERE idn = '1057-430-AG26'",
                [],
            )
            .expect("pin created_at");

        let mut record = make_record("1057-430-AG26");
        record.title = Some("Compra de guantes (rectificada)".to_string());
        record.products.truncate(1);
        let outcome = db.upsert_tender(&record).expect("second");
        assert_eq!(outcome, MergeOutcome::Updated);

        assert_eq!(count(&db, "SELECT COUNT(1) FROM tenders"), 1);
        assert_eq!(count(&db, "SELECT COUNT(1) FROM products"), 1);

        let (title, created_at): (String, String) = db
            .conn()
            .query_row(
                "SELECT title, created_at FROM tenders WHERE idn = '1057-430-AG26'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("row");
        assert_eq!(title, "Compra de guantes (rectificada)");
        assert_eq!(created_at, "2020-01-01 00:00:00");
    }

    #[test]
    fn none_never_clobbers_stored_fields() {
        let mut db = test_db();
        db.upsert_tender(&make_record("1057-430-AG26")).expect("first");

        let sparse = TenderRecord {
            idn: "1057-430-AG26".to_string(),
            status: Some(TenderStatus::Cancelled),
            title: None,
            summary: None,
            published: None,
            closed: None,
            delivery_days: None,
            budget: None,
            organization: Organization::default(),
            contact: Contact::default(),
            products: Vec::new(),
            applications: Vec::new(),
        };
        db.upsert_tender(&sparse).expect("second");

        let (status, title): (i64, String) = db
            .conn()
            .query_row(
                "SELECT status, title FROM tenders WHERE idn = '1057-430-AG26'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("row");
        assert_eq!(status, TenderStatus::Cancelled.code());
        assert_eq!(title, "Compra de guantes de nitrilo");
        // Children mirror the latest parse, even when it is empty.
        assert_eq!(count(&db, "SELECT COUNT(1) FROM products"), 0);
        assert_eq!(count(&db, "SELECT COUNT(1) FROM applications"), 0);
    }

    #[test]
    fn merge_isolates_bad_records() {
        let mut db = test_db();
        let good = make_record("1057-430-AG26");
        let mut bad = make_record("1057-431-AG26");
        // Duplicate product position violates the products primary key.
        bad.products[1].ord = 1;
        let also_good = make_record("1057-432-AG26");

        let report = db.merge(&[good, bad, also_good]);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.failed, 1);

        let ids = db.known_tender_ids().expect("ids");
        assert!(ids.contains("1057-430-AG26"));
        assert!(!ids.contains("1057-431-AG26"));
        assert!(ids.contains("1057-432-AG26"));
    }

    #[test]
    fn merge_counts_updates() {
        let mut db = test_db();
        db.upsert_tender(&make_record("1057-430-AG26")).expect("seed");

        let report = db.merge(&[make_record("1057-430-AG26"), make_record("1057-433-AG26")]);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(db.tender_count().expect("count"), 2);
    }

    #[test]
    fn meta_round_trip() {
        let db = test_db();
        assert_eq!(db.get_meta("last_crawl_until").expect("get"), None);
        db.set_meta("last_crawl_until", "2026-08-25").expect("set");
        assert_eq!(
            db.get_meta("last_crawl_until").expect("get"),
            Some("2026-08-25".to_string())
        );
        db.set_meta("last_crawl_until", "2026-08-26").expect("overwrite");
        assert_eq!(
            db.get_meta("last_crawl_until").expect("get"),
            Some("2026-08-26".to_string())
        );
    }
}
