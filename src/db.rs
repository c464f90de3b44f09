use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{error, info};

use crate::config::{LoadMode, WarehouseConfig};
use crate::error::LoadError;
use crate::parser::transform::ResultTable;

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

const RUNS_TABLE: &str = "ETL_RUNS";

/// Terminal status of the load stage.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    /// Rows appended to the destination table.
    Loaded { rows: usize },
    /// Connection verified, nothing written.
    Checked { rows: usize },
    Failed { reason: String },
}

impl LoadStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, LoadStatus::Failed { .. })
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Loaded { rows } => write!(f, "loaded {} rows", rows),
            LoadStatus::Checked { rows } => {
                write!(f, "connection ok, {} rows ready (check-only, nothing written)", rows)
            }
            LoadStatus::Failed { reason } => write!(f, "load failed: {}", reason),
        }
    }
}

pub struct Loader {
    config: WarehouseConfig,
}

impl Loader {
    pub fn new(config: WarehouseConfig) -> Loader {
        Loader { config }
    }

    /// Write or check, depending on the configured mode. Errors never escape;
    /// they come back as [`LoadStatus::Failed`].
    pub fn load(&self, table: &ResultTable) -> LoadStatus {
        match self.try_load(table) {
            Ok(status) => {
                info!("{}", status);
                status
            }
            Err(e) => {
                error!("Load failed: {}", e);
                LoadStatus::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn try_load(&self, table: &ResultTable) -> Result<LoadStatus, LoadError> {
        let schema = identifier(&self.config.schema)?;
        let name = identifier(&self.config.table)?;
        // Connection (and any statement/transaction) is dropped on every return path.
        let mut conn = self.connect()?;

        match self.config.mode {
            LoadMode::CheckOnly => {
                conn.query_row(
                    &format!("SELECT count(*) FROM {}.sqlite_master", schema),
                    [],
                    |row| row.get::<_, i64>(0),
                )?;
                Ok(LoadStatus::Checked { rows: table.len() })
            }
            LoadMode::Write => {
                let rows = write_table(&mut conn, schema, name, table, &self.config)?;
                Ok(LoadStatus::Loaded { rows })
            }
        }
    }

    fn connect(&self) -> Result<Connection, LoadError> {
        let path = Path::new(&self.config.database);
        info!(
            user = ?self.config.user,
            account = ?self.config.account,
            warehouse = ?self.config.warehouse,
            role = ?self.config.role,
            database = %path.display(),
            mode = self.config.mode.as_str(),
            "Connecting to warehouse"
        );

        let conn = match self.config.mode {
            // Check-only never creates the database file.
            LoadMode::CheckOnly if !path.exists() => {
                return Err(LoadError::NotInitialised(path.display().to_string()))
            }
            LoadMode::CheckOnly => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
            LoadMode::Write => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                Connection::open(path)?
            }
        };
        Ok(conn)
    }
}

fn identifier(name: &str) -> Result<&str, LoadError> {
    if IDENT_RE.is_match(name) {
        Ok(name)
    } else {
        Err(LoadError::InvalidIdentifier(name.to_string()))
    }
}

/// Create-if-missing then append, all in one transaction.
fn write_table(
    conn: &mut Connection,
    schema: &str,
    name: &str,
    table: &ResultTable,
    config: &WarehouseConfig,
) -> Result<usize, LoadError> {
    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {schema}.{name} (
            TITLE       TEXT,
            PRICE       REAL,
            DESCRIPTION TEXT,
            WEIGHT      REAL,
            RATING      REAL,
            NUM_REVIEWS INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS {schema}.{RUNS_TABLE} (
            RUN_ID      TEXT PRIMARY KEY,
            TARGET      TEXT NOT NULL,
            MODE        TEXT NOT NULL,
            ROW_COUNT   INTEGER NOT NULL,
            LOADED_BY   TEXT,
            COMPUTE     TEXT,
            LOADED_AT   TEXT NOT NULL
        );
        "
    ))?;

    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {schema}.{name} (TITLE, PRICE, DESCRIPTION, WEIGHT, RATING, NUM_REVIEWS)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ))?;
        for row in &table.rows {
            insert.execute(params![
                row.title,
                row.price,
                row.description,
                row.weight,
                row.rating,
                row.num_reviews,
            ])?;
        }
    }

    let now = Utc::now();
    tx.execute(
        &format!(
            "INSERT INTO {schema}.{RUNS_TABLE} (RUN_ID, TARGET, MODE, ROW_COUNT, LOADED_BY, COMPUTE, LOADED_AT)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params![
            new_run_id(now),
            format!("{}.{}", schema, name),
            config.mode.as_str(),
            table.len() as i64,
            config.user,
            config.warehouse,
            now.to_rfc3339(),
        ],
    )?;
    tx.commit()?;
    Ok(table.len())
}

fn new_run_id(now: chrono::DateTime<Utc>) -> String {
    format!("run-{}", now.format("%Y%m%dT%H%M%S%.6fZ"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::transform::ItemRecord;

    fn config(dir: &Path, mode: LoadMode) -> WarehouseConfig {
        WarehouseConfig {
            user: Some("loader".into()),
            password: Some("secret".into()),
            account: None,
            warehouse: Some("COMPUTE_WH".into()),
            role: None,
            database: dir.join("warehouse.sqlite").to_string_lossy().into_owned(),
            schema: "main".into(),
            table: "BAKERY_ITEMS".into(),
            mode,
        }
    }

    fn table() -> ResultTable {
        let mut t = ResultTable::empty();
        t.rows.push(ItemRecord {
            title: Some("Cake A".into()),
            price: Some(1234.56),
            description: Some("Delicious Sweet".into()),
            weight: None,
            rating: Some(4.5),
            num_reviews: 10,
        });
        t.rows.push(ItemRecord {
            title: Some("Pie".into()),
            price: Some(5.98),
            description: None,
            weight: Some(24.0),
            rating: None,
            num_reviews: 0,
        });
        t
    }

    fn count(db: &str, sql: &str) -> i64 {
        let conn = Connection::open(db).unwrap();
        conn.query_row(sql, [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn write_creates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), LoadMode::Write);
        let db = cfg.database.clone();
        let loader = Loader::new(cfg);

        assert_eq!(loader.load(&table()), LoadStatus::Loaded { rows: 2 });
        assert_eq!(loader.load(&table()), LoadStatus::Loaded { rows: 2 });

        assert_eq!(count(&db, "SELECT count(*) FROM BAKERY_ITEMS"), 4);
        assert_eq!(count(&db, "SELECT count(*) FROM ETL_RUNS"), 2);
        assert_eq!(
            count(&db, "SELECT count(*) FROM BAKERY_ITEMS WHERE RATING IS NULL AND NUM_REVIEWS = 0"),
            2
        );
    }

    #[test]
    fn written_values_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), LoadMode::Write);
        let db = cfg.database.clone();
        Loader::new(cfg).load(&table());

        let conn = Connection::open(&db).unwrap();
        let (title, price, weight): (String, f64, Option<f64>) = conn
            .query_row(
                "SELECT TITLE, PRICE, WEIGHT FROM BAKERY_ITEMS WHERE TITLE = 'Pie'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(title, "Pie");
        assert_eq!(price, 5.98);
        assert_eq!(weight, Some(24.0));
    }

    #[test]
    fn check_only_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), LoadMode::CheckOnly);
        let db = cfg.database.clone();
        Connection::open(&db).unwrap();

        let status = Loader::new(cfg).load(&table());
        assert_eq!(status, LoadStatus::Checked { rows: 2 });
        assert_eq!(
            count(&db, "SELECT count(*) FROM sqlite_master WHERE name = 'BAKERY_ITEMS'"),
            0
        );
    }

    #[test]
    fn check_only_missing_database_is_not_initialised() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), LoadMode::CheckOnly);
        let loader = Loader::new(cfg);

        assert!(matches!(
            loader.try_load(&table()),
            Err(LoadError::NotInitialised(path)) if path.ends_with("warehouse.sqlite")
        ));
        match loader.load(&table()) {
            LoadStatus::Failed { reason } => assert!(reason.contains("not initialised")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!dir.path().join("warehouse.sqlite").exists());
    }

    #[test]
    fn check_only_unreadable_database_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), LoadMode::CheckOnly);
        // A directory exists at the path but cannot be opened as a database.
        cfg.database = dir.path().to_string_lossy().into_owned();

        let err = Loader::new(cfg).try_load(&table()).unwrap_err();
        assert!(matches!(err, LoadError::Sqlite(_)), "{}", err);
    }

    #[test]
    fn check_only_succeeds_after_first_write() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Loader::new(config(dir.path(), LoadMode::Write)).load(&table()).is_success());
        assert_eq!(
            Loader::new(config(dir.path(), LoadMode::CheckOnly)).load(&table()),
            LoadStatus::Checked { rows: 2 }
        );
    }

    #[test]
    fn unknown_schema_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), LoadMode::Write);
        cfg.schema = "analytics".into();
        match Loader::new(cfg).load(&table()) {
            LoadStatus::Failed { reason } => assert!(reason.contains("analytics")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn bad_identifier_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), LoadMode::Write);
        cfg.table = "ITEMS; DROP TABLE x".into();
        let status = Loader::new(cfg).load(&table());
        assert!(matches!(status, LoadStatus::Failed { .. }));
        assert!(!dir.path().join("warehouse.sqlite").exists());
    }

    #[test]
    fn write_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), LoadMode::Write);
        cfg.database = dir.path().join("nested/wh.sqlite").to_string_lossy().into_owned();
        assert!(Loader::new(cfg).load(&ResultTable::empty()).is_success());
        assert!(dir.path().join("nested/wh.sqlite").exists());
    }
}
