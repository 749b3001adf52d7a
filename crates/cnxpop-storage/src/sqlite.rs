//! SQLite-backed archive store

use crate::{ArchiveStore, ArchiveTransaction, ArchiveWriter, NewUnit, StoreError};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("schema.sql");

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a store from a connection string.
    ///
    /// Accepts a filesystem path, optionally prefixed with `sqlite:` or
    /// `sqlite://`, or `:memory:` / `sqlite::memory:` for a private
    /// in-memory database.
    pub fn open(conn_str: &str) -> Result<Self, StoreError> {
        let target = conn_str.trim();
        let target = target
            .strip_prefix("sqlite://")
            .or_else(|| target.strip_prefix("sqlite:"))
            .unwrap_or(target);

        match target {
            "" => Err(StoreError::InvalidConnection(conn_str.to_string())),
            ":memory:" => Self::open_in_memory(),
            path => Self::open_path(Path::new(path)),
        }
    }

    pub fn open_path(path: &Path) -> Result<Self, StoreError> {
        debug!(path = %path.display(), "opening sqlite archive store");
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Create any missing tables and seed the reference licenses and subject tags.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        debug!("archive schema ensured");
        Ok(())
    }

    // ========================================================================
    // Read-back
    // ========================================================================

    pub fn units(&self) -> Result<Vec<StoredUnit>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {UNIT_COLUMNS} FROM modules ORDER BY module_ident"
        ))?;
        let units = stmt
            .query_map([], StoredUnit::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(units)
    }

    pub fn find_units(&self, legacy_id: &str) -> Result<Vec<StoredUnit>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {UNIT_COLUMNS} FROM modules WHERE moduleid = ?1 ORDER BY module_ident"
        ))?;
        let units = stmt
            .query_map([legacy_id], StoredUnit::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(units)
    }

    pub fn abstract_text(&self, abstract_id: i64) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT abstract FROM abstracts WHERE abstractid = ?1",
                [abstract_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn unit_files(&self, ident: i64) -> Result<Vec<StoredFile>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT mf.fileid, mf.filename, mf.mimetype, length(f.file)
             FROM module_files mf JOIN files f ON f.fileid = mf.fileid
             WHERE mf.module_ident = ?1
             ORDER BY mf.rowid",
        )?;
        let files = stmt
            .query_map([ident], |row| {
                Ok(StoredFile {
                    file_id: row.get(0)?,
                    filename: row.get(1)?,
                    mimetype: row.get(2)?,
                    size: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    pub fn unit_keywords(&self, ident: i64) -> Result<Vec<String>, StoreError> {
        self.strings(
            "SELECT k.word FROM modulekeywords mk JOIN keywords k ON k.keywordid = mk.keywordid
             WHERE mk.module_ident = ?1 ORDER BY k.word",
            ident,
        )
    }

    pub fn unit_tags(&self, ident: i64) -> Result<Vec<String>, StoreError> {
        self.strings(
            "SELECT t.tag FROM moduletags mt JOIN tags t ON t.tagid = mt.tagid
             WHERE mt.module_ident = ?1 ORDER BY t.tag",
            ident,
        )
    }

    /// Number of keyword rows with exactly this text.
    pub fn keyword_rows(&self, word: &str) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT count(*) FROM keywords WHERE word = ?1",
            [word],
            |row| row.get(0),
        )?)
    }

    fn strings(&self, sql: &str, ident: i64) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let values = stmt
            .query_map([ident], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(values)
    }
}

impl ArchiveStore for SqliteStore {
    type Transaction<'a>
        = SqliteTransaction<'a>
    where
        Self: 'a;

    fn begin(&mut self) -> Result<SqliteTransaction<'_>, StoreError> {
        Ok(SqliteTransaction {
            tx: self.conn.transaction()?,
        })
    }
}

pub struct SqliteTransaction<'a> {
    tx: rusqlite::Transaction<'a>,
}

impl ArchiveTransaction for SqliteTransaction<'_> {
    fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }
}

impl ArchiveWriter for SqliteTransaction<'_> {
    fn insert_abstract(&mut self, text: &str) -> Result<i64, StoreError> {
        Ok(self.tx.query_row(
            "INSERT INTO abstracts (abstract) VALUES (?1) RETURNING abstractid",
            [text],
            |row| row.get(0),
        )?)
    }

    fn find_license(&mut self, url: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT licenseid FROM licenses WHERE url = ?1",
                [url],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn insert_unit(&mut self, unit: &NewUnit<'_>) -> Result<i64, StoreError> {
        let md = unit.metadata;
        let authors = serde_json::to_string(&md.roles.authors)?;
        let maintainers = serde_json::to_string(&md.roles.maintainers)?;
        let licensors = serde_json::to_string(&md.roles.licensors)?;

        Ok(self.tx.query_row(
            "INSERT INTO modules (
                module_ident, portal_type, moduleid, uuid, version, name,
                created, revised, abstractid, licenseid,
                doctype, submitter, submitlog, language,
                authors, maintainers, licensors
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             RETURNING module_ident",
            params![
                unit.ident,
                md.portal_type.as_str(),
                md.legacy_id,
                unit.uuid.to_string(),
                md.version,
                md.title,
                md.created.as_deref(),
                md.revised.as_deref(),
                unit.abstract_id,
                unit.license_id,
                md.doctype,
                md.submitter,
                md.submitlog,
                md.language,
                authors,
                maintainers,
                licensors,
            ],
            |row| row.get(0),
        )?)
    }

    fn insert_file(&mut self, bytes: &[u8]) -> Result<i64, StoreError> {
        Ok(self.tx.query_row(
            "INSERT INTO files (file) VALUES (?1) RETURNING fileid",
            [bytes],
            |row| row.get(0),
        )?)
    }

    fn insert_file_association(
        &mut self,
        ident: i64,
        file_id: i64,
        filename: &str,
        mimetype: &str,
    ) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO module_files (module_ident, fileid, filename, mimetype)
             VALUES (?1, ?2, ?3, ?4)",
            params![ident, file_id, filename, mimetype],
        )?;
        Ok(())
    }

    fn find_tag(&mut self, tag: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .tx
            .query_row("SELECT tagid FROM tags WHERE tag = ?1", [tag], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn insert_unit_tag(&mut self, ident: i64, tag_id: i64) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT OR IGNORE INTO moduletags (module_ident, tagid) VALUES (?1, ?2)",
            params![ident, tag_id],
        )?;
        Ok(())
    }

    fn find_keyword(&mut self, word: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT keywordid FROM keywords WHERE word = ?1",
                [word],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn insert_keyword(&mut self, word: &str) -> Result<i64, StoreError> {
        Ok(self.tx.query_row(
            "INSERT INTO keywords (word) VALUES (?1) RETURNING keywordid",
            [word],
            |row| row.get(0),
        )?)
    }

    fn insert_unit_keyword(&mut self, ident: i64, keyword_id: i64) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT OR IGNORE INTO modulekeywords (module_ident, keywordid) VALUES (?1, ?2)",
            params![ident, keyword_id],
        )?;
        Ok(())
    }
}

// ============================================================================
// Read-back rows
// ============================================================================

const UNIT_COLUMNS: &str = "module_ident, portal_type, moduleid, uuid, version, name, language, \
                            abstractid, licenseid, authors, maintainers, licensors";

/// A `modules` row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUnit {
    pub ident: i64,
    pub portal_type: String,
    pub legacy_id: String,
    pub uuid: Uuid,
    pub version: String,
    pub title: String,
    pub language: String,
    pub abstract_id: Option<i64>,
    pub license_id: i64,
    pub authors: Vec<String>,
    pub maintainers: Vec<String>,
    pub licensors: Vec<String>,
}

impl StoredUnit {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let uuid: String = row.get(3)?;
        let uuid = Uuid::parse_str(&uuid)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

        Ok(Self {
            ident: row.get(0)?,
            portal_type: row.get(1)?,
            legacy_id: row.get(2)?,
            uuid,
            version: row.get(4)?,
            title: row.get(5)?,
            language: row.get(6)?,
            abstract_id: row.get(7)?,
            license_id: row.get(8)?,
            authors: role_list(row, 9)?,
            maintainers: role_list(row, 10)?,
            licensors: role_list(row, 11)?,
        })
    }
}

fn role_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// A file attached to a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_id: i64,
    pub filename: String,
    pub mimetype: String,
    pub size: i64,
}
