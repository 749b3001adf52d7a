//! Destination archive store
//!
//! The populator writes through [`ArchiveWriter`]; each logical group of
//! writes (one module, or the collection) runs inside one
//! [`ArchiveTransaction`] obtained from an [`ArchiveStore`] and is committed
//! explicitly. Dropping an uncommitted transaction rolls it back.
//!
//! Licenses and tags are reference data: the writer can look them up but has
//! no way to create them. Keywords are looked up and created on demand.
//!
//! [`SqliteStore`] is the bundled implementation (`rusqlite`).

pub mod sqlite;


use cnxpop_model::UnitMetadata;
use uuid::Uuid;

pub use sqlite::{SqliteStore, SqliteTransaction, StoredFile, StoredUnit};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to encode role list: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid store connection string `{0}`")]
    InvalidConnection(String),
}

/// A unit row ready for insertion.
#[derive(Debug, Clone)]
pub struct NewUnit<'a> {
    pub metadata: &'a UnitMetadata,
    pub uuid: Uuid,
    /// Known local identity; `None` lets the store assign one.
    pub ident: Option<i64>,
    pub abstract_id: Option<i64>,
    pub license_id: i64,
}

/// Row-level writes and lookups used while populating one unit.
pub trait ArchiveWriter {
    fn insert_abstract(&mut self, text: &str) -> Result<i64, StoreError>;

    fn find_license(&mut self, url: &str) -> Result<Option<i64>, StoreError>;

    /// Insert the unit row and return its local identity.
    fn insert_unit(&mut self, unit: &NewUnit<'_>) -> Result<i64, StoreError>;

    fn insert_file(&mut self, bytes: &[u8]) -> Result<i64, StoreError>;

    fn insert_file_association(
        &mut self,
        ident: i64,
        file_id: i64,
        filename: &str,
        mimetype: &str,
    ) -> Result<(), StoreError>;

    fn find_tag(&mut self, tag: &str) -> Result<Option<i64>, StoreError>;

    fn insert_unit_tag(&mut self, ident: i64, tag_id: i64) -> Result<(), StoreError>;

    fn find_keyword(&mut self, word: &str) -> Result<Option<i64>, StoreError>;

    fn insert_keyword(&mut self, word: &str) -> Result<i64, StoreError>;

    fn insert_unit_keyword(&mut self, ident: i64, keyword_id: i64) -> Result<(), StoreError>;
}

/// One uncommitted scope of writes.
pub trait ArchiveTransaction: ArchiveWriter {
    fn commit(self) -> Result<(), StoreError>;
}

pub trait ArchiveStore {
    type Transaction<'a>: ArchiveTransaction
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Transaction<'_>, StoreError>;
}
