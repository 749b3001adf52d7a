//! Run configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_LEGACY_HOST: &str = "http://cnx.org";
pub const DEFAULT_VERSION: &str = "latest";

/// Where complete zips live and which versions of a collection to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory holding downloaded zips and their extracted trees.
    pub output_dir: PathBuf,
    /// Legacy repository host complete zips are fetched from.
    pub legacy_host: String,
    pub versions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            legacy_host: DEFAULT_LEGACY_HOST.to_string(),
            versions: vec![DEFAULT_VERSION.to_string()],
        }
    }
}
