//! Ingestion orchestrator
//!
//! Drives one extracted complete zip through parse, resolve, populate and
//! commit: every linked module first, each in its own transaction, then the
//! collection in a final transaction.

use crate::config::IngestConfig;
use crate::layout::CompleteZip;
use crate::populate::{populate_unit, MissingResource, PopulateError, PopulatedUnit};
use cnxpop_ingest_cnxml::{parse_collection_xml, parse_module_xml, ParseError};
use cnxpop_model::{resolve, Document, IdentityMapping};
use cnxpop_storage::{ArchiveStore, ArchiveTransaction, StoreError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("failed to populate {legacy_id}: {source}")]
    Populate {
        legacy_id: String,
        #[source]
        source: PopulateError,
    },
    #[error("store failure while ingesting {legacy_id}: {source}")]
    Store {
        legacy_id: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    ProcessingModules,
    ProcessingCollection,
}

/// Everything committed by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub collection: PopulatedUnit,
    /// In collection order.
    pub modules: Vec<PopulatedUnit>,
}

impl IngestReport {
    pub fn units(&self) -> impl Iterator<Item = &PopulatedUnit> {
        self.modules.iter().chain(std::iter::once(&self.collection))
    }

    pub fn missing_resources(&self) -> impl Iterator<Item = &MissingResource> {
        self.units().flat_map(|unit| unit.missing.iter())
    }
}

pub struct Ingestor<'a, S: ArchiveStore> {
    config: &'a IngestConfig,
    store: &'a mut S,
    mapping: &'a IdentityMapping,
    phase: IngestPhase,
}

impl<'a, S: ArchiveStore> Ingestor<'a, S> {
    pub fn new(config: &'a IngestConfig, store: &'a mut S, mapping: &'a IdentityMapping) -> Self {
        Self {
            config,
            store,
            mapping,
            phase: IngestPhase::ProcessingModules,
        }
    }

    pub fn phase(&self) -> IngestPhase {
        self.phase
    }

    /// Ingest the extracted tree for `collection_id` at `version` under the
    /// configured output directory.
    pub fn ingest_collection(
        &mut self,
        collection_id: &str,
        version: &str,
    ) -> Result<IngestReport, IngestError> {
        let archive = CompleteZip::locate(&self.config.output_dir, collection_id, version);
        self.ingest(&archive)
    }

    pub fn ingest(&mut self, archive: &CompleteZip) -> Result<IngestReport, IngestError> {
        self.phase = IngestPhase::ProcessingModules;

        let collection_path = archive.collection_xml();
        let collection = parse_collection_xml(&collection_path).map_err(|source| {
            IngestError::Parse {
                path: collection_path.clone(),
                source,
            }
        })?;
        info!(
            legacy_id = %collection.legacy_id(),
            version = %collection.metadata.version,
            modules = collection.module_ids().len(),
            root = %archive.root().display(),
            "ingesting collection"
        );

        let mut seen = HashSet::new();
        let mut modules = Vec::with_capacity(collection.module_ids().len());
        for module_id in collection.module_ids() {
            if !seen.insert(module_id.as_str()) {
                // Identities are resolved per occurrence; a repeat mints a second unit.
                warn!(legacy_id = %module_id, "module referenced more than once in collection");
            }

            let path = archive.module_metadata_xml(module_id);
            let document = parse_module_xml(&path)
                .map_err(|source| IngestError::Parse { path, source })?;
            let unit = self.commit_unit(&document, &archive.module_dir(module_id))?;
            info!(
                legacy_id = %unit.legacy_id,
                uuid = %unit.uuid,
                ident = unit.ident,
                files = unit.files_attached,
                missing = unit.missing.len(),
                "module ingested"
            );
            modules.push(unit);
        }

        self.phase = IngestPhase::ProcessingCollection;
        info!(legacy_id = %collection.legacy_id(), "all modules committed; ingesting collection unit");
        let unit = self.commit_unit(&collection, archive.root())?;
        info!(
            legacy_id = %unit.legacy_id,
            uuid = %unit.uuid,
            ident = unit.ident,
            "collection ingested"
        );

        Ok(IngestReport {
            collection: unit,
            modules,
        })
    }

    fn commit_unit(&mut self, document: &Document, dir: &Path) -> Result<PopulatedUnit, IngestError> {
        let legacy_id = document.legacy_id();
        let identity = resolve(legacy_id, self.mapping);

        let store_err = |source| IngestError::Store {
            legacy_id: legacy_id.to_string(),
            source,
        };
        let mut tx = self.store.begin().map_err(store_err)?;
        let unit = populate_unit(&mut tx, document, &identity, dir).map_err(|source| {
            IngestError::Populate {
                legacy_id: legacy_id.to_string(),
                source,
            }
        })?;
        tx.commit().map_err(store_err)?;
        Ok(unit)
    }
}
