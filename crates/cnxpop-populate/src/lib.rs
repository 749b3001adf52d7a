//! cnx-archive population from legacy complete zips
//!
//! ```text
//!   <output_dir>/<collection_id>_<version>_complete/
//!       collection.xml ───────────────┐
//!       <module_id>/                  │ parse ─► resolve ─► populate ─► commit
//!           index_auto_generated.cnxml┘     (each module, then the collection)
//!           index.cnxml
//!           <resources>
//! ```
//!
//! The [`Ingestor`] walks the collection's module list, populating and
//! committing one module at a time, and inserts the collection row last.
//! A failure aborts the run; modules committed before it stay in the store.

pub mod config;
pub mod ingest;
pub mod layout;
pub mod populate;

#[cfg(test)]
mod tests;

pub use config::IngestConfig;
pub use ingest::{IngestError, IngestPhase, IngestReport, Ingestor};
pub use layout::CompleteZip;
pub use populate::{attachments, populate_unit, Attachment, MissingResource, PopulateError, PopulatedUnit};
