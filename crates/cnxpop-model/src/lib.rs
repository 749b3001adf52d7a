//! Typed model for legacy CNX content
//!
//! A legacy "complete zip" carries two kinds of content unit:
//!
//! - a **collection** (`collection.xml`, the collxml manifest), and
//! - its **modules** (`index_auto_generated.cnxml`, content with metadata).
//!
//! Both dialects share one metadata vocabulary (`md:*`), so they parse into
//! one [`Document`] record whose [`DocumentBody`] carries the dialect-specific
//! child references. Identities are resolved against an [`IdentityMapping`]
//! supplied at the start of a run.

pub mod document;
pub mod identity;
pub mod unit;

pub use document::*;
pub use identity::*;
pub use unit::*;
