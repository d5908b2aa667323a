//! # proxywire Configuration Module
//!
//! All numeric limits of the wire format live here. Values that constrain one
//! another are kept side by side and their relationships are checked at
//! compile time, so a ceiling cannot drift past what the offset table or the
//! length prefixes are able to express.
//!
//! ## Module Organization
//!
//! - [`constants`]: ceilings, slot sizes and nesting limits with dependency notes

pub mod constants;
pub use constants::*;
