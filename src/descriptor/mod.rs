//! Descriptor parsing
//!
//! Turns the section/key data shipped with each tool into Task records,
//! resolving locale variants and defaults along the way.

pub mod locale;
pub mod parser;
pub mod section;

pub use locale::{KeyVariant, Locale, LocalizedText};
pub use parser::build_executables;
pub use section::{Section, Sections};
