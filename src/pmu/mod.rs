//! Resolution of event names into PMU counter attributes.
//!
//! Names are looked up in a per-microarchitecture `Catalog` and translated with the help of the
//! kernel's PMU description in sysfs into an `Attribute` ready to be opened.

/// Resolved counter attributes.
pub mod attr;
pub use attr::{Attribute, Sampling};

mod bitfield;
pub use bitfield::{Bitfield, ConfigWord};

mod catalog;
pub use catalog::{Catalog, CatalogSource, CATALOG_PATH_ENV};

mod events;
pub use events::{EventDescriptor, RawEvent};

mod generic;
pub use generic::{generic_event, generic_event_names};

mod grammar;
pub use grammar::Rule;

mod resolve;
pub use resolve::Resolver;

mod sysfs;
pub use sysfs::{KernelEvent, Sysfs};

mod terms;
pub use terms::{split_terms, Term, TermParser};
