//! Resolution of hardware performance counter events and per-CPU measurement sessions on Linux.

#![deny(missing_docs, missing_debug_implementations)]

mod errors;
pub use errors::{Error, Result};

pub mod cpu;
pub use cpu::CpuId;

pub mod perf;
pub use perf::{Count, CounterBackend, CounterHandle, OpenOptions, PerfBackend};

pub mod pmu;
pub use pmu::{Attribute, Catalog, CatalogSource, EventDescriptor, Resolver, Sysfs};

pub mod session;
pub use session::{EventSnapshot, ParsedEvent, Session, SessionState};

pub(crate) mod util;

#[cfg(test)]
mod testutil;
