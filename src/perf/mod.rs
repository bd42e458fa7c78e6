//! Counter backends that turn resolved attributes into running hardware counters.

pub mod ffi;

mod event;
pub use event::{to_perf_attr, PerfBackend, PerfCounter};

use crate::pmu::Attribute;
use crate::Result;

/// One reading of a counter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Count {
    /// Raw counter value.
    pub value: u64,
    /// Total time the counter was enabled.
    pub enabled: u64,
    /// Total time the counter was actually on the hardware.
    ///
    /// In the case of event multiplexing this is smaller than `enabled`.
    pub running: u64,
}

impl Count {
    /// Counter value extrapolated to the full enabled time.
    ///
    /// Computed in 64-bit arithmetic, a product above `u64::MAX` wraps before the division.
    pub fn scaled(&self) -> u64 {
        if self.enabled == self.running || self.running == 0 {
            self.value
        } else {
            self.value.wrapping_mul(self.enabled) / self.running
        }
    }
}

/// How counters are attached when they are opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Process to measure. Ignored when `measure_all` is set.
    pub pid: i32,
    /// Count everything running on each CPU instead of a single process.
    pub measure_all: bool,
}

impl OpenOptions {
    /// Process id passed to the backend.
    pub fn target_pid(&self) -> i32 {
        if self.measure_all {
            -1
        } else {
            self.pid
        }
    }
}

/// A single opened counter on a single CPU.
pub trait CounterHandle {
    /// Zero and enable the counter.
    fn start(&mut self) -> Result<()>;

    /// Disable the counter and read its value and times.
    fn stop_and_read(&mut self) -> Result<Count>;

    /// Release the counter.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Something that can open counters.
pub trait CounterBackend {
    /// Handle type produced by `open`.
    type Handle: CounterHandle;

    /// Refuse `options` before any counter is opened.
    fn check(&self, _options: &OpenOptions) -> Result<()> {
        Ok(())
    }

    /// Open `attr` on `cpu`, optionally in the group led by `leader`.
    fn open(
        &self,
        attr: &Attribute,
        options: &OpenOptions,
        cpu: usize,
        leader: Option<&Self::Handle>,
    ) -> Result<Self::Handle>;
}
