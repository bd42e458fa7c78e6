use crate::pmu::Sysfs;
use crate::{Error, Result};

/// `type` value the kernel uses for raw, model specific events.
pub const PERF_TYPE_RAW: u32 = 4;
/// `type` value of the kernel's generic hardware events.
pub const PERF_TYPE_HARDWARE: u32 = 0;
/// `type` value of the kernel's software events.
pub const PERF_TYPE_SOFTWARE: u32 = 1;
/// `type` value of the kernel's generic hardware cache events.
pub const PERF_TYPE_HW_CACHE: u32 = 3;

/// How often a counter produces samples.
///
/// Counting-only events leave this at `Period(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampling {
    /// Sample every `n` events.
    Period(u64),
    /// Sample at approximately `n` Hz.
    Frequency(u64),
}

impl Default for Sampling {
    fn default() -> Self {
        Sampling::Period(0)
    }
}

/// Fully resolved configuration of a hardware counter.
///
/// Built once per resolved event and read-only afterwards.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Kernel PMU type id.
    pub pmu_type: u32,
    /// Main event selector word.
    pub config: u64,
    /// First extension word (e.g. offcore response or load latency).
    pub config1: u64,
    /// Second extension word.
    pub config2: u64,
    /// Sample period or frequency.
    pub sampling: Sampling,
    /// Do not count user space.
    pub exclude_user: bool,
    /// Do not count kernel space.
    pub exclude_kernel: bool,
    /// Do not count while running a guest.
    pub exclude_guest: bool,
    /// Do not count the hypervisor.
    pub exclude_hv: bool,
    /// Requested skid constraint, 0 to 3.
    pub precise_ip: u8,
}

impl Attribute {
    /// A raw event attribute with an empty configuration.
    pub fn raw() -> Self {
        Attribute {
            pmu_type: PERF_TYPE_RAW,
            ..Default::default()
        }
    }

    /// Apply a qualifier suffix such as `ppk` or `u`.
    ///
    /// Unknown letters are logged and otherwise ignored.
    pub fn apply_qualifiers(&mut self, qualifiers: &str, event: &str) {
        for q in qualifiers.chars() {
            match q {
                'p' => self.precise_ip = (self.precise_ip + 1).min(3),
                'k' => self.exclude_user = true,
                'u' => self.exclude_kernel = true,
                'h' => self.exclude_guest = true,
                _ => log::warn!("Unknown modifier {} at end for {}", q, event),
            }
        }
    }

    /// Generate an event string to be used with the `perf` command line tools.
    ///
    /// The PMU name is recovered from the `type` files under `sysfs`.
    pub fn to_perf_string(&self, sysfs: &Sysfs, name: Option<&str>) -> Result<String> {
        let pmu = sysfs
            .pmu_name(self.pmu_type)?
            .ok_or_else(|| Error::UnknownPmu(format!("type {}", self.pmu_type)))?;
        let mut perf_evt = format!("{}/config={:#x}", pmu, self.config);
        if self.config1 != 0 {
            perf_evt.push_str(&format!(",config1={:#x}", self.config1));
        }
        if self.config2 != 0 {
            perf_evt.push_str(&format!(",config2={:#x}", self.config2));
        }
        if let Some(n) = name.filter(|n| !n.is_empty()) {
            perf_evt.push_str(&format!(",name={}", n));
        }
        perf_evt.push('/');
        Ok(perf_evt)
    }
}
