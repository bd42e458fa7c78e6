//! Read-only access to the kernel's PMU description under `/sys/devices`.

use crate::util::{parse_cpu_list, read_trimmed};
use crate::Result;
use log::{debug, trace, warn};
use std::path::{Path, PathBuf};

/// Name patterns tried, in order, when looking up the directory of a PMU.
const PMU_DIR_PATTERNS: [(&str, &str); 4] = [
    ("", ""),
    ("uncore_", ""),
    ("uncore_", "_0"),
    ("uncore_", "_1"),
];

/// A kernel event alias found under `<pmu>/events/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelEvent {
    /// Alias in `<pmu>/<alias>/` form.
    pub name: String,
    /// Expansion in `<pmu>/<terms>/` form.
    pub event: String,
    /// PMU the alias belongs to.
    pub pmu: String,
}

/// Root of the sysfs PMU device tree.
#[derive(Debug, Clone)]
pub struct Sysfs {
    root: PathBuf,
}

impl Default for Sysfs {
    fn default() -> Self {
        Sysfs::new("/sys/devices")
    }
}

impl Sysfs {
    /// Use `root` in place of `/sys/devices`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Sysfs {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory of the tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, pmu: &str, rest: &str) -> Option<String> {
        let val = read_trimmed(self.root.join(pmu).join(rest));
        trace!("read {}/{} -> {:?}", pmu, rest, val);
        val
    }

    /// Kernel type id of the PMU directory named exactly `pmu`.
    fn type_of(&self, pmu: &str) -> Option<u32> {
        let val = self.read(pmu, "type")?;
        match val.parse() {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("Ignoring malformed type file of PMU {} - {}", pmu, e);
                None
            }
        }
    }

    /// Find the PMU directory for `pmu`.
    ///
    /// Tries the literal name, then `uncore_<pmu>`, `uncore_<pmu>_0` and `uncore_<pmu>_1`. Returns
    /// the kernel type id and the directory name of the first hit.
    pub fn pmu_type(&self, pmu: &str) -> Option<(u32, String)> {
        PMU_DIR_PATTERNS.iter().find_map(|(prefix, suffix)| {
            let dir = format!("{}{}{}", prefix, pmu, suffix);
            self.type_of(&dir).map(|t| (t, dir))
        })
    }

    /// Bit range string of the `key` field of `pmu`, e.g. `config:0-7`.
    ///
    /// A miss is not an error, the caller falls through to alias lookup.
    pub fn format(&self, pmu: &str, key: &str) -> Option<String> {
        self.read(pmu, &format!("format/{}", key))
    }

    /// Expansion of the event alias `alias` of `pmu`, e.g. `event=0x3c`.
    pub fn alias(&self, pmu: &str, alias: &str) -> Option<String> {
        self.read(pmu, &format!("events/{}", alias))
    }

    /// CPUs listed in the `cpumask` file of `pmu`.
    ///
    /// Core PMUs usually have no such file.
    pub fn cpumask(&self, pmu: &str) -> Option<Vec<usize>> {
        let mask = self.read(pmu, "cpumask")?;
        match parse_cpu_list(&mask) {
            Ok(cpus) => Some(cpus),
            Err(e) => {
                warn!("Ignoring malformed cpumask of PMU {} - {}", pmu, e);
                None
            }
        }
    }

    /// Decide whether an event is counted by an uncore PMU.
    ///
    /// Descriptors in `<pmu>/<terms>/` form are never treated as uncore. Otherwise the cpumask of
    /// `pmu_hint` (or of the descriptor itself when there is no hint) must name CPU 0 and nothing
    /// else.
    pub fn is_uncore(&self, descriptor: &str, pmu_hint: Option<&str>) -> bool {
        if descriptor.contains('/') {
            return false;
        }
        let pmu = pmu_hint.unwrap_or_else(|| descriptor.trim());
        if pmu.is_empty() {
            return false;
        }
        let dir = match self.pmu_type(pmu) {
            Some((_, dir)) => dir,
            None => pmu.to_string(),
        };
        let uncore = self.cpumask(&dir).map_or(false, |cpus| cpus == [0]);
        debug!("is_uncore: {} (pmu {}) -> {}", descriptor, dir, uncore);
        uncore
    }

    /// Map a kernel type id back to the name of its PMU directory.
    pub fn pmu_name(&self, type_: u32) -> Result<Option<String>> {
        let pattern = format!("{}/*/type", self.root.display());
        for path in glob::glob(&pattern)? {
            let path = path?;
            let matches = read_trimmed(&path)
                .and_then(|t| t.parse::<u32>().ok())
                .map_or(false, |t| t == type_);
            if matches {
                let pmu = path
                    .parent()
                    .and_then(Path::file_name)
                    .and_then(|n| n.to_str())
                    .map(String::from);
                return Ok(pmu);
            }
        }
        Ok(None)
    }

    /// Every event alias published by every PMU.
    ///
    /// Aliases containing a `.` (scale and unit companions) are skipped.
    pub fn kernel_events(&self) -> Result<Vec<KernelEvent>> {
        let pattern = format!("{}/*/events/*", self.root.display());
        let mut events = Vec::new();
        for path in glob::glob(&pattern)? {
            let path = path?;
            let alias = match path.file_name().and_then(|n| n.to_str()) {
                Some(a) if !a.contains('.') => a.to_string(),
                _ => continue,
            };
            let pmu = match path
                .parent()
                .and_then(Path::parent)
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
            {
                Some(p) => p.to_string(),
                None => continue,
            };
            if let Some(expansion) = read_trimmed(&path) {
                events.push(KernelEvent {
                    name: format!("{}/{}/", pmu, alias),
                    event: format!("{}/{}/", pmu, expansion),
                    pmu,
                });
            }
        }
        Ok(events)
    }

    /// Number of online logical CPUs.
    ///
    /// Counters are opened on CPUs `0..n`.
    pub fn num_cpus(&self) -> usize {
        let online = read_trimmed(self.root.join("system/cpu/online"))
            .and_then(|s| parse_cpu_list(&s).ok())
            .and_then(|cpus| cpus.last().map(|last| last + 1));
        match online {
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeSysfs;

    #[test]
    fn test_pmu_type_lookup_order() {
        let fake = FakeSysfs::new();
        fake.pmu("cpu", 4)
            .pmu("uncore_imc", 13)
            .pmu("uncore_cbox_0", 17)
            .pmu("uncore_cbox_1", 18)
            .pmu("uncore_qpi_1", 21);
        let sysfs = fake.sysfs();
        assert_eq!(sysfs.pmu_type("cpu"), Some((4, "cpu".into())));
        assert_eq!(sysfs.pmu_type("imc"), Some((13, "uncore_imc".into())));
        assert_eq!(sysfs.pmu_type("cbox"), Some((17, "uncore_cbox_0".into())));
        assert_eq!(sysfs.pmu_type("qpi"), Some((21, "uncore_qpi_1".into())));
        assert_eq!(sysfs.pmu_type("sbox"), None);
    }

    #[test]
    fn test_format_and_alias_misses() {
        let fake = FakeSysfs::new();
        fake.intel_cpu();
        let sysfs = fake.sysfs();
        assert_eq!(sysfs.format("cpu", "umask"), Some("config:8-15".into()));
        assert_eq!(sysfs.format("cpu", "nope"), None);
        assert_eq!(sysfs.alias("cpu", "cpu-cycles"), Some("event=0x3c".into()));
        assert_eq!(sysfs.alias("cpu", "nope"), None);
        assert_eq!(sysfs.cpumask("cpu"), None);
    }

    #[test]
    fn test_uncore_classification() {
        let fake = FakeSysfs::new();
        fake.intel_cpu()
            .intel_cbox()
            .pmu("uncore_imc_0", 13)
            .cpumask("uncore_imc_0", "0,28")
            .pmu("power", 9)
            .cpumask("power", "0");
        let sysfs = fake.sysfs();

        assert!(sysfs.is_uncore("power", None));
        assert!(sysfs.is_uncore("unc_cbo_cache_lookup.any_mesi", Some("cbox")));
        assert!(!sysfs.is_uncore("unc_m_cas_count.rd", Some("imc")));
        assert!(!sysfs.is_uncore("inst_retired.any", Some("cpu")));
        assert!(!sysfs.is_uncore("uncore_cbox_0/event=0x34/", None));
        assert!(!sysfs.is_uncore("power/energy-pkg/", Some("power")));
        assert!(!sysfs.is_uncore("missing", None));
    }

    #[test]
    fn test_pmu_name_reverse_lookup() -> Result<()> {
        let fake = FakeSysfs::new();
        fake.intel_cpu().intel_cbox();
        let sysfs = fake.sysfs();
        assert_eq!(sysfs.pmu_name(4)?, Some("cpu".into()));
        assert_eq!(sysfs.pmu_name(17)?, Some("uncore_cbox_0".into()));
        assert_eq!(sysfs.pmu_name(1234)?, None);
        Ok(())
    }

    #[test]
    fn test_kernel_events_walk() -> Result<()> {
        let fake = FakeSysfs::new();
        fake.intel_cpu()
            .alias("cpu", "mem-loads", "event=0xcd,umask=0x1,ldlat=3")
            .alias("cpu", "mem-loads.unit", "ns");
        let mut events = fake.sysfs().kernel_events()?;
        events.sort_by(|a, b| a.name.cmp(&b.name));
        let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["cpu/cpu-cycles/", "cpu/instructions/", "cpu/mem-loads/"]
        );
        assert_eq!(events[2].event, "cpu/event=0xcd,umask=0x1,ldlat=3/");
        assert_eq!(events[2].pmu, "cpu");
        Ok(())
    }

    #[test]
    fn test_num_cpus() {
        let fake = FakeSysfs::new();
        fake.online("0-7");
        assert_eq!(fake.sysfs().num_cpus(), 8);

        let empty = FakeSysfs::new();
        assert!(empty.sysfs().num_cpus() >= 1);
    }
}
