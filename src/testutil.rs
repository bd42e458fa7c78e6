//! Fabricated sysfs trees and catalog files for unit tests.

use crate::pmu::Sysfs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Route library logging to the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A throwaway `/sys/devices` look-alike.
pub struct FakeSysfs {
    dir: TempDir,
}

impl FakeSysfs {
    pub fn new() -> Self {
        init_logging();
        FakeSysfs {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn sysfs(&self) -> Sysfs {
        Sysfs::new(self.root())
    }

    fn write(&self, rel: &str, contents: &str) -> &Self {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("{}\n", contents)).unwrap();
        self
    }

    pub fn pmu(&self, pmu: &str, type_: u32) -> &Self {
        self.write(&format!("{}/type", pmu), &type_.to_string())
    }

    pub fn format(&self, pmu: &str, key: &str, format: &str) -> &Self {
        self.write(&format!("{}/format/{}", pmu, key), format)
    }

    pub fn alias(&self, pmu: &str, alias: &str, expansion: &str) -> &Self {
        self.write(&format!("{}/events/{}", pmu, alias), expansion)
    }

    pub fn cpumask(&self, pmu: &str, mask: &str) -> &Self {
        self.write(&format!("{}/cpumask", pmu), mask)
    }

    pub fn online(&self, cpus: &str) -> &Self {
        self.write("system/cpu/online", cpus)
    }

    /// The usual Intel core PMU formats.
    pub fn intel_cpu(&self) -> &Self {
        self.pmu("cpu", 4)
            .format("cpu", "event", "config:0-7")
            .format("cpu", "umask", "config:8-15")
            .format("cpu", "edge", "config:18")
            .format("cpu", "any", "config:21")
            .format("cpu", "inv", "config:23")
            .format("cpu", "cmask", "config:24-31")
            .format("cpu", "offcore_rsp", "config1:0-63")
            .format("cpu", "ldlat", "config1:0-15")
            .format("cpu", "frontend", "config1:0-23")
            .alias("cpu", "cpu-cycles", "event=0x3c")
            .alias("cpu", "instructions", "event=0xc0")
    }

    /// A single-socket cache box PMU.
    pub fn intel_cbox(&self) -> &Self {
        self.pmu("uncore_cbox_0", 17)
            .format("uncore_cbox_0", "event", "config:0-7")
            .format("uncore_cbox_0", "umask", "config:8-15")
            .cpumask("uncore_cbox_0", "0")
    }
}

/// A directory holding `<id>-core.json` and `<id>-uncore.json`.
pub struct FakeCatalogDir {
    dir: TempDir,
}

impl FakeCatalogDir {
    pub fn new() -> Self {
        init_logging();
        FakeCatalogDir {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn write(&self, file: &str, json: &str) -> &Self {
        std::fs::write(self.dir.path().join(file), json).unwrap();
        self
    }
}

pub const CORE_JSON: &str = r#"[
    {
        "EventCode": "0xC0",
        "UMask": "0x00",
        "EventName": "INST_RETIRED.ANY",
        "BriefDescription": "Instructions retired from execution.",
        "SampleAfterValue": "2000003",
        "CounterHTOff": "Fixed counter 0"
    },
    {
        "EventCode": "0x3C",
        "UMask": "0x00",
        "EventName": "CPU_CLK_UNHALTED.THREAD_ANY",
        "BriefDescription": "Core cycles when at least one thread on the physical core is not in halt state.",
        "AnyThread": "1",
        "SampleAfterValue": "2000003"
    },
    {
        "EventCode": "0x2E",
        "UMask": "0x41",
        "EventName": "LONGEST_LAT_CACHE.MISS",
        "BriefDescription": "Core-originated cacheable demand requests missed L3.",
        "SampleAfterValue": "100003",
        "Errata": "SKL057"
    },
    {
        "EventCode": "0xA3",
        "UMask": "0x14",
        "EventName": "CYCLE_ACTIVITY.STALLS_MEM_ANY",
        "BriefDescription": "Execution stalls while memory subsystem has an outstanding load.",
        "CounterMask": "20",
        "SampleAfterValue": "2000003"
    },
    {
        "EventCode": "0xB7, 0xBB",
        "UMask": "0x01",
        "EventName": "OFFCORE_RESPONSE.DEMAND_DATA_RD.ANY_RESPONSE",
        "BriefDescription": "Counts demand data reads that have any response type.",
        "MSRIndex": "0x1a6,0x1a7",
        "MSRValue": "0x0000010001",
        "SampleAfterValue": "100003"
    },
    {
        "EventCode": "0xCD",
        "UMask": "0x01",
        "EventName": "MEM_TRANS_RETIRED.LOAD_LATENCY_GT_4",
        "BriefDescription": "Counts loads with latency value being above 4",
        "MSRIndex": "0x3F6",
        "MSRValue": "0x4",
        "PEBS": "2",
        "Data_LA": "1",
        "DataLA": "1",
        "SampleAfterValue": "100003"
    }
]"#;

pub const UNCORE_JSON: &str = r#"[
    {
        "Unit": "CBO",
        "EventCode": "0x34",
        "UMask": "0x11",
        "EventName": "UNC_CBO_CACHE_LOOKUP.ANY_MESI",
        "BriefDescription": "L3 Lookup any request that access cache and found line in MESI-state.",
        "Filter": "filter_state=0x1f"
    },
    {
        "Unit": "iMC",
        "EventCode": "0x04",
        "UMask": "0x03",
        "EventName": "UNC_M_CAS_COUNT.RD",
        "BriefDescription": "read requests to memory controller"
    }
]"#;
