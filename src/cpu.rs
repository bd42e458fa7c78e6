//! Identification of the local processor, used to pick the matching event catalog.

use crate::{Error, Result};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

lazy_static! {
    static ref CPUINFO_FIELD: Regex =
        Regex::new(r"^(vendor_id|cpu family|model|stepping)\s*:\s*(\S+)").unwrap();
}

/// Vendor, family, model and stepping of a processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuId {
    /// Vendor string, e.g. `GenuineIntel`.
    pub vendor: String,
    /// Processor family.
    pub family: u32,
    /// Processor model.
    pub model: u32,
    /// Processor stepping.
    pub stepping: u32,
}

impl CpuId {
    /// Identify the processor this process runs on from `/proc/cpuinfo`.
    pub fn local() -> Result<Self> {
        let cpuinfo = std::fs::read_to_string("/proc/cpuinfo")?;
        let id = CpuId::from_cpuinfo(&cpuinfo)?;
        debug!("Detected processor - {}", id.full_id());
        Ok(id)
    }

    /// Parse the first processor block of `/proc/cpuinfo` text.
    pub fn from_cpuinfo(text: &str) -> Result<Self> {
        let mut vendor = None;
        let mut family = None;
        let mut model = None;
        let mut stepping = None;

        for line in text.lines() {
            if let Some(caps) = CPUINFO_FIELD.captures(line) {
                let val = &caps[2];
                match &caps[1] {
                    "vendor_id" => vendor = Some(val.to_string()),
                    "cpu family" => family = Some(val.parse()?),
                    "model" => model = Some(val.parse()?),
                    "stepping" => stepping = Some(val.parse()?),
                    _ => unreachable!(),
                }
            }
            if vendor.is_some() && family.is_some() && model.is_some() && stepping.is_some() {
                break;
            }
        }

        match (vendor, family, model, stepping) {
            (Some(vendor), Some(family), Some(model), Some(stepping)) => Ok(CpuId {
                vendor,
                family,
                model,
                stepping,
            }),
            _ => Err(Error::CatalogNotFound(
                "incomplete processor description in cpuinfo".into(),
            )),
        }
    }

    /// Identification string including the stepping, e.g. `GenuineIntel-6-55-4`.
    pub fn full_id(&self) -> String {
        format!(
            "{}-{}-{:X}-{:X}",
            self.vendor, self.family, self.model, self.stepping
        )
    }

    /// Identification string without the stepping, e.g. `GenuineIntel-6-55`.
    pub fn model_id(&self) -> String {
        format!("{}-{}-{:X}", self.vendor, self.family, self.model)
    }

    /// Candidate identification strings, most specific first.
    pub fn candidates(&self) -> Vec<String> {
        vec![self.full_id(), self.model_id()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO: &str = "processor\t: 0
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 85
model name\t: Intel(R) Xeon(R) Gold 6140 CPU @ 2.30GHz
stepping\t: 4
microcode\t: 0x2006906

processor\t: 1
vendor_id\t: GenuineIntel
";

    #[test]
    fn test_cpu_id_from_cpuinfo() {
        let id = CpuId::from_cpuinfo(CPUINFO).unwrap();
        assert_eq!(id.vendor, "GenuineIntel");
        assert_eq!(id.family, 6);
        assert_eq!(id.model, 85);
        assert_eq!(id.stepping, 4);
        assert_eq!(id.full_id(), "GenuineIntel-6-55-4");
        assert_eq!(id.model_id(), "GenuineIntel-6-55");
        assert_eq!(id.candidates()[0], id.full_id());
    }

    #[test]
    fn test_cpu_id_incomplete() {
        assert!(CpuId::from_cpuinfo("vendor_id : AuthenticAMD\n").is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cpu_id_local() {
        // Some architectures do not publish a vendor_id, so only check it does not panic.
        let _ = CpuId::local();
    }
}
