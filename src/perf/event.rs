//! Counters backed by the Linux `perf_event_open` system call.

use crate::perf::{ffi, Count, CounterBackend, CounterHandle, OpenOptions};
use crate::pmu::{Attribute, Sampling};
use crate::{Error, Result};
use byteorder::{NativeEndian, ReadBytesExt};
use log::{debug, trace};
use nix::libc;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

/// Size of a `TOTAL_TIME_ENABLED | TOTAL_TIME_RUNNING` read.
const READ_SIZE: usize = 3 * std::mem::size_of::<u64>();

/// Build the kernel attribute for `attr` opened with `options`.
pub fn to_perf_attr(attr: &Attribute, options: &OpenOptions) -> ffi::PerfEventAttr {
    let mut pattr = ffi::PerfEventAttr {
        type_: attr.pmu_type,
        size: ffi::PERF_ATTR_SIZE,
        config: attr.config,
        bp_addr_or_config1: attr.config1,
        bp_len_or_config2: attr.config2,
        read_format: ffi::PERF_FORMAT_TOTAL_TIME_ENABLED | ffi::PERF_FORMAT_TOTAL_TIME_RUNNING,
        ..Default::default()
    };
    match attr.sampling {
        Sampling::Period(p) => pattr.sample_period_or_freq = p,
        Sampling::Frequency(f) => {
            pattr.sample_period_or_freq = f;
            pattr.set_flag(ffi::ATTR_FLAG_FREQ, true);
        }
    }
    pattr.set_flag(ffi::ATTR_FLAG_EXCLUDE_USER, attr.exclude_user);
    pattr.set_flag(ffi::ATTR_FLAG_EXCLUDE_KERNEL, attr.exclude_kernel);
    pattr.set_flag(ffi::ATTR_FLAG_EXCLUDE_HV, attr.exclude_hv);
    pattr.set_flag(ffi::ATTR_FLAG_EXCLUDE_GUEST, attr.exclude_guest);
    pattr.set_precise_ip(attr.precise_ip);

    if !options.measure_all {
        pattr.set_flag(ffi::ATTR_FLAG_DISABLED, true);
        pattr.set_flag(ffi::ATTR_FLAG_ENABLE_ON_EXEC, true);
        pattr.set_flag(ffi::ATTR_FLAG_INHERIT, true);
    }
    pattr
}

/// A counting perf event on one CPU.
#[derive(Debug)]
pub struct PerfCounter {
    /// Attributes the counter was opened with.
    pub attr: ffi::PerfEventAttr,
    /// File corresponding to the underlying perf event.
    file: std::fs::File,
}

impl PerfCounter {
    /// Enable counting for event.
    pub fn enable(&self) -> Result<()> {
        unsafe {
            ffi::perf_event_ioc_enable(self.file.as_raw_fd())?;
        }
        Ok(())
    }

    /// Disable counting for event.
    pub fn disable(&self) -> Result<()> {
        unsafe {
            ffi::perf_event_ioc_disable(self.file.as_raw_fd())?;
        }
        Ok(())
    }

    /// Reset counting for event.
    pub fn reset(&self) -> Result<()> {
        unsafe {
            ffi::perf_event_ioc_reset(self.file.as_raw_fd())?;
        }
        Ok(())
    }

    /// Read value, enabled time and running time from the file descriptor.
    pub fn read_count(&self) -> Result<Count> {
        let mut bytes = [0u8; READ_SIZE];
        let n = nix::unistd::read(self.file.as_raw_fd(), &mut bytes)?;
        if n != READ_SIZE {
            return Err(Error::IO(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("short counter read of {} bytes", n),
            )));
        }
        let mut cur = std::io::Cursor::new(&bytes[..]);
        Ok(Count {
            value: cur.read_u64::<NativeEndian>()?,
            enabled: cur.read_u64::<NativeEndian>()?,
            running: cur.read_u64::<NativeEndian>()?,
        })
    }
}

impl AsRawFd for PerfCounter {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl CounterHandle for PerfCounter {
    fn start(&mut self) -> Result<()> {
        self.reset()?;
        self.enable()
    }

    fn stop_and_read(&mut self) -> Result<Count> {
        self.disable()?;
        let count = self.read_count()?;
        trace!("stop_and_read: fd {} -> {:?}", self.file.as_raw_fd(), count);
        Ok(count)
    }

    fn close(self) -> Result<()> {
        drop(self.file);
        Ok(())
    }
}

/// Opens counters with `perf_event_open`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerfBackend;

impl PerfBackend {
    /// Current value of `perf_event_paranoid`.
    pub fn paranoid_level() -> Result<i32> {
        let data = std::fs::read_to_string("/proc/sys/kernel/perf_event_paranoid")?;
        Ok(data.trim().parse()?)
    }

    /// Check whether the kernel lets this process count with `options`.
    pub fn check_capabilities(options: &OpenOptions) -> Result<()> {
        let root = nix::unistd::geteuid().is_root();
        let paranoid = if options.measure_all && !root {
            PerfBackend::paranoid_level().ok()
        } else {
            None
        };
        capability_verdict(options, root, paranoid)
    }
}

/// System wide counting needs root or a paranoid level of at most 0. An unreadable level is not
/// held against the caller.
fn capability_verdict(options: &OpenOptions, root: bool, paranoid: Option<i32>) -> Result<()> {
    match paranoid {
        Some(level) if options.measure_all && !root && level > 0 => Err(Error::PerfNotCapable),
        _ => Ok(()),
    }
}

impl CounterBackend for PerfBackend {
    type Handle = PerfCounter;

    fn check(&self, options: &OpenOptions) -> Result<()> {
        PerfBackend::check_capabilities(options)
    }

    fn open(
        &self,
        attr: &Attribute,
        options: &OpenOptions,
        cpu: usize,
        leader: Option<&PerfCounter>,
    ) -> Result<PerfCounter> {
        let pattr = to_perf_attr(attr, options);
        let group_fd = leader.map_or(-1, |l| l.as_raw_fd());
        let fd = ffi::perf_event_open(
            &pattr,
            options.target_pid(),
            cpu as libc::c_int,
            group_fd,
            ffi::PERF_FLAG_FD_CLOEXEC,
        )?;
        debug!(
            "Opened type {} config {:#x} on CPU {} (leader fd {}) as fd {}",
            pattr.type_, pattr.config, cpu, group_fd, fd
        );
        Ok(PerfCounter {
            attr: pattr,
            file: unsafe { std::fs::File::from_raw_fd(fd) },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pmu::attr::PERF_TYPE_SOFTWARE;

    #[test]
    fn test_to_perf_attr() {
        let mut attr = Attribute::raw();
        attr.config = 0x412e;
        attr.config1 = 0x10001;
        attr.exclude_user = true;
        attr.precise_ip = 2;
        attr.sampling = Sampling::Frequency(4000);

        let opts = OpenOptions {
            pid: 0,
            measure_all: false,
        };
        let pattr = to_perf_attr(&attr, &opts);
        assert_eq!(pattr.type_, 4);
        assert_eq!(pattr.size, 128);
        assert_eq!(pattr.config, 0x412e);
        assert_eq!(pattr.bp_addr_or_config1, 0x10001);
        assert_eq!(pattr.sample_period_or_freq, 4000);
        assert_eq!(pattr.precise_ip(), 2);
        for &flag in &[
            ffi::ATTR_FLAG_FREQ,
            ffi::ATTR_FLAG_EXCLUDE_USER,
            ffi::ATTR_FLAG_DISABLED,
            ffi::ATTR_FLAG_ENABLE_ON_EXEC,
            ffi::ATTR_FLAG_INHERIT,
        ] {
            assert!(pattr.has_flag(flag));
        }
        assert!(!pattr.has_flag(ffi::ATTR_FLAG_EXCLUDE_KERNEL));

        let all = OpenOptions {
            pid: 0,
            measure_all: true,
        };
        let pattr = to_perf_attr(&attr, &all);
        assert!(!pattr.has_flag(ffi::ATTR_FLAG_DISABLED));
        assert!(!pattr.has_flag(ffi::ATTR_FLAG_INHERIT));
    }

    #[test]
    fn test_capability_verdict() {
        let all = OpenOptions {
            pid: -1,
            measure_all: true,
        };
        let own = OpenOptions {
            pid: 0,
            measure_all: false,
        };
        assert!(matches!(
            capability_verdict(&all, false, Some(2)),
            Err(Error::PerfNotCapable)
        ));
        assert!(capability_verdict(&all, false, Some(0)).is_ok());
        assert!(capability_verdict(&all, false, Some(-1)).is_ok());
        assert!(capability_verdict(&all, true, Some(2)).is_ok());
        assert!(capability_verdict(&all, false, None).is_ok());
        assert!(capability_verdict(&own, false, Some(2)).is_ok());
        // Own-process counting never needs the paranoid level.
        assert!(PerfBackend.check(&own).is_ok());
    }

    #[test]
    fn test_software_counter_roundtrip() {
        let attr = Attribute {
            pmu_type: PERF_TYPE_SOFTWARE,
            config: 1, // task-clock
            ..Default::default()
        };
        let opts = OpenOptions {
            pid: 0,
            measure_all: false,
        };
        // Kernels or containers without perf access are not a test failure.
        let mut counter = match PerfBackend.open(&attr, &opts, 0, None) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("skipping, perf_event_open unavailable - {}", e);
                return;
            }
        };
        assert!(counter.start().is_ok());
        let work: u64 = (0u64..100_000).filter(|x| x % 3 == 0).sum();
        assert!(work > 0);
        let count = counter.stop_and_read().unwrap();
        assert!(count.enabled >= count.running);
        assert!(counter.close().is_ok());
    }
}
