//! Hand-declared subset of the kernel's `linux/perf_event.h`.

#![allow(missing_docs, non_upper_case_globals)]

use crate::{Error, Result};
use nix::ioctl_none;
use nix::libc;

/// Attribute size the kernel knows as `PERF_ATTR_SIZE_VER7`.
pub const PERF_ATTR_SIZE: u32 = 128;

// attr.read_format
pub const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
pub const PERF_FORMAT_TOTAL_TIME_RUNNING: u64 = 1 << 1;

// attr.flags, bit N of the C bitfield is (1 << N) on little-endian targets.
pub const ATTR_FLAG_DISABLED: u64 = 1 << 0;
pub const ATTR_FLAG_INHERIT: u64 = 1 << 1;
pub const ATTR_FLAG_EXCLUDE_USER: u64 = 1 << 4;
pub const ATTR_FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
pub const ATTR_FLAG_EXCLUDE_HV: u64 = 1 << 6;
pub const ATTR_FLAG_FREQ: u64 = 1 << 10;
pub const ATTR_FLAG_ENABLE_ON_EXEC: u64 = 1 << 12;
pub const ATTR_PRECISE_IP_SHIFT: u64 = 15;
pub const ATTR_FLAG_EXCLUDE_GUEST: u64 = 1 << 20;

pub const PERF_FLAG_FD_CLOEXEC: libc::c_ulong = 1 << 3;

/// `struct perf_event_attr`, with the anonymous unions flattened.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PerfEventAttr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period_or_freq: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events_or_watermark: u32,
    pub bp_type: u32,
    pub bp_addr_or_config1: u64,
    pub bp_len_or_config2: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clock_id: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub __reserved_2: u16,
    pub aux_sample_size: u32,
    pub __reserved_3: u32,
    pub sig_data: u64,
}

impl PerfEventAttr {
    /// Set or clear a single flag bit.
    pub fn set_flag(&mut self, flag: u64, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    pub fn has_flag(&self, flag: u64) -> bool {
        self.flags & flag != 0
    }

    /// Two bit skid constraint.
    pub fn set_precise_ip(&mut self, precise: u8) {
        self.flags &= !(0b11 << ATTR_PRECISE_IP_SHIFT);
        self.flags |= (u64::from(precise) & 0b11) << ATTR_PRECISE_IP_SHIFT;
    }

    pub fn precise_ip(&self) -> u8 {
        ((self.flags >> ATTR_PRECISE_IP_SHIFT) & 0b11) as u8
    }
}

// The Ioctls are defined as macro functions in the kernel headers.
// Details at https://elixir.bootlin.com/linux/v5.3.10/source/include/uapi/linux/perf_event.h#L456
ioctl_none!(perf_event_ioc_enable, b'$', 0);
ioctl_none!(perf_event_ioc_disable, b'$', 1);
ioctl_none!(perf_event_ioc_reset, b'$', 3);

/// Rust wrapper for the `perf_event_open` system call.
pub fn perf_event_open(
    attr: &PerfEventAttr,
    pid: libc::pid_t,
    cpu: libc::c_int,
    group_fd: libc::c_int,
    flags: libc::c_ulong,
) -> Result<std::os::unix::io::RawFd> {
    unsafe {
        let fd = libc::syscall(
            libc::SYS_perf_event_open,
            attr as *const _,
            pid,
            cpu,
            group_fd,
            flags,
        );
        match fd {
            -1 => Err(Error::from_errno()),
            rc => Ok(rc as _),
        }
    }
}
