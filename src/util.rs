//! Utilities used in this crate.
//!
//! This is not part of the public interface of the crate.

use std::path::Path;

/// Parse an unsigned integer, taking the base from its prefix.
///
/// `0x`/`0X` is hexadecimal, `0o`/`0O` or a bare leading `0` is octal, `0b`/`0B` is binary and
/// everything else is decimal.
pub fn parse_u64(s: &str) -> std::result::Result<u64, std::num::ParseIntError> {
    let s = s.trim();
    let (digits, radix) = if let Some(h) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (h, 16)
    } else if let Some(o) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        (o, 8)
    } else if let Some(b) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (b, 2)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };
    u64::from_str_radix(digits, radix)
}

/// Parse a kernel CPU list such as `0-3,8,10-11`.
///
/// The result is sorted and free of duplicates.
pub fn parse_cpu_list(s: &str) -> std::result::Result<Vec<usize>, std::num::ParseIntError> {
    let mut cpus = Vec::new();
    for part in s.trim().split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.find('-') {
            Some(idx) => {
                let lo: usize = part[..idx].trim().parse()?;
                let hi: usize = part[idx + 1..].trim().parse()?;
                cpus.extend(lo.min(hi)..=lo.max(hi));
            }
            None => cpus.push(part.parse()?),
        }
    }
    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

/// Read a small text file and trim it.
///
/// Missing, unreadable and empty files all yield `None`.
pub fn read_trimmed<P: AsRef<Path>>(path: P) -> Option<String> {
    std::fs::read_to_string(path.as_ref())
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
