//! Packing of term values into the bit ranges named by sysfs `format` files.

use crate::pmu::Attribute;
use crate::{Error, Result};
use lazy_static::lazy_static;
use log::trace;
use regex::Regex;
use std::str::FromStr;

lazy_static! {
    static ref BIT_RANGE: Regex = Regex::new(r"^(\d+)(?:([-=])(\d+))?$").unwrap();
}

/// Configuration word of an `Attribute` that a format field writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWord {
    /// `Attribute::config`.
    Config,
    /// `Attribute::config1`.
    Config1,
    /// `Attribute::config2`.
    Config2,
}

/// Mask covering the low `width` bits.
#[inline]
fn bits(width: u32) -> u64 {
    if width >= 64 {
        !0
    } else {
        (1u64 << width) - 1
    }
}

/// A parsed format such as `config:0-7` or `config1:0-63`.
///
/// Multi-range formats (`config:0-7,32-35`) take consecutive value bits, lowest range first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    word: ConfigWord,
    /// Inclusive `(lo, hi)` bit ranges.
    ranges: Vec<(u32, u32)>,
}

impl Bitfield {
    /// Target word of this field.
    pub fn word(&self) -> ConfigWord {
        self.word
    }

    /// Total number of bits covered by this field.
    pub fn width(&self) -> u32 {
        self.ranges.iter().map(|(lo, hi)| hi - lo + 1).sum()
    }

    /// OR `value` into the target word of `attr`.
    ///
    /// Bits of `value` beyond the field's width are discarded; bits outside the field are left
    /// untouched.
    pub fn pack(&self, value: u64, attr: &mut Attribute) {
        let word = match self.word {
            ConfigWord::Config => &mut attr.config,
            ConfigWord::Config1 => &mut attr.config1,
            ConfigWord::Config2 => &mut attr.config2,
        };
        let mut remaining = value;
        for &(lo, hi) in self.ranges.iter() {
            let width = hi - lo + 1;
            *word |= (remaining & bits(width)) << lo;
            remaining = if width >= 64 { 0 } else { remaining >> width };
        }
        trace!("pack: {:#x} into {:?} -> {:#018x}", value, self, *word);
    }
}

impl FromStr for Bitfield {
    type Err = Error;

    fn from_str(format: &str) -> Result<Self> {
        let bad = |reason: &str| Error::BadFormat {
            format: format.to_string(),
            reason: reason.to_string(),
        };

        let format = format.trim();
        let colon = format.find(':').ok_or_else(|| bad("missing ':'"))?;
        let target = &format[..colon];
        let mut ranges = Vec::new();
        let mut single_bit = true;

        for part in format[colon + 1..].split(',') {
            let caps = BIT_RANGE
                .captures(part.trim())
                .ok_or_else(|| bad("expected <bit> or <hi>-<lo>"))?;
            let first: u32 = caps[1].parse()?;
            let (lo, hi) = match (caps.get(2), caps.get(3)) {
                (Some(sep), Some(second)) => {
                    // `=` only ever appears as a config2 range separator.
                    if sep.as_str() == "=" && target != "config2" {
                        return Err(bad("'=' range separator outside config2"));
                    }
                    let second: u32 = second.as_str().parse()?;
                    single_bit = false;
                    (first.min(second), first.max(second))
                }
                _ => (first, first),
            };
            if hi > 63 {
                return Err(bad("bit index beyond 63"));
            }
            ranges.push((lo, hi));
        }
        single_bit &= ranges.len() == 1;

        let word = match target {
            "config" => ConfigWord::Config,
            // Single bit config1 fields land in config. Kept as observed until validated on
            // hardware that actually exposes such a field.
            "config1" if single_bit => ConfigWord::Config,
            "config1" => ConfigWord::Config1,
            "config2" => ConfigWord::Config2,
            _ => return Err(bad("unknown configuration word")),
        };

        Ok(Bitfield { word, ranges })
    }
}
