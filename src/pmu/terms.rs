//! Parsing of `key[=value]` term lists into an `Attribute`.

use crate::pmu::grammar::{EventParser, Rule};
use crate::pmu::{Attribute, Bitfield, Sampling, Sysfs};
use crate::util::parse_u64;
use crate::{Error, Result};
use log::trace;
use pest::Parser;

/// A single `key[=value]` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term<'a> {
    /// Term name.
    pub key: &'a str,
    /// Raw value text, absent for flag terms such as `edge`.
    pub value: Option<&'a str>,
}

impl<'a> Term<'a> {
    /// Numeric value of the term, `1` when no value was given.
    pub fn numeric_value(&self) -> Result<u64> {
        match self.value {
            None => Ok(1),
            Some(v) => parse_u64(v).map_err(|e| Error::BadTerm {
                term: self.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl<'a> std::fmt::Display for Term<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.value {
            Some(v) => write!(f, "{}={}", self.key, v),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Split a comma separated term list.
pub fn split_terms(terms: &str) -> Result<Vec<Term>> {
    let mut out = Vec::new();
    for list in EventParser::parse(Rule::term_list, terms.trim())? {
        for pair in list.into_inner().filter(|p| p.as_rule() == Rule::term) {
            let mut term = Term {
                key: "",
                value: None,
            };
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::key => term.key = part.as_str().trim(),
                    Rule::value => term.value = Some(part.as_str().trim()),
                    _ => {}
                }
            }
            out.push(term);
        }
    }
    Ok(out)
}

/// Handle terms that set attribute fields directly instead of a bit range.
///
/// Returns `false` when `name` is not one of them.
fn special_term(name: &str, val: u64, attr: &mut Attribute) -> bool {
    match name {
        "period" => attr.sampling = Sampling::Period(val),
        "freq" => attr.sampling = Sampling::Frequency(val),
        "config" => attr.config = val,
        "config1" => attr.config1 = val,
        "config2" => attr.config2 = val,
        _ => return false,
    }
    true
}

/// Applies term lists to attributes using the `format` and `events` directories of a PMU.
#[derive(Debug, Clone, Copy)]
pub struct TermParser<'s> {
    sysfs: &'s Sysfs,
}

impl<'s> TermParser<'s> {
    /// Create a parser reading formats from `sysfs`.
    pub fn new(sysfs: &'s Sysfs) -> Self {
        TermParser { sysfs }
    }

    /// Apply every term of `terms` to `attr`.
    ///
    /// `pmu` is the sysfs directory name of the PMU. A term that is neither special, a format
    /// field, nor a kernel alias aborts the whole list.
    pub fn apply(&self, pmu: &str, terms: &str, attr: &mut Attribute) -> Result<()> {
        self.apply_at_depth(pmu, terms, attr, 0)
    }

    fn apply_at_depth(&self, pmu: &str, terms: &str, attr: &mut Attribute, depth: u32) -> Result<()> {
        trace!("parse_terms: pmu {} terms {} depth {}", pmu, terms, depth);
        for term in split_terms(terms)? {
            if term.key == "name" {
                continue;
            }
            let val = term.numeric_value()?;
            if special_term(term.key, val, attr) {
                continue;
            }

            if let Some(format) = self.sysfs.format(pmu, term.key) {
                format.parse::<Bitfield>()?.pack(val, attr);
                continue;
            }

            // Aliases expand one level only.
            let alias = if depth == 0 {
                self.sysfs.alias(pmu, term.key)
            } else {
                None
            };
            match alias {
                Some(expansion) => {
                    trace!("parse_terms: alias {} -> {}", term.key, expansion);
                    self.apply_at_depth(pmu, &expansion, attr, depth + 1)?;
                }
                None => {
                    return Err(Error::UnknownTerm {
                        pmu: pmu.to_string(),
                        term: term.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeSysfs;

    #[test]
    fn test_split_terms() -> Result<()> {
        let terms = split_terms("event=0x2e, umask=0x41,edge,name=llc_miss,")?;
        assert_eq!(terms.len(), 4);
        assert_eq!(terms[0], Term { key: "event", value: Some("0x2e") });
        assert_eq!(terms[1], Term { key: "umask", value: Some("0x41") });
        assert_eq!(terms[2], Term { key: "edge", value: None });
        assert_eq!(terms[3].value, Some("llc_miss"));
        assert!(split_terms("")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_apply_formats() -> Result<()> {
        let fake = FakeSysfs::new();
        fake.intel_cpu();
        let sysfs = fake.sysfs();
        let parser = TermParser::new(&sysfs);

        let mut attr = Attribute::raw();
        parser.apply("cpu", "event=0x2e,umask=0x41", &mut attr)?;
        assert_eq!(attr.config, 0x412e);

        let mut attr = Attribute::raw();
        parser.apply("cpu", "event=0xa3,umask=0x14,cmask=20,edge,inv", &mut attr)?;
        assert_eq!(attr.config, 0xa3 | 0x14 << 8 | 1 << 18 | 1 << 23 | 20 << 24);

        let mut attr = Attribute::raw();
        parser.apply("cpu", "event=0xb7,umask=0x1,offcore_rsp=0x10001", &mut attr)?;
        assert_eq!(attr.config, 0x01b7);
        assert_eq!(attr.config1, 0x10001);
        Ok(())
    }

    #[test]
    fn test_special_terms() -> Result<()> {
        let fake = FakeSysfs::new();
        fake.intel_cpu();
        let sysfs = fake.sysfs();
        let parser = TermParser::new(&sysfs);

        let mut attr = Attribute::raw();
        parser.apply("cpu", "event=0xc0,period=2000003,name=retired", &mut attr)?;
        assert_eq!(attr.config, 0xc0);
        assert_eq!(attr.sampling, Sampling::Period(2_000_003));

        let mut attr = Attribute::raw();
        parser.apply("cpu", "event=0xc0,freq=4000,config1=7,config2=9", &mut attr)?;
        assert_eq!(attr.sampling, Sampling::Frequency(4000));
        assert_eq!(attr.config1, 7);
        assert_eq!(attr.config2, 9);

        let mut attr = Attribute::raw();
        parser.apply("cpu", "event=0xc0,config=0x1234", &mut attr)?;
        assert_eq!(attr.config, 0x1234);
        Ok(())
    }

    #[test]
    fn test_alias_expansion_one_level() -> Result<()> {
        let fake = FakeSysfs::new();
        fake.intel_cpu()
            .alias("cpu", "loop-a", "loop-b")
            .alias("cpu", "loop-b", "event=0x1");
        let sysfs = fake.sysfs();
        let parser = TermParser::new(&sysfs);

        let mut attr = Attribute::raw();
        parser.apply("cpu", "cpu-cycles", &mut attr)?;
        assert_eq!(attr.config, 0x3c);

        let mut attr = Attribute::raw();
        let err = parser.apply("cpu", "loop-a", &mut attr).unwrap_err();
        assert!(matches!(err, Error::UnknownTerm { .. }));
        Ok(())
    }

    #[test]
    fn test_term_errors() {
        let fake = FakeSysfs::new();
        fake.intel_cpu().format("cpu", "broken", "config:x");
        let sysfs = fake.sysfs();
        let parser = TermParser::new(&sysfs);
        let mut attr = Attribute::raw();

        assert!(matches!(
            parser.apply("cpu", "event=zz", &mut attr),
            Err(Error::BadTerm { .. })
        ));
        assert!(matches!(
            parser.apply("cpu", "offcore_rsp=", &mut attr),
            Err(Error::BadTerm { .. })
        ));
        assert!(matches!(
            parser.apply("cpu", "bogus=1", &mut attr),
            Err(Error::UnknownTerm { .. })
        ));
        assert!(matches!(
            parser.apply("cpu", "broken=1", &mut attr),
            Err(Error::BadFormat { .. })
        ));
    }
}
