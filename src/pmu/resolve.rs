//! Translation of event names into counter attributes.

use crate::pmu::grammar::{EventParser, Rule};
use crate::pmu::{generic_event, Attribute, Catalog, Sysfs, TermParser};
use crate::{Error, Result};
use log::{debug, trace, warn};
use pest::iterators::Pair;
use pest::Parser;

/// Catalog events whose encoding is replaced before resolving.
const FIXED_EVENTS: [(&str, &str); 3] = [
    ("inst_retired.any", "event=0xc0"),
    ("cpu_clk_unhalted.thread", "event=0x3c"),
    ("cpu_clk_unhalted.thread_any", "event=0x3c,any=1"),
];

fn fixed_encoding(name: &str) -> Option<&'static str> {
    FIXED_EVENTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, enc)| *enc)
}

/// Resolves event names against a catalog and the sysfs PMU tree.
#[derive(Debug)]
pub struct Resolver<'a> {
    catalog: &'a mut Catalog,
    sysfs: &'a Sysfs,
}

impl<'a> Resolver<'a> {
    /// Create a resolver. The catalog is loaded on first use if empty.
    pub fn new(catalog: &'a mut Catalog, sysfs: &'a Sysfs) -> Self {
        Resolver { catalog, sysfs }
    }

    /// Catalog used for name lookups.
    pub fn catalog(&self) -> &Catalog {
        &*self.catalog
    }

    /// Sysfs tree used for PMU lookups.
    pub fn sysfs(&self) -> &Sysfs {
        self.sysfs
    }

    /// Resolve `name` into a fully packed attribute.
    ///
    /// Tried in order: the catalog, a raw or `<pmu>/<terms>/` descriptor, `cpu/<name>/` and
    /// finally the kernel's generic events.
    pub fn resolve(&mut self, name: &str) -> Result<Attribute> {
        let name = name.trim();
        debug!("resolve: {}", name);

        if let Some(descriptor) = self.catalog_descriptor(name) {
            trace!("resolve: {} found in catalog as {}", name, descriptor);
            match self.resolve_descriptor(&descriptor) {
                Ok(attr) => return Ok(attr),
                Err(e) => trace!("resolve: catalog entry {} - {}", descriptor, e),
            }
        }

        match self.resolve_descriptor(name) {
            Ok(attr) => return Ok(attr),
            Err(e) => trace!("resolve: {} is not a descriptor - {}", name, e),
        }

        let cpu_event = format!("cpu/{}/", name);
        match self.resolve_descriptor(&cpu_event) {
            Ok(attr) => return Ok(attr),
            Err(e) => trace!("resolve: {} - {}", cpu_event, e),
        }

        generic_event(name).ok_or_else(|| Error::EventNotFound(name.to_string()))
    }

    /// `<pmu>/<encoded>/` string of a catalog event, loading the catalog if it is empty.
    fn catalog_descriptor(&mut self, name: &str) -> Option<String> {
        if let Err(e) = self.catalog.ensure_loaded() {
            warn!("Could not load event catalog - {}", e);
        }
        let evt = self.catalog.get(name)?;
        let encoded = fixed_encoding(&evt.key()).unwrap_or(evt.encoded.as_str());
        Some(format!("{}/{}/", evt.pmu, encoded))
    }

    /// Resolve `r<hex>[:quals]` or `[/]<pmu>/<terms>[/][:quals]`.
    pub fn resolve_descriptor(&self, descriptor: &str) -> Result<Attribute> {
        let mut attr = Attribute::raw();
        for top in EventParser::parse(Rule::descriptor, descriptor)? {
            for evt in top.into_inner() {
                match evt.as_rule() {
                    Rule::raw_event => self.raw_event(evt, &mut attr, descriptor)?,
                    Rule::pmu_event => self.pmu_event(evt, &mut attr, descriptor)?,
                    _ => {}
                }
            }
        }
        Ok(attr)
    }

    fn raw_event(&self, evt: Pair<Rule>, attr: &mut Attribute, descriptor: &str) -> Result<()> {
        for part in evt.into_inner() {
            match part.as_rule() {
                Rule::raw_code => {
                    let code = part.as_str();
                    let hex = code
                        .strip_prefix("0x")
                        .or_else(|| code.strip_prefix("0X"))
                        .unwrap_or(code);
                    attr.config = u64::from_str_radix(hex, 16)?;
                }
                Rule::qualifiers => attr.apply_qualifiers(modifiers(part), descriptor),
                _ => {}
            }
        }
        Ok(())
    }

    fn pmu_event(&self, evt: Pair<Rule>, attr: &mut Attribute, descriptor: &str) -> Result<()> {
        let mut quals = None;
        let mut pmu = "";
        let mut terms = "";
        for part in evt.into_inner() {
            match part.as_rule() {
                Rule::pmu => pmu = part.as_str(),
                Rule::terms => terms = part.as_str(),
                Rule::qualifiers => quals = Some(modifiers(part)),
                _ => {}
            }
        }

        let (pmu_type, dir) = self
            .sysfs
            .pmu_type(pmu)
            .ok_or_else(|| Error::UnknownPmu(pmu.to_string()))?;
        attr.pmu_type = pmu_type;
        TermParser::new(self.sysfs).apply(&dir, terms, attr)?;
        if let Some(q) = quals {
            attr.apply_qualifiers(q, descriptor);
        }
        Ok(())
    }

    /// Whether `name` is counted by an uncore PMU.
    ///
    /// Catalog events are classified by their PMU, anything else by the name itself.
    pub fn is_uncore(&self, name: &str) -> bool {
        let name = name.trim();
        let hint = self.catalog.get(name).map(|e| e.pmu.as_str());
        self.sysfs.is_uncore(name, hint)
    }
}

fn modifiers<'i>(qualifiers: Pair<'i, Rule>) -> &'i str {
    qualifiers
        .into_inner()
        .next()
        .map_or("", |m| m.as_str())
}
