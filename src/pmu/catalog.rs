//! Per-microarchitecture event catalogs loaded from JSON.

use crate::cpu::CpuId;
use crate::pmu::{EventDescriptor, RawEvent};
use crate::{Error, Result};
use derive_more::IntoIterator;
use log::{debug, info};
use regex::RegexBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable holding the `:` separated catalog search path.
pub const CATALOG_PATH_ENV: &str = "PMU_EVENTS";

/// Where to look for the catalog files of a processor.
#[derive(Debug, Clone)]
pub struct CatalogSource {
    search_paths: Vec<PathBuf>,
    cpu: CpuId,
}

impl CatalogSource {
    /// Search `paths` for the catalog of `cpu`.
    pub fn new<I, P>(paths: I, cpu: CpuId) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        CatalogSource {
            search_paths: paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            cpu,
        }
    }

    /// Search the directories named by `PMU_EVENTS` for the catalog of the local processor.
    pub fn from_env() -> Result<Self> {
        let paths = std::env::var(CATALOG_PATH_ENV)?;
        Ok(CatalogSource::new(
            paths.split(':').filter(|p| !p.is_empty()),
            CpuId::local()?,
        ))
    }

    /// Processor the catalog is searched for.
    pub fn cpu(&self) -> &CpuId {
        &self.cpu
    }

    /// Find the core and the uncore catalog file.
    ///
    /// Each file is searched on its own. Every search directory is tried with the stepping
    /// specific id before any directory is tried with the model-only id. Both files must exist.
    pub fn locate(&self) -> Result<(PathBuf, PathBuf)> {
        Ok((self.find("core")?, self.find("uncore")?))
    }

    fn find(&self, kind: &str) -> Result<PathBuf> {
        for id in self.cpu.candidates() {
            for dir in self.search_paths.iter() {
                let path = dir.join(format!("{}-{}.json", id, kind));
                debug!("Looking for event catalog {}", path.display());
                if path.is_file() {
                    return Ok(path);
                }
            }
        }
        Err(Error::CatalogNotFound(format!("{} ({})", self.cpu.full_id(), kind)))
    }
}

/// Directory of named hardware events, keyed case-insensitively.
#[derive(Debug, Default, IntoIterator)]
pub struct Catalog {
    source: Option<CatalogSource>,
    load_failed: bool,
    #[into_iterator(ref)]
    events: HashMap<String, EventDescriptor>,
}

impl Catalog {
    /// An empty catalog that loads from `source` on demand.
    pub fn with_source(source: CatalogSource) -> Self {
        Catalog {
            source: Some(source),
            load_failed: false,
            events: HashMap::new(),
        }
    }

    /// An empty catalog configured from `PMU_EVENTS` and the local processor.
    pub fn from_env() -> Result<Self> {
        Ok(Catalog::with_source(CatalogSource::from_env()?))
    }

    /// Load the catalog files of the configured source, replacing the current contents.
    ///
    /// Both the core and the uncore file are required.
    pub fn load(&mut self) -> Result<usize> {
        let res = self.load_source();
        self.load_failed = res.is_err();
        res
    }

    fn load_source(&mut self) -> Result<usize> {
        let (core, uncore) = match &self.source {
            Some(src) => src.locate()?,
            None => return Err(Error::CatalogNotFound(String::from("no catalog source"))),
        };
        self.load_files(&[core, uncore])
    }

    /// Load the given JSON files, replacing the current contents.
    ///
    /// A file that cannot be read or holds a malformed record fails the whole load and leaves
    /// the catalog untouched.
    pub fn load_files<P: AsRef<Path>>(&mut self, files: &[P]) -> Result<usize> {
        let mut events = HashMap::new();
        for file in files {
            let path = file.as_ref();
            let load_err = |reason: String| Error::CatalogLoad {
                path: path.display().to_string(),
                reason,
            };
            let text = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
            let raw: Vec<RawEvent> =
                serde_json::from_str(&text).map_err(|e| load_err(e.to_string()))?;
            for r in raw.iter() {
                let evt = EventDescriptor::from_raw_event(r).map_err(|e| load_err(e.to_string()))?;
                if let Some(evt) = evt {
                    events.insert(evt.key(), evt);
                }
            }
        }
        info!("Loaded {} catalog events", events.len());
        self.events = events;
        Ok(self.events.len())
    }

    /// Load the catalog if it holds no events yet.
    ///
    /// Only the first failure is reported. Later calls do nothing until `load` is called
    /// explicitly.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.events.is_empty() && !self.load_failed {
            self.load()?;
        }
        Ok(())
    }

    /// Add a single event, replacing any event of the same name.
    pub fn insert(&mut self, evt: EventDescriptor) {
        self.events.insert(evt.key(), evt);
    }

    /// Look up an event by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&EventDescriptor> {
        self.events.get(&name.to_lowercase())
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` when nothing has been loaded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over all events in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &EventDescriptor> {
        self.events.values()
    }

    /// Filter all `EventDescriptor`s using `predicate`, sorted by name.
    pub fn filter_events<F>(&self, mut predicate: F) -> Vec<&EventDescriptor>
    where
        F: FnMut(&EventDescriptor) -> bool,
    {
        let mut found: Vec<&EventDescriptor> = self.iter().filter(|e| predicate(e)).collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Search for events by name.
    ///
    /// `pattern` is a case-insensitive regex.
    pub fn find_by_name(&self, pattern: &str) -> Result<Vec<&EventDescriptor>> {
        let re = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(self.filter_events(|e| re.is_match(&e.name)))
    }

    /// Every event as a `(lower case name, <pmu>/<encoded>/)` pair, sorted by name.
    pub fn walk(&self) -> Vec<(&str, String)> {
        let mut all: Vec<(&str, String)> = self
            .events
            .iter()
            .map(|(k, e)| (k.as_str(), e.descriptor()))
            .collect();
        all.sort();
        all
    }
}
