//! Measurement sessions: parse an event expression, then open, start, stop and close one counter
//! per event and CPU.
//!
//! ```no_run
//! use pmu_session::{Catalog, PerfBackend, Resolver, Session, Sysfs};
//!
//! # fn main() -> pmu_session::Result<()> {
//! let sysfs = Sysfs::default();
//! let mut catalog = Catalog::from_env()?;
//! let mut resolver = Resolver::new(&mut catalog, &sysfs);
//! let mut session = Session::with_sysfs(PerfBackend, &sysfs);
//! session.parse("{cpu-cycles;instructions};cache-misses", &mut resolver)?;
//! session.open(true, -1)?;
//! session.start()?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! session.stop()?;
//! for evt in session.events() {
//!     println!("{} {}", evt.name(), evt.total_sum());
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```

use crate::perf::{Count, CounterBackend, CounterHandle, OpenOptions};
use crate::pmu::{Attribute, Resolver, Sysfs};
use crate::{Error, Result};
use derive_more::Display;
use log::{debug, info, warn};
use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;

/// Event driving the retired instruction count of the IPC figure.
const IPC_RETIRED: &str = "inst_retired.any";
/// Event driving the core clock count of the IPC figure.
const IPC_CLOCKS: &str = "cpu_clk_unhalted.thread_any";

/// Lifecycle state of a `Session`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No counters are open.
    Closed,
    /// Events are resolved but no counters are open.
    Parsed,
    /// Counters are open but not counting.
    Opened,
    /// Counters are counting.
    Running,
    /// Counters are stopped and their values read.
    Stopped,
}

/// Counter of one event on one CPU.
#[derive(Debug)]
pub struct CpuCounter<H> {
    handle: H,
    count: Count,
    scaled: u64,
}

impl<H> CpuCounter<H> {
    /// Backend handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Last raw reading.
    pub fn count(&self) -> Count {
        self.count
    }

    /// Last reading scaled for multiplexing.
    pub fn scaled(&self) -> u64 {
        self.scaled
    }
}

/// A resolved event and its per-CPU counters.
#[derive(Debug)]
pub struct ParsedEvent<H> {
    name: String,
    attr: Attribute,
    group_leader: bool,
    end_group: bool,
    uncore: bool,
    cpus: Vec<Option<CpuCounter<H>>>,
    total_sum: u64,
}

impl<H> ParsedEvent<H> {
    /// Event name as written in the expression.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved attribute.
    pub fn attr(&self) -> &Attribute {
        &self.attr
    }

    /// Whether this event leads a counter group.
    pub fn is_group_leader(&self) -> bool {
        self.group_leader
    }

    /// Whether this event closes a counter group.
    pub fn is_end_of_group(&self) -> bool {
        self.end_group
    }

    /// Whether this event is counted by an uncore PMU.
    pub fn is_uncore(&self) -> bool {
        self.uncore
    }

    /// Sum of the scaled values over all CPUs at the last stop.
    pub fn total_sum(&self) -> u64 {
        self.total_sum
    }

    /// Counter on `cpu`, if one is open.
    pub fn cpu(&self, cpu: usize) -> Option<&CpuCounter<H>> {
        self.cpus.get(cpu).and_then(Option::as_ref)
    }

    /// Scaled value per CPU, `None` for CPUs without a counter.
    pub fn scaled_values(&self) -> Vec<Option<u64>> {
        self.cpus
            .iter()
            .map(|c| c.as_ref().map(CpuCounter::scaled))
            .collect()
    }

    fn handle(&self, cpu: usize) -> Option<&H> {
        self.cpu(cpu).map(CpuCounter::handle)
    }
}

/// Values of one event at the last stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSnapshot {
    /// Event name.
    pub name: String,
    /// Sum over all CPUs.
    pub sum: u64,
    /// Scaled value per CPU, 0 for CPUs without a counter.
    pub per_cpu: Vec<u64>,
}

/// Restores the thread's CPU affinity when dropped.
struct AffinityGuard {
    saved: Option<CpuSet>,
}

impl AffinityGuard {
    fn acquire() -> Self {
        let saved = match sched_getaffinity(Pid::from_raw(0)) {
            Ok(set) => Some(set),
            Err(e) => {
                warn!("Cannot read CPU affinity - {}", e);
                None
            }
        };
        AffinityGuard { saved }
    }

    /// Move the calling thread to `cpu`. Best effort.
    fn pin(&self, cpu: usize) {
        let mut set = CpuSet::new();
        let res = set
            .set(cpu)
            .and_then(|_| sched_setaffinity(Pid::from_raw(0), &set));
        if let Err(e) = res {
            debug!("Cannot pin thread to CPU {} - {}", cpu, e);
        }
    }
}

impl Drop for AffinityGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.as_ref() {
            if let Err(e) = sched_setaffinity(Pid::from_raw(0), saved) {
                warn!("Cannot restore CPU affinity - {}", e);
            }
        }
    }
}

/// Owns the events and counters of one measurement.
pub struct Session<B: CounterBackend> {
    backend: B,
    num_cpus: usize,
    events: Vec<ParsedEvent<B::Handle>>,
    state: SessionState,
}

impl<B: CounterBackend> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let names: Vec<&str> = self.events.iter().map(|e| e.name.as_str()).collect();
        f.debug_struct("Session")
            .field("num_cpus", &self.num_cpus)
            .field("state", &self.state)
            .field("events", &names)
            .finish()
    }
}

impl<B: CounterBackend> Session<B> {
    /// A session counting on CPUs `0..num_cpus`.
    pub fn new(backend: B, num_cpus: usize) -> Self {
        Session {
            backend,
            num_cpus,
            events: Vec::new(),
            state: SessionState::Closed,
        }
    }

    /// A session counting on every online CPU.
    pub fn with_sysfs(backend: B, sysfs: &Sysfs) -> Self {
        Session::new(backend, sysfs.num_cpus())
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of CPUs counters are opened on.
    pub fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    /// Parsed events in expression order.
    pub fn events(&self) -> &[ParsedEvent<B::Handle>] {
        &self.events
    }

    /// Counter backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn expect_state(&self, op: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    /// Resolve a `;` separated event expression.
    ///
    /// `{` before a name starts a group and `}` after a name ends it. Any name that fails to
    /// resolve fails the whole expression and leaves the session unchanged.
    pub fn parse(&mut self, expr: &str, resolver: &mut Resolver) -> Result<()> {
        self.expect_state("parse", &[SessionState::Closed, SessionState::Parsed])?;

        let mut events = Vec::new();
        for token in expr.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            let (token, group_leader) = match token.strip_prefix('{') {
                Some(rest) => (rest.trim(), true),
                None => (token, false),
            };
            let (name, end_group) = match token.strip_suffix('}') {
                Some(rest) => (rest.trim(), true),
                None => (token, false),
            };
            let attr = resolver.resolve(name).map_err(|e| {
                if e.is_resolve_error() {
                    warn!("parse: cannot resolve {} - {}", name, e);
                }
                e
            })?;
            let uncore = resolver.is_uncore(name);
            debug!(
                "parse: {} leader {} end {} uncore {} -> {:?}",
                name, group_leader, end_group, uncore, attr
            );
            events.push(ParsedEvent {
                name: name.to_string(),
                attr,
                group_leader,
                end_group,
                uncore,
                cpus: Vec::new(),
                total_sum: 0,
            });
        }
        if events.is_empty() {
            return Err(Error::EmptyEventList);
        }

        info!("Parsed {} events", events.len());
        self.events = events;
        self.state = SessionState::Parsed;
        Ok(())
    }

    /// CPUs an event is opened on, in opening order.
    fn target_cpus(&self, uncore: bool) -> Vec<usize> {
        if uncore {
            // CPU 0 is the representative of the socket and goes first.
            std::iter::once(0).chain(1..self.num_cpus).collect()
        } else {
            (0..self.num_cpus).collect()
        }
    }

    /// Open one counter per event and CPU.
    ///
    /// With `measure_all` counters count every process and start enabled, otherwise they count
    /// `pid` and its children and are enabled on exec. The backend may refuse `options` up
    /// front, leaving the session untouched. If any open fails the counters opened so far stay
    /// open and must be released with `close`.
    pub fn open(&mut self, measure_all: bool, pid: i32) -> Result<()> {
        self.expect_state("open", &[SessionState::Parsed, SessionState::Closed])?;
        if self.events.is_empty() {
            return Err(Error::EmptyEventList);
        }
        let options = OpenOptions { pid, measure_all };
        self.backend.check(&options)?;

        let affinity = AffinityGuard::acquire();
        self.state = SessionState::Opened;
        let mut leader: Option<usize> = None;
        for idx in 0..self.events.len() {
            let cpus = self.target_cpus(self.events[idx].uncore);
            let (before, rest) = self.events.split_at_mut(idx);
            let evt = &mut rest[0];
            evt.cpus = (0..self.num_cpus).map(|_| None).collect();
            evt.total_sum = 0;

            for cpu in cpus {
                affinity.pin(cpu);
                let leader_handle = leader.and_then(|l| before[l].handle(cpu));
                let handle = self
                    .backend
                    .open(&evt.attr, &options, cpu, leader_handle)
                    .map_err(|e| Error::Open {
                        event: evt.name.clone(),
                        cpu,
                        reason: e.to_string(),
                    })?;
                evt.cpus[cpu] = Some(CpuCounter {
                    handle,
                    count: Count::default(),
                    scaled: 0,
                });
            }

            if evt.group_leader {
                debug!("open: group leader {}", evt.name);
                leader = Some(idx);
            }
            if evt.end_group {
                debug!("open: end of group {}", evt.name);
                leader = None;
            }
        }
        info!(
            "Opened {} events on {} CPUs",
            self.events.len(),
            self.num_cpus
        );
        Ok(())
    }

    /// Start every open counter.
    ///
    /// The first failure aborts; counters already started keep counting.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", &[SessionState::Opened, SessionState::Stopped])?;
        if self.events.is_empty() {
            return Err(Error::EmptyEventList);
        }
        for evt in self.events.iter_mut() {
            for counter in evt.cpus.iter_mut().flatten() {
                counter.handle.start()?;
            }
        }
        self.state = SessionState::Running;
        Ok(())
    }

    /// Stop every counter, read it and update the scaled values and per-event sums.
    ///
    /// The CPUs of an event are read in order up to the first CPU without a counter. A counter
    /// read with zero enabled time keeps its previous scaled value.
    pub fn stop(&mut self) -> Result<()> {
        self.expect_state("stop", &[SessionState::Running])?;
        if self.events.is_empty() {
            return Err(Error::EmptyEventList);
        }
        for evt in self.events.iter_mut() {
            let mut total_sum = 0u64;
            for slot in evt.cpus.iter_mut() {
                let counter = match slot {
                    Some(c) => c,
                    None => break,
                };
                counter.count = counter.handle.stop_and_read()?;
                // A read without enabled time keeps the previous scaled value.
                if counter.count.enabled != 0 {
                    counter.scaled = counter.count.scaled();
                }
                total_sum = total_sum.wrapping_add(counter.scaled);
            }
            evt.total_sum = total_sum;
        }
        self.state = SessionState::Stopped;
        Ok(())
    }

    /// Release every open counter.
    ///
    /// Counters are not stopped first. Every counter is released even if some fail, the first
    /// failure is returned.
    pub fn close(&mut self) -> Result<()> {
        let mut first_err = None;
        for evt in self.events.iter_mut() {
            for counter in evt.cpus.drain(..).flatten() {
                if let Err(e) = counter.handle.close() {
                    warn!("Cannot close counter of {} - {}", evt.name, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        self.state = SessionState::Closed;
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Values of every event at the last stop.
    pub fn collect(&self) -> Vec<EventSnapshot> {
        self.events
            .iter()
            .map(|evt| EventSnapshot {
                name: evt.name.clone(),
                sum: evt.total_sum,
                per_cpu: (0..self.num_cpus)
                    .map(|cpu| evt.cpu(cpu).map_or(0, CpuCounter::scaled))
                    .collect(),
            })
            .collect()
    }

    /// Instructions per cycle of each CPU at the last stop.
    ///
    /// Needs both `inst_retired.any` and `cpu_clk_unhalted.thread_any`; the latter counts both
    /// hyperthreads, so it is halved. CPUs without clocks report 0.
    pub fn ipc(&self) -> Option<Vec<f64>> {
        let find = |name: &str| self.events.iter().find(|e| e.name.eq_ignore_ascii_case(name));
        let retired = find(IPC_RETIRED)?;
        let clocks = find(IPC_CLOCKS)?;
        let ipc = (0..self.num_cpus)
            .map(|cpu| {
                let retired = retired.cpu(cpu).map_or(0, CpuCounter::scaled) as f64;
                let clocks = clocks.cpu(cpu).map_or(0, CpuCounter::scaled) as f64 / 2.0;
                if clocks > 0.0 {
                    retired / clocks
                } else {
                    0.0
                }
            })
            .collect();
        Some(ipc)
    }
}
