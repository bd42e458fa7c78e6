//! Utilities dealing with error handling in this crate.

use failure::Fail;

/// Errors produced by this crate.
#[derive(Debug, Fail)]
pub enum Error {
    /// Errors originating from calls to `std::io::*`.
    #[fail(display = "IO Error - {}", _0)]
    IO(#[cause] std::io::Error),
    /// Errors originating from calls to `std::env::*`.
    #[fail(display = "Env Error - {}", _0)]
    Env(#[cause] std::env::VarError),
    /// Errors originating from calls to `regex::*`.
    #[fail(display = "Regex Error - {}", _0)]
    Regex(#[cause] regex::Error),
    /// Errors parsing Glob patterns.
    #[fail(display = "Glob Error - {}", _0)]
    GlobPattern(#[cause] glob::PatternError),
    /// Errors interating over entries in a glob.
    #[fail(display = "Glob Error - {}", _0)]
    GlobIter(#[cause] glob::GlobError),
    /// Errors caused by parsing integers from strings.
    #[fail(display = "Parse Error - {}", _0)]
    ParseInt(#[cause] std::num::ParseIntError),
    /// Errors caused by malformed JSON documents.
    #[fail(display = "JSON Error - {}", _0)]
    Json(#[cause] serde_json::Error),
    /// Errors caused by event strings that do not follow the event grammar.
    #[fail(display = "Event syntax error - {}", _0)]
    EventSyntax(#[cause] pest::error::Error<crate::pmu::Rule>),
    /// Errors originating from calls to `libc` or other system utilties.
    #[fail(display = "System Error - {}", _0)]
    System(#[cause] nix::Error),

    /// An event catalog file could not be loaded.
    ///
    /// Any malformed numeric field fails the whole file.
    #[fail(display = "Cannot load event catalog {} - {}", path, reason)]
    CatalogLoad {
        /// File being loaded.
        path: String,
        /// What was wrong with it.
        reason: String,
    },
    /// No catalog file exists for the CPU identification string in any search directory.
    #[fail(display = "No event catalog found for {}", _0)]
    CatalogNotFound(String),

    /// None of the resolution paths know the event.
    #[fail(display = "({}) not found in event list", _0)]
    EventNotFound(String),
    /// The PMU named in an event descriptor has no `type` file.
    #[fail(display = "Unknown PMU {}", _0)]
    UnknownPmu(String),
    /// A `key=value` term has a malformed value.
    #[fail(display = "Cannot parse term {} - {}", term, reason)]
    BadTerm {
        /// Offending term.
        term: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A sysfs format string does not match any supported bit range shape.
    #[fail(display = "Cannot parse kernel format {} - {}", format, reason)]
    BadFormat {
        /// Offending format string.
        format: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A term is neither a special term, a format field nor a first level alias of the PMU.
    #[fail(display = "Cannot parse qualifier {} for PMU {}", term, pmu)]
    UnknownTerm {
        /// PMU whose sysfs directory was searched.
        pmu: String,
        /// Offending term.
        term: String,
    },

    /// The counter backend refused to open an event.
    #[fail(display = "perf open failed for {} on CPU {} - {}", event, cpu, reason)]
    Open {
        /// Event being opened.
        event: String,
        /// Target CPU.
        cpu: usize,
        /// Backend failure.
        reason: String,
    },
    /// A session operation was given no events.
    #[fail(display = "event list is empty")]
    EmptyEventList,
    /// A session operation was attempted in a state that does not allow it.
    #[fail(display = "Cannot {} a session in state {}", op, state)]
    InvalidState {
        /// Attempted operation.
        op: &'static str,
        /// State of the session at the time.
        state: crate::session::SessionState,
    },
    /// Errors caused by capability checks on the kernel.
    #[fail(display = "Not allowed by kernel")]
    PerfNotCapable,
}

impl Error {
    /// Create a new instance of error from the `errno` variable.
    #[inline]
    pub fn from_errno() -> Self {
        Error::System(nix::errno::Errno::last())
    }

    /// Returns `true` for errors that concern a single event name rather than the environment.
    pub fn is_resolve_error(&self) -> bool {
        matches!(
            self,
            Error::EventNotFound(_)
                | Error::UnknownPmu(_)
                | Error::BadTerm { .. }
                | Error::BadFormat { .. }
                | Error::UnknownTerm { .. }
                | Error::EventSyntax(_)
        )
    }
}

macro_rules! error_from {
    ($et: ty => $cet: expr) => {
        impl From<$et> for Error {
            #[inline]
            fn from(err: $et) -> Self {
                $cet(err)
            }
        }
    };
}

error_from!(std::io::Error => Error::IO);
error_from!(std::env::VarError => Error::Env);
error_from!(regex::Error => Error::Regex);
error_from!(glob::PatternError => Error::GlobPattern);
error_from!(glob::GlobError => Error::GlobIter);
error_from!(std::num::ParseIntError => Error::ParseInt);
error_from!(serde_json::Error => Error::Json);
error_from!(pest::error::Error<crate::pmu::Rule> => Error::EventSyntax);
error_from!(nix::Error => Error::System);

/// Result type used in this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_classification() {
        assert!(Error::EventNotFound("foo".into()).is_resolve_error());
        assert!(Error::UnknownPmu("bar".into()).is_resolve_error());
        assert!(!Error::EmptyEventList.is_resolve_error());
        assert!(!Error::CatalogNotFound("GenuineIntel-6-55".into()).is_resolve_error());
    }

    #[test]
    fn test_display() {
        let err = Error::Open {
            event: "cycles".into(),
            cpu: 3,
            reason: "EACCES".into(),
        };
        assert_eq!(
            format!("{}", err),
            "perf open failed for cycles on CPU 3 - EACCES"
        );
    }
}
