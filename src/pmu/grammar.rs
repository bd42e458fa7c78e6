#![allow(missing_docs)]

use pest_derive::Parser;

/// Parser for event descriptors and their `key=value` term lists.
#[derive(Parser)]
#[grammar = "pmu/event_parser.pest"]
pub(crate) struct EventParser;
