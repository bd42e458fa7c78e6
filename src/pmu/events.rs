use crate::util::parse_u64;
use crate::Result;
use log::trace;

/// Raw event format represented in the JSON event files.
pub type RawEvent = std::collections::HashMap<String, String>;

/// Values that mean "field not used" in the JSON event files.
const UNSET: [&str; 5] = ["", "0", "0x0", "0x00", "na"];

/// Get Linux PMU names from `Unit` names in the JSON.
fn pmu_from_unit(unit: &str) -> String {
    match unit {
        "CBO" => "cbox".into(),
        "QPI LL" => "qpi".into(),
        "SBO" => "sbox".into(),
        "IMPH-U" => "cbox".into(),
        "NCU" => "cbox".into(),
        _ => unit.to_lowercase(),
    }
}

/// Term emitted for a value written to a known MSR.
fn msr_term(index: &str) -> Option<&'static str> {
    let first = index.split(',').next().unwrap_or("").trim().to_lowercase();
    match first.as_str() {
        "0x3f6" => Some("ldlat"),
        "0x1a6" | "0x1a7" => Some("offcore_rsp"),
        "0x3f7" => Some("frontend"),
        _ => None,
    }
}

/// Parse the first alternative of a comma separated numeric field.
fn first_code(val: &str) -> Result<u64> {
    Ok(parse_u64(val.split(',').next().unwrap_or(""))?)
}

/// A named hardware event from the catalog.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    /// Name of the event as written in the catalog.
    pub name: String,
    /// Encoded term list, e.g. `event=0x2e,umask=0x41`.
    pub encoded: String,
    /// Brief summary of the event.
    pub desc: String,
    /// Long description of the event.
    pub long_desc: String,
    /// Name of the PMU counting the event, `cpu` for core events.
    pub pmu: String,
}

impl EventDescriptor {
    /// Create a new `EventDescriptor` from a `RawEvent`.
    ///
    /// Records without an `EventName` yield `None`. A malformed `EventCode` or `ExtSel` is an
    /// error.
    pub fn from_raw_event(raw_event: &RawEvent) -> Result<Option<Self>> {
        let field = |key: &str| raw_event.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let name = match field("EventName") {
            Some(n) => n.to_string(),
            None => return Ok(None),
        };

        let mut evt_code = 0;
        if let Some(c) = field("EventCode") {
            evt_code |= first_code(c)?;
        }
        if let Some(c) = field("ExtSel") {
            evt_code |= first_code(c)? << 21;
        }

        let mut encoded = if evt_code != 0 {
            format!("event={:#x}", evt_code)
        } else {
            String::from("event=0")
        };
        if let Some(f) = field("Filter").filter(|f| *f != "na") {
            encoded.push(',');
            encoded.push_str(f);
        }
        if let (Some(term), Some(val)) = (field("MSRIndex").and_then(msr_term), field("MSRValue")) {
            encoded.push_str(&format!(",{}={}", term, val));
        }
        for &(key, term) in [
            ("AnyThread", "any"),
            ("EdgeDetect", "edge"),
            ("Invert", "inv"),
            ("CounterMask", "cmask"),
            ("SampleAfterValue", "period"),
            ("UMask", "umask"),
        ]
        .iter()
        {
            if let Some(v) = field(key).filter(|v| !UNSET.contains(v)) {
                encoded.push_str(&format!(",{}={}", term, v));
            }
        }

        let mut desc = field("BriefDescription")
            .unwrap_or("")
            .trim_end_matches('.')
            .to_string();
        if let Some(errata) = field("Errata").filter(|e| *e != "null") {
            desc.push_str(". Spec Update: ");
            desc.push_str(errata);
        }
        let data_la = field("DataLA").or_else(|| field("Data_LA"));
        if data_la.map_or(false, |d| !UNSET.contains(&d)) {
            desc.push_str(". Supports address when precise");
        }
        match field("PEBS").filter(|p| !UNSET.contains(p)) {
            Some("2") => desc.push_str("(Must be precise)"),
            Some(_) => desc.push_str("(Precise event)"),
            None => {}
        }

        let pmu = field("Unit").map_or_else(|| String::from("cpu"), pmu_from_unit);
        let evt = EventDescriptor {
            name,
            encoded,
            desc,
            long_desc: field("PublicDescription").unwrap_or("").to_string(),
            pmu,
        };
        trace!("from_raw_event: {:?}", evt);
        Ok(Some(evt))
    }

    /// Lookup key of the event in the catalog.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Descriptor string for the event, `<pmu>/<encoded>/`.
    pub fn descriptor(&self) -> String {
        format!("{}/{}/", self.pmu, self.encoded)
    }
}
