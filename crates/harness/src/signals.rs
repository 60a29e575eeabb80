//! The observation bag collected during one page run.

use serde::{Deserialize, Serialize};

use xssbench_sanitizers::AdapterStatus;

/// One dangerous-URL sighting from the P1 probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DangerousUrlHit {
    pub tag: String,
    pub attr: String,
    pub value: String,
}

/// Everything observed while one case ran.
///
/// The field set is frozen; the classifier is a pure function over this
/// struct, so adding observations here is the only way to grow the
/// classification surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    pub adapter_status: AdapterStatus,
    /// The in-page marker or a native dialog fired.
    pub dialog_fired: bool,
    pub dialog_details: Option<String>,
    /// The guard blocked at least one external `script` fetch.
    pub external_script_attempted: bool,
    pub external_script_url: Option<String>,
    /// The guard blocked at least one external non-script fetch.
    pub non_script_external_attempt: bool,
    pub non_script_url: Option<String>,
    pub dangerous_url_hits: Vec<DangerousUrlHit>,
    /// Any non-ignorable navigation was observed (informational).
    pub navigation_occurred: bool,
    /// A navigation to a dangerous-scheme URL was observed.
    pub dangerous_navigation_url: Option<String>,
}

impl Signals {
    /// A quiet run for the given adapter status.
    pub fn quiet(adapter_status: AdapterStatus) -> Self {
        Self {
            adapter_status,
            dialog_fired: false,
            dialog_details: None,
            external_script_attempted: false,
            external_script_url: None,
            non_script_external_attempt: false,
            non_script_url: None,
            dangerous_url_hits: Vec::new(),
            navigation_occurred: false,
            dangerous_navigation_url: None,
        }
    }
}
