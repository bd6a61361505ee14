//! Anomaly and enrichment hooks.
//!
//! Placeholder extension points: detection is a plain substring check.

/// Substring that marks output as anomalous.
pub const ANOMALY_MARKER: &str = "suspicious";

/// Description attached to anomalous output.
pub const ANOMALY_DESCRIPTION: &str = "Suspicious content detected in the output.";

/// Return the anomaly description if `output` contains [`ANOMALY_MARKER`].
pub fn detect_anomalies(output: &str) -> Option<&'static str> {
    output.contains(ANOMALY_MARKER).then_some(ANOMALY_DESCRIPTION)
}

/// The note appended to anomalous output.
pub fn anomaly_note(description: &str) -> String {
    format!("\nNote: {description}")
}

/// Append the anomaly note to `output` when detected.
///
/// Output that already carries the note is returned unchanged.
pub fn enrich_response(output: &str) -> String {
    match detect_anomalies(output) {
        Some(description) => {
            let note = anomaly_note(description);
            if output.contains(&note) {
                output.to_owned()
            } else {
                format!("{output}{note}")
            }
        }
        None => output.to_owned(),
    }
}
