//! JSON parser for telemetry reports.

use anyhow::Result;

use crate::services::telemetry_api::RawReport;

/// Decodes the body of a "latest report" read.
///
/// A JSON `null` (what a realtime database returns for an empty path) or an
/// empty body means no report has been published.
///
/// # Errors
///
/// Returns an error if the body is not JSON or a field has the wrong type.
pub fn parse_report(bytes: &[u8]) -> Result<Option<RawReport>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(serde_json::from_slice::<Option<RawReport>>(bytes)?)
}
