//! Analysis result shape produced by the external worker, and the
//! extraction step that pulls it out of noisy worker stdout.
//!
//! Field names follow the worker's wire format exactly (`documentType`,
//! `Clause_No`, ...) and are serialized back to clients unchanged.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Risk label attached to a document or a single clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One clause-level finding, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ClauseFinding {
    #[serde(rename = "Clause_No")]
    pub clause_no: u32,
    #[serde(rename = "Clause_Text")]
    pub clause_text: String,
    #[serde(rename = "Predicted_Risk")]
    pub predicted_risk: RiskLevel,
    /// Confidence in percent.
    #[serde(rename = "Confidence")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub confidence: f64,
}

/// Structured output of a successful worker run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[validate(length(min = 1))]
    pub document_type: String,
    /// Classifier confidence for `document_type`, in percent.
    #[validate(range(min = 0.0, max = 100.0))]
    pub document_type_confidence: f64,
    pub overall_risk: RiskLevel,
    /// Document-level risk score, in percent.
    #[validate(range(min = 0.0, max = 100.0))]
    pub risk_percentage: f64,
    #[serde(default)]
    #[validate(nested)]
    pub clauses: Vec<ClauseFinding>,
}

/// Why a worker's stdout could not be turned into an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    /// No `{ ... }` region in the output.
    #[error("no JSON object found in worker output")]
    NoObject,

    /// The worker emitted `{"error": "..."}` instead of a result.
    #[error("worker reported an error: {0}")]
    Reported(String),

    /// The braced region is not valid JSON or does not match the result shape.
    #[error("invalid analysis payload: {0}")]
    Invalid(String),

    /// The payload parsed but a field is out of its allowed range.
    #[error("analysis payload failed validation: {0}")]
    OutOfRange(String),
}

/// Locate the JSON payload inside collected worker stdout.
///
/// Takes everything from the first `{` to the last `}` inclusive, so log
/// lines printed before or after the payload are ignored.
pub fn extract_payload(stdout: &str) -> Option<&str> {
    let start = stdout.find('{')?;
    let end = stdout.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&stdout[start..=end])
}

/// Extract, parse and validate the analysis payload from worker stdout.
pub fn parse_worker_output(stdout: &str) -> Result<AnalysisResult, PayloadError> {
    let payload = extract_payload(stdout).ok_or(PayloadError::NoObject)?;

    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| PayloadError::Invalid(e.to_string()))?;

    // The worker signals its own failures as `{"error": "..."}` with exit code 0.
    if let Some(obj) = value.as_object() {
        if !obj.contains_key("documentType") {
            if let Some(message) = obj.get("error").and_then(|e| e.as_str()) {
                return Err(PayloadError::Reported(message.to_string()));
            }
        }
    }

    let result: AnalysisResult =
        serde_json::from_value(value).map_err(|e| PayloadError::Invalid(e.to_string()))?;

    result
        .validate()
        .map_err(|e| PayloadError::OutOfRange(e.to_string()))?;

    Ok(result)
}
