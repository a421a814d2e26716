use serde_json::{Map, Value};

use crate::community_reports_errors::CommunityReportError;
use crate::community_reports_logging::truncate_for_log;

use super::report::{CommunityReport, Finding};

/// Keeps the span from the first `{` to the last `}` and undoes doubled braces left over
/// from template escaping. Returns an empty string when no such span exists.
pub fn extract_json_text(response: &str) -> String {
    let Some(start) = response.find('{') else {
        return String::new();
    };
    let from_first_brace = &response[start..];
    let Some(end) = from_first_brace.rfind('}') else {
        return String::new();
    };
    from_first_brace[..=end].replace("{{", "{").replace("}}", "}")
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Result<String, CommunityReportError> {
    match fields.remove(key) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(CommunityReportError::ResponseValidation(format!("`{}` must be a string", key))),
        None => Err(CommunityReportError::ResponseValidation(format!("missing `{}`", key))),
    }
}

fn take_rating(fields: &mut Map<String, Value>) -> Result<f64, CommunityReportError> {
    match fields.remove("rating") {
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| CommunityReportError::ResponseValidation("`rating` is not representable".to_string())),
        Some(_) => Err(CommunityReportError::ResponseValidation("`rating` must be a number".to_string())),
        None => Err(CommunityReportError::ResponseValidation("missing `rating`".to_string())),
    }
}

fn take_findings(fields: &mut Map<String, Value>) -> Result<Vec<Finding>, CommunityReportError> {
    let items = match fields.remove("findings") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(CommunityReportError::ResponseValidation("`findings` must be a list".to_string())),
        None => return Err(CommunityReportError::ResponseValidation("missing `findings`".to_string())),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<Finding>(item).map_err(|_| {
                CommunityReportError::ResponseValidation(format!(
                    "finding {} must be a string or a summary/explanation object",
                    index
                ))
            })
        })
        .collect()
}

/// Checks the required report fields of an already parsed value.
pub fn validate_report_value(value: Value) -> Result<CommunityReport, CommunityReportError> {
    let Value::Object(mut fields) = value else {
        return Err(CommunityReportError::ResponseValidation(
            "response is not a JSON object".to_string(),
        ));
    };

    let title = take_string(&mut fields, "title")?;
    let summary = take_string(&mut fields, "summary")?;
    let findings = take_findings(&mut fields)?;
    let rating = take_rating(&mut fields)?;
    let rating_explanation = take_string(&mut fields, "rating_explanation")?;

    // Set by the extractor from the community itself.
    fields.remove("weight");
    fields.remove("entities");

    Ok(CommunityReport {
        title,
        summary,
        findings,
        rating,
        rating_explanation,
        weight: 0.0,
        entities: Vec::new(),
        extra: fields,
    })
}

/// Extracts, parses and validates a raw model response.
pub fn parse_report_response(response: &str) -> Result<CommunityReport, CommunityReportError> {
    let cleaned = extract_json_text(response);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| CommunityReportError::ResponseFormat(format!("{} in: {}", e, truncate_for_log(&cleaned, 500))))?;
    validate_report_value(value)
}
