//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the JSON payload in extra text; these helpers pull out
//! the outermost object and reject values the engine cannot use.

use crate::error::{Error, Result};

use super::types::AiRefinement;

/// Longest raw excerpt quoted in error messages
const MAX_EXCERPT: usize = 200;

/// Furthest ahead a refinement may place the next transaction (about ten years)
pub const MAX_DAYS_UNTIL_NEXT: i64 = 3660;

fn excerpt(raw: &str) -> String {
    if raw.len() > MAX_EXCERPT {
        let mut end = MAX_EXCERPT;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &raw[..end])
    } else {
        raw.to_string()
    }
}

/// Slice from the first `{` to the last `}`
pub fn extract_json(response: &str) -> Result<&str> {
    let response = response.trim();
    match (response.find('{'), response.rfind('}')) {
        (Some(s), Some(e)) if s < e => Ok(&response[s..=e]),
        _ => Err(Error::InvalidData(format!(
            "No JSON found in AI response | Raw: {}",
            excerpt(response)
        ))),
    }
}

/// Parse and sanity-check a prediction refinement
pub fn parse_refinement(response: &str) -> Result<AiRefinement> {
    let json_str = extract_json(response)?;
    let refinement: AiRefinement = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid JSON from AI: {} | Raw: {}",
            e,
            excerpt(json_str)
        ))
    })?;

    if refinement
        .amount
        .is_some_and(|a| !a.is_finite() || a < 0.0)
    {
        return Err(Error::InvalidData(
            "AI refinement amount must be a finite, non-negative number".into(),
        ));
    }
    if refinement
        .days_until_next
        .is_some_and(|d| !(1..=MAX_DAYS_UNTIL_NEXT).contains(&d))
    {
        return Err(Error::InvalidData(format!(
            "AI refinement days_until_next must be within 1..={}",
            MAX_DAYS_UNTIL_NEXT
        )));
    }
    if refinement
        .confidence
        .is_some_and(|c| !(0.0..=1.0).contains(&c))
    {
        return Err(Error::InvalidData(
            "AI refinement confidence must be within [0, 1]".into(),
        ));
    }

    Ok(refinement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refinement_with_surrounding_text() {
        let response = r#"Sure! Here is my answer:
        {"amount": 16.49, "days_until_next": 30, "confidence": 0.8, "explanation": "Price rose last month."}
        Let me know if you need more."#;
        let refinement = parse_refinement(response).unwrap();
        assert_eq!(refinement.amount, Some(16.49));
        assert_eq!(refinement.days_until_next, Some(30));
        assert_eq!(refinement.explanation, "Price rose last month.");
    }

    #[test]
    fn test_parse_refinement_nulls_and_missing_fields() {
        let refinement =
            parse_refinement(r#"{"amount": null, "explanation": "Looks steady."}"#).unwrap();
        assert_eq!(refinement.amount, None);
        assert_eq!(refinement.days_until_next, None);
        assert_eq!(refinement.confidence, None);
    }

    #[test]
    fn test_parse_refinement_rejects_bad_values() {
        assert!(parse_refinement("no json here").is_err());
        assert!(parse_refinement(r#"{"amount": -5, "explanation": ""}"#).is_err());
        assert!(parse_refinement(r#"{"days_until_next": 0, "explanation": ""}"#).is_err());
        assert!(parse_refinement(r#"{"confidence": 3.0, "explanation": ""}"#).is_err());
        assert!(parse_refinement(r#"{"amount": "lots"}"#).is_err());
    }

    #[test]
    fn test_parse_refinement_bounds_days_until_next() {
        let at_limit = format!(
            r#"{{"days_until_next": {}, "explanation": ""}}"#,
            MAX_DAYS_UNTIL_NEXT
        );
        assert_eq!(
            parse_refinement(&at_limit).unwrap().days_until_next,
            Some(MAX_DAYS_UNTIL_NEXT)
        );

        let result = parse_refinement(r#"{"days_until_next": 10000000000, "explanation": "x"}"#);
        assert!(matches!(result, Err(Error::InvalidData(_))));
        assert!(parse_refinement(r#"{"days_until_next": 3661, "explanation": ""}"#).is_err());
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let long = "é".repeat(300);
        let short = excerpt(&long);
        assert!(short.ends_with("..."));
    }
}
