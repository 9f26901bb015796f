//! JSON payload coercion
//!
//! API clients send loosely typed bodies: impact as `"major"`, `4` or
//! `"4"`; ids as strings; dates as `YYYY-MM-DD`. This module turns such a
//! body into a `RiskDraft` and records a message for every field it
//! cannot read. The draft then goes through the same validator as typed
//! input.

use crate::validator::RiskDraft;
use chrono::NaiveDate;
use risk_types::errors::{RiskError, ValidationErrors};
use risk_types::ids::{ControlId, UserId};
use risk_types::risk::{Chance, Impact, ImpactArea, Treatment, MAX_WEIGHT};
use serde_json::{Map, Value};
use std::str::FromStr;

pub const BODY_REQUIRED: &str = "JSON body is required.";
pub const DATE_FORMAT_MESSAGE: &str = "Dates must use the YYYY-MM-DD format.";

/// Draft plus the messages raised while reading it.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercedDraft {
    pub draft: RiskDraft,
    pub errors: ValidationErrors,
}

/// Read a JSON body into a draft. A missing or non-object body is
/// rejected outright.
pub fn coerce(payload: Option<&Value>) -> Result<CoercedDraft, RiskError> {
    let Some(Value::Object(body)) = payload else {
        return Err(RiskError::Validation(ValidationErrors::single(
            "payload",
            BODY_REQUIRED,
        )));
    };

    let mut errors = ValidationErrors::new();
    let draft = RiskDraft {
        title: text(body.get("title")),
        description: text(body.get("description")),
        discovered_on: date(body, "discovered_on", &mut errors),
        impact: weighted(body, "impact", &mut errors),
        chance: weighted(body, "chance", &mut errors),
        treatment: treatment(body.get("treatment"), &mut errors),
        treatment_plan: optional_text(body.get("treatment_plan")),
        treatment_due_date: date(body, "treatment_due_date", &mut errors),
        treatment_owner: owner(body.get("treatment_owner_id"), &mut errors),
        ticket_url: optional_text(body.get("ticket_url")),
        controls: controls(body, &mut errors),
        components: id_list(body.get("component_ids"), "component_ids", &mut errors),
        impact_areas: impact_areas(body.get("impact_areas"), &mut errors),
    };
    Ok(CoercedDraft { draft, errors })
}

// ── Scalars ─────────────────────────────────────────────────────────

fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    Some(text(value)).filter(|s| !s.is_empty())
}

/// Raw entry as echoed in messages: strings without quotes.
fn echo(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Lowercase and map spaces/hyphens to underscores (`"Almost certain"`).
fn normalise_token(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
}

fn date(body: &Map<String, Value>, field: &str, errors: &mut ValidationErrors) -> Option<NaiveDate> {
    match body.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                errors.add(field, DATE_FORMAT_MESSAGE);
                None
            }
        },
        Some(_) => {
            errors.add(field, DATE_FORMAT_MESSAGE);
            None
        }
    }
}

/// An ordinal scale value given by name or by weight.
trait Weighted: Sized + FromStr<Err = String> {
    const LABEL: &'static str;
    fn from_weight(weight: u8) -> Option<Self>;
}

impl Weighted for Impact {
    const LABEL: &'static str = "Impact";
    fn from_weight(weight: u8) -> Option<Self> {
        Impact::from_weight(weight)
    }
}

impl Weighted for Chance {
    const LABEL: &'static str = "Chance";
    fn from_weight(weight: u8) -> Option<Self> {
        Chance::from_weight(weight)
    }
}

fn weighted<T: Weighted>(
    body: &Map<String, Value>,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<T> {
    let out_of_range = || format!("{} must be between 1 and {}.", T::LABEL, MAX_WEIGHT);
    let weight = match body.get(field) {
        None | Some(Value::Null) => return None,
        Some(Value::String(raw)) => {
            let token = raw.trim();
            if token.is_empty() {
                return None;
            }
            if token.bytes().all(|b| b.is_ascii_digit()) {
                token.parse::<i64>().unwrap_or(i64::MAX)
            } else {
                return match T::from_str(&normalise_token(token)) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        errors.add(
                            field,
                            format!("Unknown {} '{}'.", T::LABEL.to_ascii_lowercase(), raw),
                        );
                        None
                    }
                };
            }
        }
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => i,
            None => n.as_f64().map_or(i64::MAX, |f| f.trunc() as i64),
        },
        Some(_) => {
            errors.add(
                field,
                format!("{} must be a numeric weight or enum value.", T::LABEL),
            );
            return None;
        }
    };
    let resolved = u8::try_from(weight).ok().and_then(T::from_weight);
    if resolved.is_none() {
        errors.add(field, out_of_range());
    }
    resolved
}

fn treatment(value: Option<&Value>, errors: &mut ValidationErrors) -> Option<Treatment> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) if raw.trim().is_empty() => None,
        Some(Value::String(raw)) => match raw.parse::<Treatment>() {
            Ok(parsed) => Some(parsed),
            Err(message) => {
                errors.add("treatment", message);
                None
            }
        },
        Some(_) => {
            errors.add("treatment", "Treatment must be provided as a string value.");
            None
        }
    }
}

// ── Identifiers ─────────────────────────────────────────────────────

fn parse_id<T: FromStr>(entry: &Value, field: &str, errors: &mut ValidationErrors) -> Option<T> {
    let parsed = match entry {
        Value::String(s) => s.parse::<T>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        errors.add(field, format!("'{}' is not a valid identifier.", echo(entry)));
    }
    parsed
}

fn id_list<T: FromStr>(value: Option<&Value>, field: &str, errors: &mut ValidationErrors) -> Vec<T> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries
            .iter()
            .filter(|entry| !matches!(entry, Value::Null))
            .filter(|entry| !matches!(entry, Value::String(s) if s.trim().is_empty()))
            .filter_map(|entry| parse_id(entry, field, errors))
            .collect(),
        Some(_) => {
            errors.add(field, "Provide a list of identifiers.");
            Vec::new()
        }
    }
}

/// `csa_control_ids` list, falling back to the legacy single
/// `csa_control_id` when the list yields nothing.
fn controls(body: &Map<String, Value>, errors: &mut ValidationErrors) -> Vec<ControlId> {
    let listed = match body.get("csa_control_ids") {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            errors.add(
                "csa_control_ids",
                "Provide CSA controls as a list of identifiers.",
            );
            Vec::new()
        }
        Some(Value::String(_)) => Vec::new(),
        other => id_list(other, "csa_control_ids", errors),
    };
    if !listed.is_empty() {
        return listed;
    }
    match body.get("csa_control_id") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(entry) => parse_id(entry, "csa_control_id", errors)
            .into_iter()
            .collect(),
    }
}

fn owner(value: Option<&Value>, errors: &mut ValidationErrors) -> Option<UserId> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(entry) => parse_id(entry, "treatment_owner_id", errors),
    }
}

fn impact_areas(value: Option<&Value>, errors: &mut ValidationErrors) -> Vec<ImpactArea> {
    let entries = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            errors.add("impact_areas", "Provide at least one impact area.");
            return Vec::new();
        }
    };
    let mut areas = Vec::new();
    for entry in entries {
        let raw = text(Some(entry));
        if raw.is_empty() {
            continue;
        }
        match normalise_token(&raw).parse::<ImpactArea>() {
            Ok(area) => areas.push(area),
            Err(_) => errors.add("impact_areas", format!("Unknown impact area '{}'.", raw)),
        }
    }
    areas
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk_types::ids::ComponentId;
    use serde_json::json;

    fn coerce_ok(value: Value) -> CoercedDraft {
        coerce(Some(&value)).unwrap()
    }

    #[test]
    fn test_missing_body() {
        for body in [None, Some(json!([1, 2])), Some(json!("text"))] {
            match coerce(body.as_ref()) {
                Err(RiskError::Validation(errors)) => {
                    assert_eq!(errors.field("payload"), [BODY_REQUIRED]);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_full_payload() {
        let control = ControlId::new();
        let component = ComponentId::new();
        let owner = UserId::new();
        let coerced = coerce_ok(json!({
            "title": "  Vendor outage ",
            "description": "Single hosting provider",
            "discovered_on": "2024-02-01",
            "impact": "Major",
            "chance": 3,
            "treatment": "Mitigate",
            "treatment_plan": "Second region",
            "treatment_due_date": "2024-06-30",
            "treatment_owner_id": owner.to_string(),
            "ticket_url": "https://tickets.example.com/OPS-7",
            "csa_control_ids": [control.to_string()],
            "component_ids": [component.to_string(), ""],
            "impact_areas": ["Operational", "human-safety"],
        }));
        assert!(coerced.errors.is_empty(), "{}", coerced.errors);
        let d = coerced.draft;
        assert_eq!(d.title, "Vendor outage");
        assert_eq!(d.discovered_on, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(d.impact, Some(Impact::Major));
        assert_eq!(d.chance, Some(Chance::Possible));
        assert_eq!(d.treatment, Some(Treatment::Mitigate));
        assert_eq!(d.treatment_owner, Some(owner));
        assert_eq!(d.controls, vec![control]);
        assert_eq!(d.components, vec![component]);
        assert_eq!(
            d.impact_areas,
            vec![ImpactArea::Operational, ImpactArea::HumanSafety]
        );
    }

    #[test]
    fn test_weight_forms() {
        let d = coerce_ok(json!({"impact": "5", "chance": "almost certain"})).draft;
        assert_eq!(d.impact, Some(Impact::Catastrophic));
        assert_eq!(d.chance, Some(Chance::AlmostCertain));

        let d = coerce_ok(json!({"impact": 2.9, "chance": "Almost_Certain"})).draft;
        assert_eq!(d.impact, Some(Impact::Minor));
        assert_eq!(d.chance, Some(Chance::AlmostCertain));
    }

    #[test]
    fn test_weight_errors() {
        let coerced = coerce_ok(json!({"impact": 6, "chance": "often"}));
        assert_eq!(coerced.errors.field("impact"), ["Impact must be between 1 and 5."]);
        assert_eq!(coerced.errors.field("chance"), ["Unknown chance 'often'."]);

        let coerced = coerce_ok(json!({"impact": "huge", "chance": "0"}));
        assert_eq!(coerced.errors.field("impact"), ["Unknown impact 'huge'."]);
        assert_eq!(coerced.errors.field("chance"), ["Chance must be between 1 and 5."]);

        let coerced = coerce_ok(json!({"impact": [4]}));
        assert_eq!(
            coerced.errors.field("impact"),
            ["Impact must be a numeric weight or enum value."]
        );
    }

    #[test]
    fn test_missing_weight_left_to_validator() {
        let coerced = coerce_ok(json!({"impact": null, "chance": "  "}));
        assert!(coerced.errors.is_empty());
        assert_eq!(coerced.draft.impact, None);
        assert_eq!(coerced.draft.chance, None);
    }

    #[test]
    fn test_treatment_errors() {
        let coerced = coerce_ok(json!({"treatment": "ignore"}));
        assert_eq!(coerced.errors.field("treatment"), ["Unknown treatment 'ignore'."]);
        let coerced = coerce_ok(json!({"treatment": 3}));
        assert_eq!(
            coerced.errors.field("treatment"),
            ["Treatment must be provided as a string value."]
        );
    }

    #[test]
    fn test_bad_dates() {
        let coerced = coerce_ok(json!({
            "discovered_on": "01/02/2024",
            "treatment_due_date": 20240630,
        }));
        assert_eq!(coerced.errors.field("discovered_on"), [DATE_FORMAT_MESSAGE]);
        assert_eq!(coerced.errors.field("treatment_due_date"), [DATE_FORMAT_MESSAGE]);
    }

    #[test]
    fn test_bad_identifiers() {
        let coerced = coerce_ok(json!({
            "component_ids": ["abc", 12],
            "csa_control_ids": "not-a-list",
            "treatment_owner_id": "7",
        }));
        assert_eq!(
            coerced.errors.field("component_ids"),
            ["'abc' is not a valid identifier.", "'12' is not a valid identifier."]
        );
        assert_eq!(
            coerced.errors.field("csa_control_ids"),
            ["Provide CSA controls as a list of identifiers."]
        );
        assert_eq!(
            coerced.errors.field("treatment_owner_id"),
            ["'7' is not a valid identifier."]
        );
    }

    #[test]
    fn test_legacy_single_control() {
        let control = ControlId::new();
        let d = coerce_ok(json!({
            "csa_control_ids": [],
            "csa_control_id": control.to_string(),
        }))
        .draft;
        assert_eq!(d.controls, vec![control]);

        let listed = ControlId::new();
        let d = coerce_ok(json!({
            "csa_control_ids": [listed.to_string()],
            "csa_control_id": control.to_string(),
        }))
        .draft;
        assert_eq!(d.controls, vec![listed]);
    }

    #[test]
    fn test_impact_area_errors_and_duplicates_kept() {
        let coerced = coerce_ok(json!({"impact_areas": ["privacy", "weather", "Privacy"]}));
        assert_eq!(
            coerced.errors.field("impact_areas"),
            ["Unknown impact area 'weather'."]
        );
        assert_eq!(
            coerced.draft.impact_areas,
            vec![ImpactArea::Privacy, ImpactArea::Privacy]
        );

        let coerced = coerce_ok(json!({"impact_areas": "privacy"}));
        assert_eq!(
            coerced.errors.field("impact_areas"),
            ["Provide at least one impact area."]
        );
    }

    #[test]
    fn test_numbers_as_text() {
        let d = coerce_ok(json!({"title": 42, "treatment_plan": ""})).draft;
        assert_eq!(d.title, "42");
        assert_eq!(d.treatment_plan, None);
    }
}
