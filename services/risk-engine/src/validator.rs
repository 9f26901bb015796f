//! Risk validation
//!
//! Both entry points (typed drafts from forms, coerced JSON payloads) end
//! up here, so the rules, including mitigate-requires-control, are
//! identical for every caller.
//!
//! Order of checks:
//! 1. Referenced controls, components and owner must exist (`NotFound`).
//! 2. Field rules are collected per field; any message fails the save.

use crate::catalog::Catalog;
use crate::config::RiskEngineConfig;
use chrono::NaiveDate;
use risk_types::errors::{EntityKind, RiskError, ValidationErrors, MITIGATE_REQUIRES_CONTROL};
use risk_types::ids::{ComponentId, ControlId, UserId};
use risk_types::risk::{Chance, Impact, ImpactArea, Treatment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Risk input before validation
///
/// Enumerated fields are optional so a missing value is reported as a
/// field message rather than being impossible to express.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskDraft {
    pub title: String,
    pub description: String,
    /// Defaults to the caller's `today`
    pub discovered_on: Option<NaiveDate>,
    pub impact: Option<Impact>,
    pub chance: Option<Chance>,
    pub treatment: Option<Treatment>,
    pub treatment_plan: Option<String>,
    pub treatment_due_date: Option<NaiveDate>,
    pub treatment_owner: Option<UserId>,
    pub ticket_url: Option<String>,
    pub controls: Vec<ControlId>,
    pub components: Vec<ComponentId>,
    pub impact_areas: Vec<ImpactArea>,
}

/// Draft that passed every rule, normalised for storage
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRisk {
    pub title: String,
    pub description: String,
    pub discovered_on: NaiveDate,
    pub impact: Impact,
    pub chance: Chance,
    pub treatment: Treatment,
    pub treatment_plan: Option<String>,
    pub treatment_due_date: Option<NaiveDate>,
    pub treatment_owner: Option<UserId>,
    pub ticket_url: Option<String>,
    pub controls: BTreeSet<ControlId>,
    pub components: BTreeSet<ComponentId>,
    pub impact_areas: BTreeSet<ImpactArea>,
}

/// Keep the first occurrence of each id.
pub fn dedup_preserving_order<T: Ord + Copy>(ids: &[T]) -> Vec<T> {
    let mut seen = BTreeSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Validate a draft.
///
/// `prior` carries messages already raised while coercing the input (API
/// path); a field that already failed coercion is not reported twice.
pub fn validate_draft(
    draft: &RiskDraft,
    catalog: &dyn Catalog,
    config: &RiskEngineConfig,
    today: NaiveDate,
    prior: ValidationErrors,
) -> Result<ValidatedRisk, RiskError> {
    let controls = dedup_preserving_order(&draft.controls);
    let components = dedup_preserving_order(&draft.components);

    if let Some(missing) = controls.iter().find(|id| catalog.control(**id).is_none()) {
        return Err(RiskError::not_found(EntityKind::Control, missing));
    }
    if let Some(missing) = components.iter().find(|id| catalog.component(**id).is_none()) {
        return Err(RiskError::not_found(EntityKind::Component, missing));
    }
    if let Some(owner) = draft.treatment_owner {
        if catalog.user(owner).is_none() {
            return Err(RiskError::not_found(EntityKind::User, owner));
        }
    }

    let mut errors = prior;
    let untouched = |errors: &ValidationErrors, field: &str| errors.field(field).is_empty();

    let title = draft.title.trim();
    if title.is_empty() {
        errors.add("title", "Title is required.");
    } else if title.chars().count() > config.max_title_len {
        errors.add(
            "title",
            format!("Title cannot exceed {} characters.", config.max_title_len),
        );
    }

    let description = draft.description.trim();
    if description.is_empty() {
        errors.add("description", "Description is required.");
    }

    if draft.impact.is_none() && untouched(&errors, "impact") {
        errors.add("impact", "Impact is required.");
    }
    if draft.chance.is_none() && untouched(&errors, "chance") {
        errors.add("chance", "Chance is required.");
    }
    if draft.treatment.is_none() && untouched(&errors, "treatment") {
        errors.add("treatment", "Treatment is required.");
    }

    if draft.treatment.is_some_and(|t| t.requires_controls())
        && controls.is_empty()
        && untouched(&errors, "csa_control_ids")
    {
        errors.add("csa_control_ids", MITIGATE_REQUIRES_CONTROL);
    }

    if components.is_empty() {
        if config.require_components && untouched(&errors, "component_ids") {
            errors.add("component_ids", "Select at least one component.");
        }
    } else {
        let ineligible: Vec<String> = components
            .iter()
            .filter(|id| !catalog.is_component_eligible(**id))
            .map(ToString::to_string)
            .collect();
        if !ineligible.is_empty() {
            errors.add(
                "component_ids",
                format!("Non-eligible component ids supplied: {}", ineligible.join(", ")),
            );
        }
    }

    let mut impact_areas = BTreeSet::new();
    for area in &draft.impact_areas {
        if !impact_areas.insert(*area) {
            errors.add(
                "impact_areas",
                format!("Duplicate impact area '{}'.", area.as_str()),
            );
        }
    }
    if impact_areas.is_empty() && config.require_impact_areas && untouched(&errors, "impact_areas")
    {
        errors.add("impact_areas", "Provide at least one impact area.");
    }

    let ticket_url = normalize_optional(draft.ticket_url.as_deref());
    if let Some(url) = &ticket_url {
        if let Err(message) = check_ticket_url(url, config.max_ticket_url_len) {
            errors.add("ticket_url", message);
        }
    }

    errors.into_result()?;

    // Each enumerated field is Some here, otherwise an error was recorded.
    let (Some(impact), Some(chance), Some(treatment)) =
        (draft.impact, draft.chance, draft.treatment)
    else {
        return Err(RiskError::Validation(ValidationErrors::single(
            "payload",
            "Impact, chance and treatment are required.",
        )));
    };

    Ok(ValidatedRisk {
        title: title.to_string(),
        description: description.to_string(),
        discovered_on: draft.discovered_on.unwrap_or(today),
        impact,
        chance,
        treatment,
        treatment_plan: normalize_optional(draft.treatment_plan.as_deref()),
        treatment_due_date: draft.treatment_due_date,
        treatment_owner: draft.treatment_owner,
        ticket_url,
        controls: controls.into_iter().collect(),
        components: components.into_iter().collect(),
        impact_areas,
    })
}

/// Trimmed text, `None` when blank.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Ticket links must be absolute http(s) URLs with a host.
pub fn check_ticket_url(url: &str, max_len: usize) -> Result<(), String> {
    if url.chars().count() > max_len {
        return Err(format!(
            "URL exceeds maximum length of {} characters.",
            max_len
        ));
    }
    let invalid = || "Provide a valid HTTP or HTTPS URL.".to_string();
    let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return Err(invalid());
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = match host.rsplit_once(':') {
        Some((name, port)) if !host.ends_with(']') => {
            if !port.is_empty() && port.parse::<u16>().is_err() {
                return Err(invalid());
            }
            name
        }
        _ => host,
    };
    if host.is_empty() || url.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(())
}
