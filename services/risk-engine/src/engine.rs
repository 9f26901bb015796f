//! Risk Engine: register orchestrator
//!
//! Ties together authorization, validation, the store, severity
//! resolution and event emission. Every operation checks the actor first,
//! then validates, then commits one mutation.
//!
//! Time is supplied by the caller: `now` (unix nanoseconds) stamps
//! records and events, `today` drives default dates and overdue status.

use chrono::NaiveDate;
use persistence::{LinkDiff, Mutation, RecoveryReport};
use risk_types::errors::{EntityKind, RiskError, ValidationErrors};
use risk_types::ids::RiskId;
use risk_types::risk::{Chance, Impact, Risk, RiskRecord};
use risk_types::role::Actor;
use risk_types::severity::{Severity, SeverityThreshold, ThresholdTable};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::{ConfigError, RiskEngineConfig};
use crate::events::{self, Lifecycle, RegisterEvent};
use crate::payload;
use crate::resolver::{self, ScoreGap};
use crate::store::RiskStore;
use crate::thresholds;
use crate::validator::{self, RiskDraft, ValidatedRisk};
use crate::views::{severity_scale, Dashboard, DashboardMetrics, RiskMatrix, RiskView};

const MANAGE_RISKS: &str = "manage risks";
const MANAGE_THRESHOLDS: &str = "manage severity thresholds";

/// Risk register service
pub struct RiskEngine {
    config: RiskEngineConfig,
    catalog: Arc<dyn Catalog>,
    store: RiskStore,
}

impl RiskEngine {
    /// Memory-only engine with default configuration
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self::in_memory(RiskEngineConfig::default(), catalog)
    }

    /// Memory-only engine; `config.store` is ignored. Fails on an invalid
    /// configuration, e.g. overlapping default thresholds.
    pub fn with_config(
        config: RiskEngineConfig,
        catalog: Arc<dyn Catalog>,
    ) -> Result<Self, RiskError> {
        config.validate().map_err(config_error)?;
        Ok(Self::in_memory(config, catalog))
    }

    fn in_memory(config: RiskEngineConfig, catalog: Arc<dyn Catalog>) -> Self {
        let store = RiskStore::in_memory(config.seed_table());
        Self {
            config,
            catalog,
            store,
        }
    }

    /// Engine backed by the store `config.store` describes, recovered from
    /// disk when durable.
    pub fn open(
        config: RiskEngineConfig,
        catalog: Arc<dyn Catalog>,
    ) -> Result<(Self, RecoveryReport), RiskError> {
        config.validate().map_err(config_error)?;
        let (store, report) = RiskStore::open(&config.store, config.seed_table())?;
        info!(
            durable = store.is_durable(),
            risks = store.len(),
            threshold_version = store.thresholds().version(),
            "Risk engine opened"
        );
        Ok((
            Self {
                config,
                catalog,
                store,
            },
            report,
        ))
    }

    pub fn config(&self) -> &RiskEngineConfig {
        &self.config
    }

    pub fn store(&self) -> &RiskStore {
        &self.store
    }

    // ── Risks ───────────────────────────────────────────────────────

    pub fn create_risk(
        &self,
        actor: &Actor,
        draft: &RiskDraft,
        now: i64,
        today: NaiveDate,
    ) -> Result<(RiskView, RegisterEvent), RiskError> {
        authorize_risks(actor)?;
        let validated = self.validate(draft, today, ValidationErrors::new())?;
        self.insert(actor, validated, now, today)
    }

    /// Create from a loosely typed JSON body.
    pub fn create_risk_from_json(
        &self,
        actor: &Actor,
        body: Option<&Value>,
        now: i64,
        today: NaiveDate,
    ) -> Result<(RiskView, RegisterEvent), RiskError> {
        authorize_risks(actor)?;
        let coerced = payload::coerce(body)?;
        let validated = self.validate(&coerced.draft, today, coerced.errors)?;
        self.insert(actor, validated, now, today)
    }

    /// Replace a risk's fields and links. Links are rewritten as a diff
    /// against what is stored; an omitted discovery date keeps the stored
    /// one.
    pub fn update_risk(
        &self,
        actor: &Actor,
        risk_id: RiskId,
        draft: &RiskDraft,
        now: i64,
        today: NaiveDate,
    ) -> Result<(RiskView, RegisterEvent), RiskError> {
        authorize_risks(actor)?;
        self.store.require(risk_id)?;
        let validated = self.validate(draft, today, ValidationErrors::new())?;
        self.replace(actor, risk_id, draft.discovered_on.is_some(), validated, now, today)
    }

    pub fn update_risk_from_json(
        &self,
        actor: &Actor,
        risk_id: RiskId,
        body: Option<&Value>,
        now: i64,
        today: NaiveDate,
    ) -> Result<(RiskView, RegisterEvent), RiskError> {
        authorize_risks(actor)?;
        self.store.require(risk_id)?;
        let coerced = payload::coerce(body)?;
        let validated = self.validate(&coerced.draft, today, coerced.errors)?;
        let dated = coerced.draft.discovered_on.is_some();
        self.replace(actor, risk_id, dated, validated, now, today)
    }

    /// Archive a risk. Closing an archived risk changes nothing and emits
    /// no event.
    pub fn close_risk(
        &self,
        actor: &Actor,
        risk_id: RiskId,
        now: i64,
    ) -> Result<Option<RegisterEvent>, RiskError> {
        authorize_risks(actor)?;
        self.set_closed(actor, risk_id, Some(now), now)
    }

    /// Reopen an archived risk. Reopening an open risk is a no-op.
    pub fn reopen_risk(
        &self,
        actor: &Actor,
        risk_id: RiskId,
        now: i64,
    ) -> Result<Option<RegisterEvent>, RiskError> {
        authorize_risks(actor)?;
        self.set_closed(actor, risk_id, None, now)
    }

    /// Remove a risk and every relationship row that points at it.
    pub fn delete_risk(
        &self,
        actor: &Actor,
        risk_id: RiskId,
        now: i64,
    ) -> Result<RegisterEvent, RiskError> {
        authorize_risks(actor)?;
        let deleted = self.store.commit_with(now, |state| {
            let risk = state
                .risks
                .get(&risk_id)
                .ok_or_else(|| RiskError::not_found(EntityKind::Risk, risk_id))?;
            Ok((Mutation::DeleteRisk(risk_id), risk.clone()))
        })?;
        Ok(self.emit(events::risk_lifecycle(
            actor.user_id,
            &deleted,
            Lifecycle::Deleted,
            now,
        )))
    }

    pub fn get_risk(
        &self,
        actor: &Actor,
        risk_id: RiskId,
        today: NaiveDate,
    ) -> Result<RiskView, RiskError> {
        authorize_risks(actor)?;
        let record = self.store.require(risk_id)?;
        Ok(RiskView::build(
            &record,
            &self.store.thresholds(),
            self.catalog.as_ref(),
            today,
        ))
    }

    /// Every risk, newest first.
    pub fn list_risks(&self, actor: &Actor, today: NaiveDate) -> Result<Vec<RiskView>, RiskError> {
        authorize_risks(actor)?;
        let table = self.store.thresholds();
        Ok(self
            .newest_first()
            .iter()
            .map(|record| RiskView::build(record, &table, self.catalog.as_ref(), today))
            .collect())
    }

    pub fn dashboard(&self, actor: &Actor, today: NaiveDate) -> Result<Dashboard, RiskError> {
        authorize_risks(actor)?;
        let table = self.store.thresholds();
        let records = self.newest_first();
        let risks: Vec<RiskView> = records
            .iter()
            .map(|record| RiskView::build(record, &table, self.catalog.as_ref(), today))
            .collect();
        Ok(Dashboard {
            metrics: DashboardMetrics::from_views(&risks),
            matrix: RiskMatrix::build(&records, &table),
            severity_scale: severity_scale(&table),
            threshold_version: table.version(),
            risks,
        })
    }

    // ── Thresholds ──────────────────────────────────────────────────

    /// Set one severity's range. Validated against the committed table
    /// under the store lock; on rejection the table is unchanged.
    ///
    /// Rows are seeded when the register starts; a severity without a row
    /// is `NotFound` rather than being added here.
    pub fn update_threshold(
        &self,
        actor: &Actor,
        severity: Severity,
        min_score: i64,
        max_score: i64,
        now: i64,
    ) -> Result<(Arc<ThresholdTable>, RegisterEvent), RiskError> {
        if !actor.can_manage_thresholds() {
            warn!(actor = %actor.user_id, %severity, "Threshold edit refused");
            return Err(RiskError::unauthorized(MANAGE_THRESHOLDS));
        }
        let (previous, current) = self.store.commit_with(now, |state| {
            let previous = state
                .thresholds
                .get(severity)
                .copied()
                .ok_or_else(|| RiskError::not_found(EntityKind::Threshold, severity))?;
            let row = thresholds::validate_update(&state.thresholds, severity, min_score, max_score)
                .map_err(|e| {
                    debug!(%severity, min_score, max_score, error = %e, "Threshold rejected");
                    RiskError::from(e)
                })?;
            Ok((Mutation::SetThreshold(row), (previous, row)))
        })?;
        let event = self.emit(events::threshold_updated(actor.user_id, previous, current, now));
        Ok((self.store.thresholds(), event))
    }

    /// Committed threshold table. Any caller may read it.
    pub fn thresholds(&self) -> Arc<ThresholdTable> {
        self.store.thresholds()
    }

    /// Severity for a score under the committed table; `None` is
    /// unclassified.
    pub fn resolve(&self, score: u32) -> Option<Severity> {
        resolver::resolve(score, &self.store.thresholds())
    }

    pub fn resolve_pair(&self, impact: Impact, chance: Chance) -> Option<Severity> {
        resolver::resolve_pair(impact, chance, &self.store.thresholds())
    }

    /// Scores between 1 and the configured maximum that no range covers.
    pub fn severity_gaps(&self) -> Vec<ScoreGap> {
        resolver::gaps(&self.store.thresholds(), 1, self.config.max_score)
    }

    pub fn severity_table(&self) -> Vec<SeverityThreshold> {
        self.store.thresholds().iter().copied().collect()
    }

    // ── Internals ───────────────────────────────────────────────────

    fn validate(
        &self,
        draft: &RiskDraft,
        today: NaiveDate,
        prior: ValidationErrors,
    ) -> Result<ValidatedRisk, RiskError> {
        validator::validate_draft(draft, self.catalog.as_ref(), &self.config, today, prior).map_err(
            |e| {
                debug!(error = %e, "Risk rejected");
                e
            },
        )
    }

    fn insert(
        &self,
        actor: &Actor,
        validated: ValidatedRisk,
        now: i64,
        today: NaiveDate,
    ) -> Result<(RiskView, RegisterEvent), RiskError> {
        let risk = Risk {
            risk_id: RiskId::new(),
            title: validated.title,
            description: validated.description,
            discovered_on: validated.discovered_on,
            impact: validated.impact,
            chance: validated.chance,
            treatment: validated.treatment,
            treatment_plan: validated.treatment_plan,
            treatment_due_date: validated.treatment_due_date,
            treatment_owner: validated.treatment_owner,
            ticket_url: validated.ticket_url,
            closed_at: None,
            created_at: now,
            updated_at: now,
        };
        let risk_id = risk.risk_id;
        let event = events::risk_created(actor.user_id, &risk, now);
        self.store.commit(
            Mutation::InsertRisk {
                risk,
                controls: LinkDiff::all_added(&validated.controls),
                components: LinkDiff::all_added(&validated.components),
                impact_areas: LinkDiff::all_added(&validated.impact_areas),
            },
            now,
        )?;
        let view = self.get_view(risk_id, today)?;
        Ok((view, self.emit(event)))
    }

    fn replace(
        &self,
        actor: &Actor,
        risk_id: RiskId,
        dated: bool,
        validated: ValidatedRisk,
        now: i64,
        today: NaiveDate,
    ) -> Result<(RiskView, RegisterEvent), RiskError> {
        let updated = self.store.commit_with(now, |state| {
            let existing = state
                .risks
                .get(&risk_id)
                .ok_or_else(|| RiskError::not_found(EntityKind::Risk, risk_id))?;
            let risk = Risk {
                risk_id,
                title: validated.title,
                description: validated.description,
                discovered_on: if dated {
                    validated.discovered_on
                } else {
                    existing.discovered_on
                },
                impact: validated.impact,
                chance: validated.chance,
                treatment: validated.treatment,
                treatment_plan: validated.treatment_plan,
                treatment_due_date: validated.treatment_due_date,
                treatment_owner: validated.treatment_owner,
                ticket_url: validated.ticket_url,
                closed_at: existing.closed_at,
                created_at: existing.created_at,
                updated_at: now,
            };
            let mutation = Mutation::UpdateRisk {
                risk: risk.clone(),
                controls: LinkDiff::between(&state.controls_of(risk_id), &validated.controls),
                components: LinkDiff::between(&state.components_of(risk_id), &validated.components),
                impact_areas: LinkDiff::between(
                    &state.impact_areas_of(risk_id),
                    &validated.impact_areas,
                ),
            };
            Ok((mutation, risk))
        })?;
        let event = events::risk_updated(actor.user_id, &updated, now);
        let view = self.get_view(risk_id, today)?;
        Ok((view, self.emit(event)))
    }

    fn set_closed(
        &self,
        actor: &Actor,
        risk_id: RiskId,
        closed_at: Option<i64>,
        now: i64,
    ) -> Result<Option<RegisterEvent>, RiskError> {
        let closing = closed_at.is_some();
        if self.store.require(risk_id)?.risk.is_closed() == closing {
            debug!(%risk_id, closing, "Risk already in requested state");
            return Ok(None);
        }
        let risk = self.store.commit_with(now, |state| {
            let risk = state
                .risks
                .get(&risk_id)
                .ok_or_else(|| RiskError::not_found(EntityKind::Risk, risk_id))?;
            Ok((
                Mutation::SetClosed {
                    risk_id,
                    closed_at,
                    updated_at: now,
                },
                risk.clone(),
            ))
        })?;
        let transition = if closing {
            Lifecycle::Closed
        } else {
            Lifecycle::Reopened
        };
        Ok(Some(self.emit(events::risk_lifecycle(
            actor.user_id,
            &risk,
            transition,
            now,
        ))))
    }

    fn get_view(&self, risk_id: RiskId, today: NaiveDate) -> Result<RiskView, RiskError> {
        let record = self.store.require(risk_id)?;
        Ok(RiskView::build(
            &record,
            &self.store.thresholds(),
            self.catalog.as_ref(),
            today,
        ))
    }

    /// Newest `created_at` first; ids break ties.
    fn newest_first(&self) -> Vec<RiskRecord> {
        let mut records = self.store.records();
        records.sort_by(|a, b| {
            (b.risk.created_at, b.risk.risk_id).cmp(&(a.risk.created_at, a.risk.risk_id))
        });
        records
    }

    fn emit(&self, event: RegisterEvent) -> RegisterEvent {
        info!(
            event = event.kind.name(),
            event_id = %event.event_id,
            actor = %event.actor,
            risk_id = ?event.kind.risk_id(),
            "Register event"
        );
        event
    }
}

fn config_error(e: ConfigError) -> RiskError {
    RiskError::Storage(format!("Invalid configuration: {}", e))
}

fn authorize_risks(actor: &Actor) -> Result<(), RiskError> {
    if actor.can_manage_risks() {
        Ok(())
    } else {
        warn!(actor = %actor.user_id, "Risk operation refused");
        Err(RiskError::unauthorized(MANAGE_RISKS))
    }
}
