//! Read models for API and dashboard consumers
//!
//! Views are derived on every read: score and severity come from the
//! current threshold table, status from the caller's `today`. Nothing
//! here is stored.

use crate::catalog::Catalog;
use crate::resolver;
use chrono::NaiveDate;
use risk_types::catalog::{Component, Control};
use risk_types::ids::{ComponentId, ControlId, RiskId, UserId};
use risk_types::risk::{risk_score, Chance, Impact, ImpactArea, RiskRecord, RiskStatus, Treatment};
use risk_types::severity::{Severity, ThresholdTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Risks listed per matrix cell before the rest is summarised as a count
pub const MATRIX_CELL_LIMIT: usize = 3;

// ── Risk view ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleView {
    pub value: String,
    pub weight: u8,
}

impl From<Impact> for ScaleView {
    fn from(impact: Impact) -> Self {
        Self {
            value: impact.as_str().to_string(),
            weight: impact.weight(),
        }
    }
}

impl From<Chance> for ScaleView {
    fn from(chance: Chance) -> Self {
        Self {
            value: chance.as_str().to_string(),
            weight: chance.weight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerView {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentView {
    pub id: ComponentId,
    pub name: String,
    /// Name of the component's context scope
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlView {
    pub id: ControlId,
    pub domain: String,
    pub section: Option<String>,
    pub description: Option<String>,
}

impl From<Control> for ControlView {
    fn from(control: Control) -> Self {
        Self {
            id: control.control_id,
            domain: control.domain,
            section: control.section,
            description: control.description,
        }
    }
}

/// JSON-ready risk with derived fields.
///
/// Linked records missing from the catalog are left out of the nested
/// lists and of their id lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskView {
    pub id: RiskId,
    pub title: String,
    pub description: String,
    pub discovered_on: NaiveDate,
    pub impact: ScaleView,
    pub chance: ScaleView,
    pub score: u32,
    /// `None` when no threshold range contains the score
    pub severity: Option<Severity>,
    pub treatment: Treatment,
    pub treatment_plan: Option<String>,
    pub treatment_due_date: Option<NaiveDate>,
    pub treatment_owner: Option<OwnerView>,
    pub status: RiskStatus,
    pub component_ids: Vec<ComponentId>,
    pub components: Vec<ComponentView>,
    pub impact_areas: Vec<ImpactArea>,
    pub controls: Vec<ControlView>,
    pub control_ids: Vec<ControlId>,
    /// First control, kept for single-control clients
    pub control: Option<ControlView>,
    pub ticket_url: Option<String>,
    pub closed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RiskView {
    pub fn build(
        record: &RiskRecord,
        table: &ThresholdTable,
        catalog: &dyn Catalog,
        today: NaiveDate,
    ) -> Self {
        let risk = &record.risk;
        let score = risk.score();

        let mut components: Vec<ComponentView> = record
            .components
            .iter()
            .filter_map(|id| catalog.component(*id))
            .map(|component| component_view(component, catalog))
            .collect();
        components.sort_by_key(|c| c.name.to_lowercase());

        let mut controls: Vec<ControlView> = record
            .controls
            .iter()
            .filter_map(|id| catalog.control(*id))
            .map(ControlView::from)
            .collect();
        controls.sort_by(|a, b| {
            (&a.domain, a.section.as_deref().unwrap_or(""))
                .cmp(&(&b.domain, b.section.as_deref().unwrap_or("")))
        });

        let treatment_owner = risk
            .treatment_owner
            .and_then(|id| catalog.user(id))
            .map(|user| OwnerView {
                id: user.user_id,
                name: user.name,
                email: user.email,
            });

        Self {
            id: risk.risk_id,
            title: risk.title.clone(),
            description: risk.description.clone(),
            discovered_on: risk.discovered_on,
            impact: risk.impact.into(),
            chance: risk.chance.into(),
            score,
            severity: resolver::resolve(score, table),
            treatment: risk.treatment,
            treatment_plan: risk.treatment_plan.clone(),
            treatment_due_date: risk.treatment_due_date,
            treatment_owner,
            status: risk.status(today),
            component_ids: components.iter().map(|c| c.id).collect(),
            components,
            // BTreeSet iteration is already sorted
            impact_areas: record.impact_areas.iter().copied().collect(),
            control_ids: controls.iter().map(|c| c.id).collect(),
            control: controls.first().cloned(),
            controls,
            ticket_url: risk.ticket_url.clone(),
            closed_at: risk.closed_at,
            created_at: risk.created_at,
            updated_at: risk.updated_at,
        }
    }

    pub fn is_overdue(&self) -> bool {
        self.status == RiskStatus::Overdue
    }
}

fn component_view(component: Component, catalog: &dyn Catalog) -> ComponentView {
    ComponentView {
        context: catalog.scope(component.scope_id).map(|scope| scope.name),
        id: component.component_id,
        name: component.name,
    }
}

// ── Dashboard ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total: usize,
    /// High plus critical
    pub high: usize,
    pub mitigate: usize,
    pub overdue: usize,
    /// Distinct components linked by any risk
    pub components: usize,
    /// Latest `updated_at` across all risks
    pub recent_update: Option<i64>,
}

impl DashboardMetrics {
    pub fn from_views(views: &[RiskView]) -> Self {
        let components: BTreeSet<ComponentId> = views
            .iter()
            .flat_map(|view| view.component_ids.iter().copied())
            .collect();
        Self {
            total: views.len(),
            high: views
                .iter()
                .filter(|v| v.severity.is_some_and(|s| s.is_elevated()))
                .count(),
            mitigate: views
                .iter()
                .filter(|v| v.treatment == Treatment::Mitigate)
                .count(),
            overdue: views.iter().filter(|v| v.is_overdue()).count(),
            components: components.len(),
            recent_update: views.iter().map(|v| v.updated_at).max(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRisk {
    pub id: RiskId,
    pub title: String,
    pub severity: Option<Severity>,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCell {
    pub impact: Impact,
    pub score: u32,
    /// Severity of the cell's own score
    pub severity: Option<Severity>,
    /// Highest-scored risks in the cell, at most `MATRIX_CELL_LIMIT`
    pub risks: Vec<MatrixRisk>,
    pub extra_count: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub chance: Chance,
    pub cells: Vec<MatrixCell>,
}

/// 5×5 heat matrix: chance rows from almost certain down to rare, impact
/// columns from insignificant up to catastrophic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskMatrix {
    pub impact_axis: Vec<Impact>,
    pub chance_axis: Vec<Chance>,
    pub rows: Vec<MatrixRow>,
}

impl RiskMatrix {
    /// Build from risks in display order; ties within a cell keep it.
    pub fn build(records: &[RiskRecord], table: &ThresholdTable) -> Self {
        let impact_axis: Vec<Impact> = Impact::ALL.to_vec();
        let chance_axis: Vec<Chance> = Chance::ALL.iter().rev().copied().collect();

        let rows = chance_axis
            .iter()
            .map(|&chance| {
                let cells = impact_axis
                    .iter()
                    .map(|&impact| matrix_cell(records, table, impact, chance))
                    .collect();
                MatrixRow { chance, cells }
            })
            .collect();

        Self {
            impact_axis,
            chance_axis,
            rows,
        }
    }

    pub fn cell(&self, impact: Impact, chance: Chance) -> Option<&MatrixCell> {
        self.rows
            .iter()
            .find(|row| row.chance == chance)?
            .cells
            .iter()
            .find(|cell| cell.impact == impact)
    }
}

fn matrix_cell(
    records: &[RiskRecord],
    table: &ThresholdTable,
    impact: Impact,
    chance: Chance,
) -> MatrixCell {
    let score = risk_score(impact, chance);
    let mut risks: Vec<MatrixRisk> = records
        .iter()
        .map(|record| &record.risk)
        .filter(|risk| risk.impact == impact && risk.chance == chance)
        .map(|risk| MatrixRisk {
            id: risk.risk_id,
            title: risk.title.clone(),
            severity: resolver::resolve(risk.score(), table),
            score: risk.score(),
        })
        .collect();
    // Stable, so equal scores keep display order
    risks.sort_by(|a, b| b.score.cmp(&a.score));
    let total = risks.len();
    risks.truncate(MATRIX_CELL_LIMIT);

    MatrixCell {
        impact,
        score,
        severity: resolver::resolve(score, table),
        risks,
        extra_count: total.saturating_sub(MATRIX_CELL_LIMIT),
        total,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityScaleEntry {
    pub severity: Severity,
    pub label: String,
    pub min_score: u32,
    pub max_score: u32,
}

/// Threshold rows in severity order, for legends.
pub fn severity_scale(table: &ThresholdTable) -> Vec<SeverityScaleEntry> {
    table
        .iter()
        .map(|row| SeverityScaleEntry {
            severity: row.severity,
            label: row.severity.label().to_string(),
            min_score: row.min_score,
            max_score: row.max_score,
        })
        .collect()
}

/// Everything the dashboard page shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub risks: Vec<RiskView>,
    pub metrics: DashboardMetrics,
    pub matrix: RiskMatrix,
    pub severity_scale: Vec<SeverityScaleEntry>,
    pub threshold_version: u64,
}
