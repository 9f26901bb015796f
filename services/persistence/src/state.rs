//! Register State: tables and the mutations that change them
//!
//! The register is four tables: severity thresholds, risk rows, and three
//! relationship tables (risk↔control, risk↔component, risk→impact area).
//! Every change is expressed as a `Mutation`, which is what the journal
//! records and what recovery replays.
//!
//! `apply` checks every precondition before touching a table, so a
//! rejected mutation leaves the state exactly as it was.

use risk_types::ids::{ComponentId, ControlId, RiskId};
use risk_types::risk::{ImpactArea, Risk, RiskRecord};
use risk_types::severity::{SeverityThreshold, ThresholdTable};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Risk not found: {0}")]
    RiskNotFound(RiskId),

    #[error("Risk already exists: {0}")]
    DuplicateRisk(RiskId),

    #[error("Threshold row malformed: {0}")]
    MalformedThreshold(SeverityThreshold),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ── Replace-set diff ────────────────────────────────────────────────

/// Members to add and remove to turn one link set into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDiff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T: Ord + Copy> LinkDiff<T> {
    /// Diff from `current` to `desired`.
    pub fn between(current: &BTreeSet<T>, desired: &BTreeSet<T>) -> Self {
        Self {
            added: desired.difference(current).copied().collect(),
            removed: current.difference(desired).copied().collect(),
        }
    }

    /// Diff that adds every member (used for brand-new risks).
    pub fn all_added(members: &BTreeSet<T>) -> Self {
        Self {
            added: members.iter().copied().collect(),
            removed: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

// ── Mutations ───────────────────────────────────────────────────────

/// A single committed change to the register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Replace the whole threshold table (initial seeding).
    SeedThresholds(ThresholdTable),
    /// Replace one severity's range.
    SetThreshold(SeverityThreshold),
    /// Create a risk with its relationship rows.
    InsertRisk {
        risk: Risk,
        controls: LinkDiff<ControlId>,
        components: LinkDiff<ComponentId>,
        impact_areas: LinkDiff<ImpactArea>,
    },
    /// Replace a risk row and apply link diffs.
    UpdateRisk {
        risk: Risk,
        controls: LinkDiff<ControlId>,
        components: LinkDiff<ComponentId>,
        impact_areas: LinkDiff<ImpactArea>,
    },
    /// Archive (`Some`) or reopen (`None`) a risk.
    SetClosed {
        risk_id: RiskId,
        closed_at: Option<i64>,
        updated_at: i64,
    },
    /// Remove a risk and every relationship row pointing at it.
    DeleteRisk(RiskId),
}

impl Mutation {
    /// Journal event type label.
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::SeedThresholds(_) => "SeedThresholds",
            Mutation::SetThreshold(_) => "SetThreshold",
            Mutation::InsertRisk { .. } => "InsertRisk",
            Mutation::UpdateRisk { .. } => "UpdateRisk",
            Mutation::SetClosed { .. } => "SetClosed",
            Mutation::DeleteRisk(_) => "DeleteRisk",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        bincode::serialize(self).map_err(|e| StateError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        bincode::deserialize(bytes).map_err(|e| StateError::Serialization(e.to_string()))
    }
}

// ── Register State ──────────────────────────────────────────────────

/// All register tables.
///
/// `BTreeMap`/`BTreeSet` keep iteration and serialization order stable,
/// so the state hash is reproducible across replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterState {
    pub thresholds: ThresholdTable,
    pub risks: BTreeMap<RiskId, Risk>,
    pub control_links: BTreeSet<(RiskId, ControlId)>,
    pub component_links: BTreeSet<(RiskId, ComponentId)>,
    pub impact_area_links: BTreeSet<(RiskId, ImpactArea)>,
}

impl RegisterState {
    /// Empty register using the given threshold table.
    pub fn new(thresholds: ThresholdTable) -> Self {
        Self {
            thresholds,
            risks: BTreeMap::new(),
            control_links: BTreeSet::new(),
            component_links: BTreeSet::new(),
            impact_area_links: BTreeSet::new(),
        }
    }

    /// Check a mutation's preconditions without changing anything.
    pub fn check(&self, mutation: &Mutation) -> Result<(), StateError> {
        match mutation {
            Mutation::SeedThresholds(table) => {
                if let Some(row) = table.iter().find(|row| !row.is_well_formed()) {
                    return Err(StateError::MalformedThreshold(*row));
                }
            }
            Mutation::SetThreshold(row) => {
                if !row.is_well_formed() {
                    return Err(StateError::MalformedThreshold(*row));
                }
            }
            Mutation::InsertRisk { risk, .. } => {
                if self.risks.contains_key(&risk.risk_id) {
                    return Err(StateError::DuplicateRisk(risk.risk_id));
                }
            }
            Mutation::UpdateRisk { risk, .. } => {
                if !self.risks.contains_key(&risk.risk_id) {
                    return Err(StateError::RiskNotFound(risk.risk_id));
                }
            }
            Mutation::SetClosed { risk_id, .. } | Mutation::DeleteRisk(risk_id) => {
                if !self.risks.contains_key(risk_id) {
                    return Err(StateError::RiskNotFound(*risk_id));
                }
            }
        }
        Ok(())
    }

    /// Apply a mutation. `check` runs first; on error nothing has been
    /// modified.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<(), StateError> {
        self.check(mutation)?;
        match mutation {
            Mutation::SeedThresholds(table) => {
                self.thresholds = table.clone();
            }
            Mutation::SetThreshold(row) => {
                self.thresholds = self.thresholds.with_row(*row);
            }
            Mutation::InsertRisk {
                risk,
                controls,
                components,
                impact_areas,
            }
            | Mutation::UpdateRisk {
                risk,
                controls,
                components,
                impact_areas,
            } => {
                self.risks.insert(risk.risk_id, risk.clone());
                self.apply_links(risk.risk_id, controls, components, impact_areas);
            }
            Mutation::SetClosed {
                risk_id,
                closed_at,
                updated_at,
            } => {
                if let Some(risk) = self.risks.get_mut(risk_id) {
                    risk.closed_at = *closed_at;
                    risk.updated_at = *updated_at;
                }
            }
            Mutation::DeleteRisk(risk_id) => {
                self.risks.remove(risk_id);
                self.control_links.retain(|(owner, _)| owner != risk_id);
                self.component_links.retain(|(owner, _)| owner != risk_id);
                self.impact_area_links.retain(|(owner, _)| owner != risk_id);
            }
        }
        Ok(())
    }

    fn apply_links(
        &mut self,
        risk_id: RiskId,
        controls: &LinkDiff<ControlId>,
        components: &LinkDiff<ComponentId>,
        impact_areas: &LinkDiff<ImpactArea>,
    ) {
        for control in &controls.removed {
            self.control_links.remove(&(risk_id, *control));
        }
        for control in &controls.added {
            self.control_links.insert((risk_id, *control));
        }
        for component in &components.removed {
            self.component_links.remove(&(risk_id, *component));
        }
        for component in &components.added {
            self.component_links.insert((risk_id, *component));
        }
        for area in &impact_areas.removed {
            self.impact_area_links.remove(&(risk_id, *area));
        }
        for area in &impact_areas.added {
            self.impact_area_links.insert((risk_id, *area));
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn controls_of(&self, risk_id: RiskId) -> BTreeSet<ControlId> {
        self.control_links
            .iter()
            .filter(|(owner, _)| *owner == risk_id)
            .map(|(_, control)| *control)
            .collect()
    }

    pub fn components_of(&self, risk_id: RiskId) -> BTreeSet<ComponentId> {
        self.component_links
            .iter()
            .filter(|(owner, _)| *owner == risk_id)
            .map(|(_, component)| *component)
            .collect()
    }

    pub fn impact_areas_of(&self, risk_id: RiskId) -> BTreeSet<ImpactArea> {
        self.impact_area_links
            .iter()
            .filter(|(owner, _)| *owner == risk_id)
            .map(|(_, area)| *area)
            .collect()
    }

    /// Assemble a risk with its relationship rows.
    pub fn record(&self, risk_id: RiskId) -> Option<RiskRecord> {
        let risk = self.risks.get(&risk_id)?;
        Some(RiskRecord {
            risk: risk.clone(),
            controls: self.controls_of(risk_id).into_iter().collect(),
            components: self.components_of(risk_id).into_iter().collect(),
            impact_areas: self.impact_areas_of(risk_id),
        })
    }

    /// Every risk with its relationships, in id (creation) order.
    pub fn records(&self) -> Vec<RiskRecord> {
        self.risks
            .keys()
            .filter_map(|risk_id| self.record(*risk_id))
            .collect()
    }

    /// Relationship rows whose risk no longer exists. Always zero for a
    /// state built only through `apply`.
    pub fn orphaned_link_count(&self) -> usize {
        let orphaned = |risk_id: &RiskId| !self.risks.contains_key(risk_id);
        self.control_links.iter().filter(|(r, _)| orphaned(r)).count()
            + self.component_links.iter().filter(|(r, _)| orphaned(r)).count()
            + self.impact_area_links.iter().filter(|(r, _)| orphaned(r)).count()
    }

    /// Deterministic SHA-256 hash of the serialized state.
    pub fn state_hash(&self) -> Result<String, StateError> {
        let bytes =
            bincode::serialize(self).map_err(|e| StateError::Serialization(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl Default for RegisterState {
    fn default() -> Self {
        Self::new(ThresholdTable::with_defaults())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
