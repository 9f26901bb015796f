//! Catalog lookups for the records a risk links to
//!
//! Controls, components, scopes and users belong to other modules of the
//! platform. The register only needs to look them up, so it sees them
//! through the `Catalog` trait.

use parking_lot::RwLock;
use risk_types::catalog::{Component, ContextScope, Control, User};
use risk_types::ids::{ComponentId, ControlId, ScopeId, UserId};
use std::collections::BTreeMap;

pub trait Catalog: Send + Sync {
    fn control(&self, id: ControlId) -> Option<Control>;
    fn component(&self, id: ComponentId) -> Option<Component>;
    fn scope(&self, id: ScopeId) -> Option<ContextScope>;
    fn user(&self, id: UserId) -> Option<User>;

    /// A component is eligible when its scope has any risk-assessment flag.
    fn is_component_eligible(&self, id: ComponentId) -> bool {
        self.component(id)
            .and_then(|component| self.scope(component.scope_id))
            .is_some_and(|scope| scope.is_risk_eligible())
    }
}

/// Catalog held in memory, fillable through a shared reference.
#[derive(Default)]
pub struct InMemoryCatalog {
    controls: RwLock<BTreeMap<ControlId, Control>>,
    components: RwLock<BTreeMap<ComponentId, Component>>,
    scopes: RwLock<BTreeMap<ScopeId, ContextScope>>,
    users: RwLock<BTreeMap<UserId, User>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_control(&self, control: Control) {
        self.controls.write().insert(control.control_id, control);
    }

    pub fn add_component(&self, component: Component) {
        self.components
            .write()
            .insert(component.component_id, component);
    }

    pub fn add_scope(&self, scope: ContextScope) {
        self.scopes.write().insert(scope.scope_id, scope);
    }

    pub fn add_user(&self, user: User) {
        self.users.write().insert(user.user_id, user);
    }

    pub fn remove_control(&self, id: ControlId) -> Option<Control> {
        self.controls.write().remove(&id)
    }

    /// Components under an eligible scope, by scope name then component
    /// name (case-insensitive).
    pub fn eligible_components(&self) -> Vec<Component> {
        let scopes = self.scopes.read();
        let mut eligible: Vec<(String, Component)> = self
            .components
            .read()
            .values()
            .filter_map(|component| {
                let scope = scopes.get(&component.scope_id)?;
                scope
                    .is_risk_eligible()
                    .then(|| (scope.name.clone(), component.clone()))
            })
            .collect();
        eligible.sort_by(|(a_scope, a), (b_scope, b)| {
            a_scope
                .cmp(b_scope)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        eligible.into_iter().map(|(_, component)| component).collect()
    }
}

impl Catalog for InMemoryCatalog {
    fn control(&self, id: ControlId) -> Option<Control> {
        self.controls.read().get(&id).cloned()
    }

    fn component(&self, id: ComponentId) -> Option<Component> {
        self.components.read().get(&id).cloned()
    }

    fn scope(&self, id: ScopeId) -> Option<ContextScope> {
        self.scopes.read().get(&id).cloned()
    }

    fn user(&self, id: UserId) -> Option<User> {
        self.users.read().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(name: &str, eligible: bool) -> ContextScope {
        ContextScope {
            scope_id: ScopeId::new(),
            name: name.to_string(),
            risk_assessment_human: false,
            risk_assessment_process: eligible,
            risk_assessment_technological: false,
        }
    }

    fn component(name: &str, scope: &ContextScope) -> Component {
        Component {
            component_id: ComponentId::new(),
            name: name.to_string(),
            scope_id: scope.scope_id,
        }
    }

    #[test]
    fn test_eligibility_follows_scope_flags() {
        let catalog = InMemoryCatalog::new();
        let hr = scope("HR", true);
        let lab = scope("Lab", false);
        let payroll = component("Payroll", &hr);
        let scanner = component("Scanner", &lab);
        catalog.add_scope(hr);
        catalog.add_scope(lab);
        catalog.add_component(payroll.clone());
        catalog.add_component(scanner.clone());

        assert!(catalog.is_component_eligible(payroll.component_id));
        assert!(!catalog.is_component_eligible(scanner.component_id));
        assert!(!catalog.is_component_eligible(ComponentId::new()));
    }

    #[test]
    fn test_component_without_scope_is_ineligible() {
        let catalog = InMemoryCatalog::new();
        let orphan = component("Orphan", &scope("Gone", true));
        catalog.add_component(orphan.clone());
        assert!(!catalog.is_component_eligible(orphan.component_id));
    }

    #[test]
    fn test_eligible_components_sorted() {
        let catalog = InMemoryCatalog::new();
        let finance = scope("Finance", true);
        let hr = scope("HR", true);
        for (name, s) in [("ledger", &finance), ("Payroll", &hr), ("Billing", &finance)] {
            catalog.add_component(component(name, s));
        }
        catalog.add_scope(finance);
        catalog.add_scope(hr);

        let names: Vec<String> = catalog
            .eligible_components()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Billing", "ledger", "Payroll"]);
    }
}
