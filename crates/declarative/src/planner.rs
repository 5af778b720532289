//! Planner - refreshes state and computes the change set for a configuration

use crate::address::{ResourceAddress, Target};
use crate::config::Configuration;
use crate::context::ApplyContext;
use crate::diff::{DiffSummary, ResourceChange, destroy_change, diff_resource};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::provider::ProviderRegistry;
use crate::state::StateSnapshot;
use crate::value::{Lookup, PlannedAttributes, Reference, Scope, interpolate};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// What the plan is for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlanMode {
    /// Converge state to the configuration
    #[default]
    Normal,
    /// Destroy every managed resource
    Destroy,
}

/// Options for planning
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub mode: PlanMode,
    /// Restrict the plan to these resources (and what they need)
    pub targets: Vec<Target>,
    /// Read real objects before diffing
    pub refresh: bool,
    /// Resolved input variables
    pub variables: BTreeMap<String, Value>,
    pub verbose: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            mode: PlanMode::Normal,
            targets: Vec::new(),
            refresh: true,
            variables: BTreeMap::new(),
            verbose: false,
        }
    }
}

/// A computed change set
#[derive(Debug, Clone)]
pub struct Plan {
    pub mode: PlanMode,
    /// One change per planned resource, in address order
    pub changes: Vec<ResourceChange>,
    /// State after refresh; the baseline the changes apply to
    pub prior_state: StateSnapshot,
    /// Resources whose real objects differed from the recorded state
    pub drifted: Vec<ResourceAddress>,
    /// Dependency graph of the configuration
    pub graph: DependencyGraph,
    /// Input variables the plan was computed with
    pub variables: BTreeMap<String, Value>,
}

impl Plan {
    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_changes(&self.changes)
    }

    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| c.action.is_change())
    }

    pub fn change(&self, address: &ResourceAddress) -> Option<&ResourceChange> {
        self.changes.iter().find(|c| &c.address == address)
    }

    /// Changes that actually do something
    pub fn actionable(&self) -> impl Iterator<Item = &ResourceChange> {
        self.changes.iter().filter(|c| c.action.is_change())
    }
}

/// Read every resource in state through its provider
///
/// Objects that no longer exist are dropped. Returns the refreshed snapshot
/// and the addresses whose attributes changed or disappeared.
pub fn refresh(
    state: &StateSnapshot,
    registry: &ProviderRegistry,
    verbose: bool,
) -> Result<(StateSnapshot, Vec<ResourceAddress>)> {
    let reads: Vec<_> = state
        .resources
        .par_iter()
        .filter_map(|(address, instance)| {
            let provider = registry.get(&address.resource_type)?;
            let ctx = ApplyContext::new(address, verbose);
            let read = provider
                .read(&ctx, &instance.attributes)
                .map_err(|e| Error::Provider {
                    address: address.clone(),
                    message: format!("refresh failed: {e:#}"),
                });
            Some((address.clone(), read))
        })
        .collect();

    let mut refreshed = state.clone();
    let mut drifted = Vec::new();
    for (address, read) in reads {
        match read? {
            None => {
                log::info!("{address} no longer exists, removing from state");
                refreshed.remove(&address);
                drifted.push(address);
            }
            Some(attributes) => {
                if let Some(instance) = refreshed.resources.get_mut(&address)
                    && instance.attributes != attributes
                {
                    log::info!("{address} changed outside of terrace");
                    instance.attributes = attributes;
                    drifted.push(address);
                }
            }
        }
    }
    drifted.sort();
    Ok((refreshed, drifted))
}

/// Reference lookup against planned changes, falling back to state
struct PlanScope<'a> {
    variables: &'a BTreeMap<String, Value>,
    changes: &'a BTreeMap<ResourceAddress, ResourceChange>,
    state: &'a StateSnapshot,
}

impl Scope for PlanScope<'_> {
    fn lookup(&self, reference: &Reference) -> Lookup {
        match reference {
            Reference::Variable(name) => self
                .variables
                .get(name)
                .map_or(Lookup::Missing, |v| Lookup::Known(v.clone())),
            Reference::Attribute { address, attribute } => {
                if let Some(change) = self.changes.get(address) {
                    return match change.planned(attribute) {
                        Some(planned) => planned
                            .known()
                            .map_or(Lookup::Unknown, |v| Lookup::Known(v.clone())),
                        None => Lookup::Known(Value::Null),
                    };
                }
                match self.state.get(address) {
                    Some(instance) => Lookup::Known(
                        instance
                            .attributes
                            .get(attribute)
                            .cloned()
                            .unwrap_or(Value::Null),
                    ),
                    None => Lookup::Missing,
                }
            }
        }
    }
}

/// Compute the plan for a configuration against stored state
pub fn plan(
    config: &Configuration,
    state: &StateSnapshot,
    registry: &ProviderRegistry,
    options: &PlanOptions,
) -> Result<Plan> {
    config.validate(registry)?;
    let graph = DependencyGraph::build(config)?;

    let (prior_state, drifted) = if options.refresh {
        refresh(state, registry, options.verbose)?
    } else {
        (state.clone(), Vec::new())
    };

    let changes = match options.mode {
        PlanMode::Normal => plan_normal(config, &graph, &prior_state, registry, options)?,
        PlanMode::Destroy => plan_destroy(config, &graph, &prior_state, options)?,
    };

    log::debug!(
        "Planned {} resources ({})",
        changes.len(),
        DiffSummary::from_changes(&changes)
    );

    Ok(Plan {
        mode: options.mode,
        changes,
        prior_state,
        drifted,
        graph,
        variables: options.variables.clone(),
    })
}

fn targeted(address: &ResourceAddress, targets: &[Target]) -> bool {
    targets.iter().any(|t| t.matches(address))
}

fn plan_normal(
    config: &Configuration,
    graph: &DependencyGraph,
    state: &StateSnapshot,
    registry: &ProviderRegistry,
    options: &PlanOptions,
) -> Result<Vec<ResourceChange>> {
    let selected: BTreeSet<ResourceAddress> = if options.targets.is_empty() {
        config.resources.keys().cloned().collect()
    } else {
        let mut selected = BTreeSet::new();
        for address in config.resources.keys() {
            if targeted(address, &options.targets) {
                selected.insert(address.clone());
                selected.extend(graph.transitive_dependencies(address));
            }
        }
        selected
    };

    let mut planned: BTreeMap<ResourceAddress, ResourceChange> = BTreeMap::new();
    for address in graph.topological_order()? {
        if !selected.contains(&address) {
            continue;
        }
        let Some(resource) = config.resource(&address) else {
            continue;
        };
        let schema = registry.require(&address)?.schema();

        let scope = PlanScope {
            variables: &options.variables,
            changes: &planned,
            state,
        };
        let mut desired = PlannedAttributes::new();
        for (name, value) in &resource.attributes {
            desired.insert(
                name.clone(),
                interpolate(value, &scope, &resource.location(name))?,
            );
        }
        schema.apply_defaults(&mut desired);
        schema.check_types(&address, &desired)?;

        let change = diff_resource(
            &address,
            &schema,
            &resource.lifecycle,
            state.get(&address),
            desired,
        )?;
        planned.insert(address, change);
    }

    for (address, instance) in &state.resources {
        let orphan = !config.resources.contains_key(address);
        if orphan && (options.targets.is_empty() || targeted(address, &options.targets)) {
            planned.insert(address.clone(), destroy_change(address, instance, None)?);
        }
    }

    Ok(planned.into_values().collect())
}

fn plan_destroy(
    config: &Configuration,
    graph: &DependencyGraph,
    state: &StateSnapshot,
    options: &PlanOptions,
) -> Result<Vec<ResourceChange>> {
    let selected: BTreeSet<ResourceAddress> = if options.targets.is_empty() {
        state.addresses().cloned().collect()
    } else {
        let mut selected = BTreeSet::new();
        for address in state.addresses() {
            if targeted(address, &options.targets) {
                selected.insert(address.clone());
                selected.extend(state.recorded_dependents(address));
                if graph.contains(address) {
                    selected.extend(graph.transitive_dependents(address));
                }
            }
        }
        selected
    };

    let mut changes = Vec::new();
    for address in &selected {
        if let Some(instance) = state.get(address) {
            let lifecycle = config.resource(address).map(|r| &r.lifecycle);
            changes.push(destroy_change(address, instance, lifecycle)?);
        }
    }
    Ok(changes)
}
