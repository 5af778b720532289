//! Execution engine - applies a plan in dependency order with bounded parallelism
//!
//! Each actionable change becomes a node. A node is dispatched to the worker
//! pool once every node it waits on has finished; a failed node causes all of
//! its transitive dependents to be skipped. Provider calls happen on pool
//! threads, while progress reporting and scheduling stay on the calling
//! thread.

use crate::address::ResourceAddress;
use crate::config::{Configuration, ResourceConfig};
use crate::context::{ApplyContext, AutoConfirm, ConfirmCallback, NoProgress, ProgressCallback};
use crate::diff::{Action, ResourceChange, apply_ignore_changes, configurable_equal};
use crate::error::Error;
use crate::planner::{Plan, PlanMode};
use crate::provider::{ProviderRegistry, ResourceProvider};
use crate::state::{OutputValue, ResourceInstance, StateSnapshot, lock_poisoned};
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use crate::value::{
    Attributes, Lookup, PlannedAttributes, PlannedValue, Reference, Scope, all_known, interpolate,
};
use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;
use std::sync::mpsc;

/// Result of executing a plan
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub summary: ExecuteSummary,
    /// Result for every actionable change
    pub results: BTreeMap<ResourceAddress, ApplyResult>,
    /// State after execution, including partial progress on failure
    pub state: StateSnapshot,
    /// The user declined the confirmation prompt; nothing was applied
    pub declined: bool,
}

/// Reference lookup against the state being built during apply
struct StateScope<'a> {
    variables: &'a BTreeMap<String, Value>,
    state: &'a StateSnapshot,
}

impl Scope for StateScope<'_> {
    fn lookup(&self, reference: &Reference) -> Lookup {
        match reference {
            Reference::Variable(name) => self
                .variables
                .get(name)
                .map_or(Lookup::Missing, |v| Lookup::Known(v.clone())),
            Reference::Attribute { address, attribute } => match self.state.get(address) {
                Some(instance) => Lookup::Known(
                    instance
                        .attributes
                        .get(attribute)
                        .cloned()
                        .unwrap_or(Value::Null),
                ),
                None => Lookup::Missing,
            },
        }
    }
}

/// Execute a plan with the given options and callbacks
///
/// # Type Parameters
/// * `P` - Progress callback type
/// * `C` - Confirm callback type
///
/// # Returns
/// The outcome, whose state should be persisted even when some changes
/// failed.
pub fn execute<P, C>(
    plan: &Plan,
    config: &Configuration,
    registry: &ProviderRegistry,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteOutcome>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let nodes: Vec<&ResourceChange> = plan.actionable().collect();

    if nodes.is_empty() {
        let mut state = plan.prior_state.clone();
        refresh_dependency_records(plan, config, &mut state);
        update_outputs(plan, config, &mut state);
        return Ok(ExecuteOutcome {
            summary: ExecuteSummary::default(),
            results: BTreeMap::new(),
            state,
            declined: false,
        });
    }

    if !confirm.confirm("Do you want to perform these actions?")? {
        let results: BTreeMap<_, _> = nodes
            .iter()
            .map(|c| {
                let reason = "not confirmed".to_string();
                (c.address.clone(), ApplyResult::Skipped { reason })
            })
            .collect();
        return Ok(ExecuteOutcome {
            summary: ExecuteSummary {
                skipped: results.len(),
                ..Default::default()
            },
            results,
            state: plan.prior_state.clone(),
            declined: true,
        });
    }

    let waits_on = apply_edges(plan, &nodes);
    let (results, mut state) =
        run_nodes(plan, config, registry, opts, &nodes, &waits_on, progress)?;

    refresh_dependency_records(plan, config, &mut state);
    update_outputs(plan, config, &mut state);

    let mut summary = ExecuteSummary::default();
    let mut by_address = BTreeMap::new();
    for (change, result) in nodes.iter().zip(results) {
        summary.add_result(&result);
        by_address.insert(change.address.clone(), result);
    }

    log::info!(
        "Apply finished: {} changed, {} failed, {} skipped",
        summary.total_changes(),
        summary.failed,
        summary.skipped
    );

    Ok(ExecuteOutcome {
        summary,
        results: by_address,
        state,
        declined: false,
    })
}

/// Execute without progress reporting or confirmation
pub fn execute_simple(
    plan: &Plan,
    config: &Configuration,
    registry: &ProviderRegistry,
    opts: &ExecuteOptions,
) -> Result<ExecuteOutcome> {
    execute(plan, config, registry, opts, &mut NoProgress, &mut AutoConfirm)
}

/// For each node, the nodes that must finish before it starts
///
/// Creates and updates wait on changing dependencies from the configuration.
/// Destroys wait on every resource that recorded a dependency on them, so
/// dependents go first.
fn apply_edges(plan: &Plan, nodes: &[&ResourceChange]) -> Vec<BTreeSet<usize>> {
    let index: BTreeMap<&ResourceAddress, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, c)| (&c.address, i))
        .collect();

    nodes
        .iter()
        .map(|change| {
            if change.action == Action::Destroy {
                plan.prior_state
                    .recorded_dependents(&change.address)
                    .iter()
                    .filter_map(|dep| index.get(dep).copied())
                    .collect()
            } else {
                plan.graph
                    .transitive_dependencies(&change.address)
                    .iter()
                    .filter_map(|dep| index.get(dep).copied())
                    .filter(|&i| nodes[i].action != Action::Destroy)
                    .collect()
            }
        })
        .collect()
}

fn run_nodes<P: ProgressCallback>(
    plan: &Plan,
    config: &Configuration,
    registry: &ProviderRegistry,
    opts: &ExecuteOptions,
    nodes: &[&ResourceChange],
    waits_on: &[BTreeSet<usize>],
    progress: &mut P,
) -> Result<(Vec<ApplyResult>, StateSnapshot)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.parallelism.max(1))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let mut unblocks: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (node, deps) in waits_on.iter().enumerate() {
        for &dep in deps {
            unblocks[dep].push(node);
        }
    }
    let mut remaining: Vec<usize> = waits_on.iter().map(BTreeSet::len).collect();
    let mut results: Vec<Option<ApplyResult>> = vec![None; nodes.len()];

    let working = Mutex::new(plan.prior_state.clone());
    let verbose = opts.verbose;

    progress.on_batch_start(nodes.len());

    pool.in_place_scope(|scope| {
        let (tx, rx) = mpsc::channel::<(usize, ApplyResult)>();
        let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| remaining[i] == 0).collect();
        let mut running = 0usize;

        loop {
            while let Some(i) = ready.pop_first() {
                let change = nodes[i];
                progress.on_resource_start(&change.address, change.action);
                let tx = tx.clone();
                let working = &working;
                let variables = &plan.variables;
                scope.spawn(move |_| {
                    let result =
                        run_change(change, config, registry, working, variables, verbose);
                    let _ = tx.send((i, result));
                });
                running += 1;
            }

            if running == 0 {
                break;
            }
            let Ok((i, result)) = rx.recv() else {
                break;
            };
            running -= 1;
            progress.on_resource_complete(&nodes[i].address, &result);

            if let ApplyResult::Failed { error } = &result {
                log::warn!("{} failed: {error}", nodes[i].address);
                for j in downstream(i, &unblocks) {
                    if results[j].is_none() {
                        let skipped = ApplyResult::Skipped {
                            reason: format!("dependency {} failed", nodes[i].address),
                        };
                        progress.on_resource_complete(&nodes[j].address, &skipped);
                        results[j] = Some(skipped);
                    }
                }
            } else {
                for &j in &unblocks[i] {
                    remaining[j] -= 1;
                    if remaining[j] == 0 && results[j].is_none() {
                        ready.insert(j);
                    }
                }
            }
            results[i] = Some(result);
        }
    });

    progress.on_batch_complete();

    let results = results
        .into_iter()
        .map(|r| {
            r.unwrap_or_else(|| ApplyResult::Skipped {
                reason: "not reached".to_string(),
            })
        })
        .collect();
    let state = working
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    Ok((results, state))
}

/// Every node that transitively waits on `start`
fn downstream(start: usize, unblocks: &[Vec<usize>]) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        for &next in &unblocks[node] {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen
}

/// Apply a single change, converting errors into a failed result
fn run_change(
    change: &ResourceChange,
    config: &Configuration,
    registry: &ProviderRegistry,
    working: &Mutex<StateSnapshot>,
    variables: &BTreeMap<String, Value>,
    verbose: bool,
) -> ApplyResult {
    match apply_change(change, config, registry, working, variables, verbose) {
        Ok(result) => result,
        Err(e) => ApplyResult::Failed {
            error: format!("{e:#}"),
        },
    }
}

fn apply_change(
    change: &ResourceChange,
    config: &Configuration,
    registry: &ProviderRegistry,
    working: &Mutex<StateSnapshot>,
    variables: &BTreeMap<String, Value>,
    verbose: bool,
) -> Result<ApplyResult> {
    let address = &change.address;
    let provider = registry.require(address)?;
    let ctx = ApplyContext::new(address, verbose);
    let prior = lock_poisoned(working.lock()).get(address).cloned();

    if change.action == Action::Destroy {
        if let Some(prior) = prior {
            provider
                .delete(&ctx, &prior.attributes)
                .with_context(|| format!("destroying {address}"))?;
        }
        lock_poisoned(working.lock()).remove(address);
        return Ok(ApplyResult::Removed);
    }

    let resource = config
        .resource(address)
        .ok_or_else(|| anyhow!("{address} is not in the configuration"))?;
    let schema = provider.schema();

    let mut desired = resolve_desired(resource, working, variables)?;
    if change.action == Action::Update
        && let Some(prior) = &prior
    {
        apply_ignore_changes(&resource.lifecycle, &prior.attributes, &mut desired);
    }
    schema.apply_defaults(&mut desired);
    schema.check_types(address, &desired)?;
    let desired = all_known(&desired)
        .ok_or_else(|| anyhow!("{address} still has unknown values after its dependencies were applied"))?;
    let dependencies: Vec<ResourceAddress> = resource.dependencies()?.into_iter().collect();

    let record = |attributes: Attributes| {
        lock_poisoned(working.lock()).insert(
            address.clone(),
            ResourceInstance {
                attributes,
                dependencies: dependencies.clone(),
                tainted: false,
            },
        );
    };

    match (change.action, prior) {
        (Action::Update, Some(prior)) => {
            if configurable_equal(&schema, &prior.attributes, &desired) {
                log::debug!("{address} resolved to its current values, nothing to update");
                return Ok(ApplyResult::NoChange);
            }
            let attributes = provider
                .update(&ctx, &prior.attributes, &desired)
                .with_context(|| format!("updating {address}"))?;
            record(attributes);
            Ok(ApplyResult::Modified)
        }
        (Action::Replace, Some(prior)) => {
            replace(provider, &ctx, resource, &prior.attributes, &desired, &record, working)?;
            Ok(ApplyResult::Replaced)
        }
        _ => {
            let attributes = provider
                .create(&ctx, &desired)
                .with_context(|| format!("creating {address}"))?;
            record(attributes);
            Ok(ApplyResult::Created)
        }
    }
}

fn replace(
    provider: &dyn ResourceProvider,
    ctx: &ApplyContext,
    resource: &ResourceConfig,
    prior: &Attributes,
    desired: &Attributes,
    record: &dyn Fn(Attributes),
    working: &Mutex<StateSnapshot>,
) -> Result<()> {
    let address = ctx.address;
    if resource.lifecycle.create_before_destroy {
        let attributes = provider
            .create(ctx, desired)
            .with_context(|| format!("creating replacement for {address}"))?;
        record(attributes);
        provider
            .delete(ctx, prior)
            .with_context(|| format!("destroying previous {address}"))?;
    } else {
        provider
            .delete(ctx, prior)
            .with_context(|| format!("destroying {address} for replacement"))?;
        lock_poisoned(working.lock()).remove(address);
        let attributes = provider
            .create(ctx, desired)
            .with_context(|| format!("creating {address}"))?;
        record(attributes);
    }
    Ok(())
}

/// Re-interpolate configured attributes against the current working state
fn resolve_desired(
    resource: &ResourceConfig,
    working: &Mutex<StateSnapshot>,
    variables: &BTreeMap<String, Value>,
) -> Result<PlannedAttributes> {
    let state = lock_poisoned(working.lock());
    let scope = StateScope {
        variables,
        state: &state,
    };
    let mut desired = PlannedAttributes::new();
    for (name, value) in &resource.attributes {
        desired.insert(
            name.clone(),
            interpolate(value, &scope, &resource.location(name))?,
        );
    }
    Ok(desired)
}

/// Record current configuration dependencies for resources left unchanged
fn refresh_dependency_records(plan: &Plan, config: &Configuration, state: &mut StateSnapshot) {
    for change in plan.changes.iter().filter(|c| c.action == Action::NoOp) {
        if let (Some(resource), Some(instance)) = (
            config.resource(&change.address),
            state.resources.get_mut(&change.address),
        ) && let Ok(deps) = resource.dependencies()
        {
            instance.dependencies = deps.into_iter().collect();
        }
    }
}

/// Evaluate output values against the final state
fn update_outputs(plan: &Plan, config: &Configuration, state: &mut StateSnapshot) {
    if plan.mode == PlanMode::Destroy {
        state.outputs.clear();
        return;
    }

    let mut outputs = BTreeMap::new();
    {
        let scope = StateScope {
            variables: &plan.variables,
            state: &*state,
        };
        for (name, output) in &config.outputs {
            match interpolate(&output.value, &scope, &format!("output.{name}")) {
                Ok(PlannedValue::Known(value)) => {
                    outputs.insert(
                        name.clone(),
                        OutputValue {
                            value,
                            sensitive: output.sensitive,
                        },
                    );
                }
                Ok(PlannedValue::Unknown) => log::warn!("Output {name} is not known yet"),
                Err(e) => log::warn!("Output {name} could not be evaluated: {e}"),
            }
        }
    }
    state.outputs = outputs;
}
