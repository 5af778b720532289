//! Diff computation between desired configuration and stored state

use crate::address::ResourceAddress;
use crate::config::Lifecycle;
use crate::error::{Error, Result};
use crate::provider::Schema;
use crate::state::ResourceInstance;
use crate::value::{Attributes, PlannedAttributes, PlannedValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Kind of change planned for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    NoOp,
    Create,
    Update,
    Destroy,
    Replace,
}

impl Action {
    /// Check if the action changes anything
    pub fn is_change(self) -> bool {
        !matches!(self, Self::NoOp)
    }

    /// Plan symbol for this action
    pub fn symbol(self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Update => "~",
            Self::Destroy => "-",
            Self::Replace => "-/+",
        }
    }

    /// Verb used in plan output
    pub fn verb(self) -> &'static str {
        match self {
            Self::NoOp => "unchanged",
            Self::Create => "created",
            Self::Update => "updated in-place",
            Self::Destroy => "destroyed",
            Self::Replace => "replaced",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Update => "update",
            Self::Destroy => "destroy",
            Self::Replace => "replace",
        };
        f.write_str(name)
    }
}

/// Why a resource must be replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceReason {
    /// Changes to these attributes cannot be applied in place
    ForcedBy(Vec<String>),
    /// The resource was tainted
    Tainted,
}

impl fmt::Display for ReplaceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForcedBy(attrs) => write!(f, "forced by changes to {}", attrs.join(", ")),
            Self::Tainted => f.write_str("tainted"),
        }
    }
}

/// Change to one attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDiff {
    pub name: String,
    pub before: Option<Value>,
    pub after: Option<PlannedValue>,
    pub forces_replacement: bool,
}

/// Planned change for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceChange {
    pub address: ResourceAddress,
    pub action: Action,
    /// Attributes recorded in state, if the resource exists
    pub before: Option<Attributes>,
    /// Attributes after the change, if the resource will exist
    pub after: Option<PlannedAttributes>,
    /// Attributes that differ (or that will be set, on create)
    pub attributes: Vec<AttributeDiff>,
    pub replace_reason: Option<ReplaceReason>,
    pub lifecycle: Lifecycle,
}

impl ResourceChange {
    /// Look up a planned attribute value
    pub fn planned(&self, attribute: &str) -> Option<&PlannedValue> {
        self.after.as_ref().and_then(|a| a.get(attribute))
    }
}

/// Overwrite ignored attributes with their recorded values
pub fn apply_ignore_changes(lifecycle: &Lifecycle, prior: &Attributes, desired: &mut PlannedAttributes) {
    for name in &lifecycle.ignore_changes {
        match prior.get(name) {
            Some(value) => {
                desired.insert(name.clone(), PlannedValue::Known(value.clone()));
            }
            None => {
                desired.remove(name);
            }
        }
    }
}

/// Check if two attribute sets agree on every configurable attribute
pub fn configurable_equal(schema: &Schema, prior: &Attributes, desired: &Attributes) -> bool {
    schema
        .configurable()
        .all(|(name, _)| normalized(prior.get(name)) == normalized(desired.get(name)))
}

fn normalized(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn computed_unknown(schema: &Schema, planned: &mut PlannedAttributes) {
    for (name, attr) in &schema.attributes {
        if attr.is_computed() {
            planned.insert(name.clone(), PlannedValue::Unknown);
        }
    }
}

/// Compute the change for a configured resource
///
/// `desired` must already have schema defaults applied.
pub fn diff_resource(
    address: &ResourceAddress,
    schema: &Schema,
    lifecycle: &Lifecycle,
    prior: Option<&ResourceInstance>,
    mut desired: PlannedAttributes,
) -> Result<ResourceChange> {
    let Some(prior) = prior else {
        let attributes = desired
            .iter()
            .map(|(name, value)| AttributeDiff {
                name: name.clone(),
                before: None,
                after: Some(value.clone()),
                forces_replacement: false,
            })
            .collect();
        computed_unknown(schema, &mut desired);
        return Ok(ResourceChange {
            address: address.clone(),
            action: Action::Create,
            before: None,
            after: Some(desired),
            attributes,
            replace_reason: None,
            lifecycle: lifecycle.clone(),
        });
    };

    apply_ignore_changes(lifecycle, &prior.attributes, &mut desired);

    let mut attributes = Vec::new();
    for (name, attr) in schema.configurable() {
        let before = normalized(prior.attributes.get(name));
        let after = desired.get(name);
        let changed = match after {
            Some(PlannedValue::Unknown) => true,
            Some(PlannedValue::Known(v)) => Some(v) != before && !(v.is_null() && before.is_none()),
            None => before.is_some(),
        };
        if changed {
            attributes.push(AttributeDiff {
                name: name.clone(),
                before: before.cloned(),
                after: after.cloned(),
                forces_replacement: attr.force_new,
            });
        }
    }

    let forced: Vec<String> = attributes
        .iter()
        .filter(|a| a.forces_replacement)
        .map(|a| a.name.clone())
        .collect();

    let (action, replace_reason) = if prior.tainted {
        (Action::Replace, Some(ReplaceReason::Tainted))
    } else if !forced.is_empty() {
        (Action::Replace, Some(ReplaceReason::ForcedBy(forced)))
    } else if !attributes.is_empty() {
        (Action::Update, None)
    } else {
        (Action::NoOp, None)
    };

    if action == Action::Replace && lifecycle.prevent_destroy {
        return Err(Error::PreventDestroy(address.clone()));
    }

    let after = if action == Action::NoOp {
        prior
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), PlannedValue::Known(v.clone())))
            .collect()
    } else {
        computed_unknown(schema, &mut desired);
        desired
    };

    Ok(ResourceChange {
        address: address.clone(),
        action,
        before: Some(prior.attributes.clone()),
        after: Some(after),
        attributes,
        replace_reason,
        lifecycle: lifecycle.clone(),
    })
}

/// Compute the change that removes a resource
///
/// `lifecycle` is the resource's configured lifecycle, if it is still
/// configured.
pub fn destroy_change(
    address: &ResourceAddress,
    prior: &ResourceInstance,
    lifecycle: Option<&Lifecycle>,
) -> Result<ResourceChange> {
    if lifecycle.is_some_and(|l| l.prevent_destroy) {
        return Err(Error::PreventDestroy(address.clone()));
    }
    Ok(ResourceChange {
        address: address.clone(),
        action: Action::Destroy,
        before: Some(prior.attributes.clone()),
        after: None,
        attributes: Vec::new(),
        replace_reason: None,
        lifecycle: lifecycle.cloned().unwrap_or_default(),
    })
}

/// Diff summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to add (replacements included)
    pub additions: usize,
    /// Number of resources to update in place
    pub changes: usize,
    /// Number of resources to destroy (replacements included)
    pub destructions: usize,
}

impl DiffSummary {
    /// Create a summary from a list of changes
    pub fn from_changes(changes: &[ResourceChange]) -> Self {
        let mut summary = Self::default();
        for change in changes {
            match change.action {
                Action::NoOp => {}
                Action::Create => summary.additions += 1,
                Action::Update => summary.changes += 1,
                Action::Destroy => summary.destructions += 1,
                Action::Replace => {
                    summary.additions += 1;
                    summary.destructions += 1;
                }
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.changes + self.destructions
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to destroy",
            self.additions, self.changes, self.destructions
        )
    }
}

/// Group changes by resource type
pub fn group_by_type(changes: &[ResourceChange]) -> HashMap<String, Vec<&ResourceChange>> {
    let mut groups: HashMap<String, Vec<&ResourceChange>> = HashMap::new();
    for change in changes {
        groups
            .entry(change.address.resource_type.clone())
            .or_default()
            .push(change);
    }
    groups
}
