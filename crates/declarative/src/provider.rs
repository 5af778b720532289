//! Resource provider trait and schemas
//!
//! A provider knows how to create, read, update and delete every resource of
//! one type. The engine never touches infrastructure itself: it computes what
//! should change and hands the attribute sets to the provider.

use crate::address::ResourceAddress;
use crate::context::ApplyContext;
use crate::error::{Error, Result};
use crate::value::{Attributes, PlannedAttributes, PlannedValue};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// How an attribute is supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Must be set in configuration
    Required,
    /// May be set in configuration
    Optional,
    /// Set by the provider after apply, never in configuration
    Computed,
}

/// Expected JSON type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Bool,
    List,
    Map,
    Any,
}

impl ValueType {
    /// Check if a concrete value has this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Map => value.is_object(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Map => "map",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// Schema entry for one attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSchema {
    pub kind: AttributeKind,
    pub value_type: ValueType,
    /// Changing this attribute requires destroying and recreating the resource
    pub force_new: bool,
    /// Value used when an optional attribute is not configured
    pub default: Option<Value>,
}

impl AttributeSchema {
    pub fn required(value_type: ValueType) -> Self {
        Self {
            kind: AttributeKind::Required,
            value_type,
            force_new: false,
            default: None,
        }
    }

    pub fn optional(value_type: ValueType) -> Self {
        Self {
            kind: AttributeKind::Optional,
            value_type,
            force_new: false,
            default: None,
        }
    }

    pub fn computed(value_type: ValueType) -> Self {
        Self {
            kind: AttributeKind::Computed,
            value_type,
            force_new: false,
            default: None,
        }
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_computed(&self) -> bool {
        self.kind == AttributeKind::Computed
    }
}

/// Attribute schema of a resource type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub attributes: BTreeMap<String, AttributeSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, name: &str, schema: AttributeSchema) -> Self {
        self.attributes.insert(name.to_string(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Names of attributes that come from configuration
    pub fn configurable(&self) -> impl Iterator<Item = (&String, &AttributeSchema)> {
        self.attributes.iter().filter(|(_, a)| !a.is_computed())
    }

    /// Check raw configured attributes against the schema
    ///
    /// Values that still contain references are only type-checked once they
    /// are resolved.
    pub fn validate(
        &self,
        address: &ResourceAddress,
        attributes: &Attributes,
        has_references: impl Fn(&Value) -> bool,
    ) -> Result<()> {
        let err = |message: String| Error::Schema {
            address: address.clone(),
            message,
        };

        for (name, value) in attributes {
            let Some(schema) = self.get(name) else {
                return Err(err(format!("unsupported attribute \"{name}\"")));
            };
            if schema.is_computed() {
                return Err(err(format!(
                    "attribute \"{name}\" is computed and cannot be set"
                )));
            }
            if !has_references(value) && !schema.value_type.accepts(value) {
                return Err(err(format!(
                    "attribute \"{name}\" must be a {}",
                    schema.value_type
                )));
            }
        }

        for (name, schema) in &self.attributes {
            if schema.kind == AttributeKind::Required && !attributes.contains_key(name) {
                return Err(err(format!("missing required attribute \"{name}\"")));
            }
        }
        Ok(())
    }

    /// Check resolved attribute values against the declared types
    pub fn check_types(&self, address: &ResourceAddress, planned: &PlannedAttributes) -> Result<()> {
        for (name, value) in planned {
            if let (Some(schema), PlannedValue::Known(v)) = (self.get(name), value)
                && !schema.value_type.accepts(v)
            {
                return Err(Error::Schema {
                    address: address.clone(),
                    message: format!("attribute \"{name}\" must be a {}", schema.value_type),
                });
            }
        }
        Ok(())
    }

    /// Fill in defaults for optional attributes that were not configured
    pub fn apply_defaults(&self, planned: &mut PlannedAttributes) {
        for (name, schema) in self.configurable() {
            if let Some(default) = &schema.default {
                planned
                    .entry(name.clone())
                    .or_insert_with(|| PlannedValue::Known(default.clone()));
            }
        }
    }
}

/// Lifecycle operations for one resource type
///
/// # Example
///
/// ```ignore
/// use declarative::{ApplyContext, Attributes, ResourceProvider, Schema};
///
/// #[derive(Debug)]
/// struct Echo;
///
/// impl ResourceProvider for Echo {
///     fn resource_type(&self) -> &'static str { "echo" }
///     fn schema(&self) -> Schema { Schema::new() }
///     fn create(&self, _: &ApplyContext, desired: &Attributes) -> anyhow::Result<Attributes> {
///         Ok(desired.clone())
///     }
///     fn update(&self, _: &ApplyContext, _: &Attributes, desired: &Attributes) -> anyhow::Result<Attributes> {
///         Ok(desired.clone())
///     }
///     fn delete(&self, _: &ApplyContext, _: &Attributes) -> anyhow::Result<()> { Ok(()) }
/// }
/// ```
pub trait ResourceProvider: Send + Sync + fmt::Debug {
    /// Resource type handled by this provider, e.g. "local_file"
    fn resource_type(&self) -> &'static str;

    /// Attribute schema for the resource type
    fn schema(&self) -> Schema;

    /// Create the object and return its full attribute set, computed
    /// attributes included
    fn create(&self, ctx: &ApplyContext, desired: &Attributes) -> anyhow::Result<Attributes>;

    /// Update the object in place
    fn update(
        &self,
        ctx: &ApplyContext,
        prior: &Attributes,
        desired: &Attributes,
    ) -> anyhow::Result<Attributes>;

    /// Delete the object
    fn delete(&self, ctx: &ApplyContext, prior: &Attributes) -> anyhow::Result<()>;

    /// Check provider-specific constraints on attributes as written in the
    /// configuration, before interpolation
    fn validate(&self, _attributes: &Attributes) -> anyhow::Result<()> {
        Ok(())
    }

    /// Observe the real object
    ///
    /// Returns `None` if the object no longer exists. The default trusts the
    /// recorded attributes.
    fn read(&self, _ctx: &ApplyContext, prior: &Attributes) -> anyhow::Result<Option<Attributes>> {
        Ok(Some(prior.clone()))
    }
}

/// A boxed provider for type-erased storage
pub type BoxedProvider = Box<dyn ResourceProvider>;

/// Providers keyed by resource type
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, BoxedProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one for the same type
    pub fn register(&mut self, provider: BoxedProvider) {
        log::debug!("Registering provider for {}", provider.resource_type());
        self.providers.insert(provider.resource_type(), provider);
    }

    pub fn with(mut self, provider: BoxedProvider) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, resource_type: &str) -> Option<&dyn ResourceProvider> {
        self.providers.get(resource_type).map(AsRef::as_ref)
    }

    /// Look up the provider for an address, or fail with `UnknownResourceType`
    pub fn require(&self, address: &ResourceAddress) -> Result<&dyn ResourceProvider> {
        self.get(&address.resource_type)
            .ok_or_else(|| Error::UnknownResourceType {
                address: address.clone(),
                resource_type: address.resource_type.clone(),
            })
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .attribute("filename", AttributeSchema::required(ValueType::String).force_new())
            .attribute(
                "mode",
                AttributeSchema::optional(ValueType::String).with_default(json!("0644")),
            )
            .attribute("id", AttributeSchema::computed(ValueType::String))
    }

    fn attrs(value: Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    fn no_refs(_: &Value) -> bool {
        false
    }

    #[test]
    fn test_validate_accepts_valid_attributes() {
        let addr = ResourceAddress::new("local_file", "a");
        schema()
            .validate(&addr, &attrs(json!({"filename": "/tmp/a"})), no_refs)
            .unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_required() {
        let addr = ResourceAddress::new("local_file", "a");
        let err = schema().validate(&addr, &Attributes::new(), no_refs).unwrap_err();
        assert!(err.to_string().contains("missing required attribute \"filename\""));
    }

    #[test]
    fn test_validate_rejects_unknown_and_computed() {
        let addr = ResourceAddress::new("local_file", "a");
        let err = schema()
            .validate(&addr, &attrs(json!({"filename": "x", "colour": "red"})), no_refs)
            .unwrap_err();
        assert!(err.to_string().contains("unsupported attribute \"colour\""));

        let err = schema()
            .validate(&addr, &attrs(json!({"filename": "x", "id": "abc"})), no_refs)
            .unwrap_err();
        assert!(err.to_string().contains("computed"));
    }

    #[test]
    fn test_validate_type_mismatch_skipped_for_references() {
        let addr = ResourceAddress::new("local_file", "a");
        let bad = attrs(json!({"filename": 42}));
        assert!(schema().validate(&addr, &bad, no_refs).is_err());
        assert!(schema().validate(&addr, &bad, |_| true).is_ok());
    }

    #[test]
    fn test_apply_defaults() {
        let mut planned = PlannedAttributes::new();
        planned.insert("filename".into(), PlannedValue::Known(json!("/tmp/a")));
        schema().apply_defaults(&mut planned);
        assert_eq!(planned["mode"], PlannedValue::Known(json!("0644")));
        assert!(!planned.contains_key("id"));
    }

    #[test]
    fn test_registry_require_unknown_type() {
        let registry = ProviderRegistry::new();
        let err = registry
            .require(&ResourceAddress::new("aws_instance", "web"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResourceType { .. }));
    }
}
