//! Attribute values and `${...}` interpolation
//!
//! Attribute values are plain JSON. Strings may embed references:
//!
//! - `${var.NAME}` - an input variable
//! - `${TYPE.NAME.ATTR}` - an attribute of another resource
//!
//! `$${` escapes a literal `${`. A string that is exactly one reference keeps
//! the referenced value's JSON type; anything else is spliced into a string.

use crate::address::{ResourceAddress, is_identifier};
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute set of a resource
pub type Attributes = BTreeMap<String, Value>;

/// A value during planning, which may only be known after apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedValue {
    Known(Value),
    Unknown,
}

impl PlannedValue {
    pub fn known(&self) -> Option<&Value> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for PlannedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(v) => write!(f, "{v}"),
            Self::Unknown => f.write_str("(known after apply)"),
        }
    }
}

/// Attribute set where individual values may be unknown
pub type PlannedAttributes = BTreeMap<String, PlannedValue>;

/// Convert planned attributes to concrete ones if every value is known
pub fn all_known(planned: &PlannedAttributes) -> Option<Attributes> {
    planned
        .iter()
        .map(|(k, v)| v.known().map(|v| (k.clone(), v.clone())))
        .collect()
}

/// Target of a `${...}` expression
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reference {
    Variable(String),
    Attribute {
        address: ResourceAddress,
        attribute: String,
    },
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "var.{name}"),
            Self::Attribute { address, attribute } => write!(f, "{address}.{attribute}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Expr(Reference),
}

fn invalid(location: &str, message: impl Into<String>) -> Error {
    Error::InvalidInterpolation {
        location: location.to_string(),
        message: message.into(),
    }
}

fn parse_reference(expr: &str, location: &str) -> Result<Reference> {
    let parts: Vec<&str> = expr.split('.').collect();
    if !parts.iter().all(|p| is_identifier(p)) {
        return Err(invalid(location, format!("\"{expr}\" is not a reference")));
    }
    match parts.as_slice() {
        ["var", name] => Ok(Reference::Variable((*name).to_string())),
        ["var", ..] => Err(invalid(
            location,
            format!("\"{expr}\": variables have no attributes"),
        )),
        [ty, name, attribute] => Ok(Reference::Attribute {
            address: ResourceAddress::new(*ty, *name),
            attribute: (*attribute).to_string(),
        }),
        _ => Err(invalid(
            location,
            format!("\"{expr}\": expected var.NAME or TYPE.NAME.ATTR"),
        )),
    }
}

fn parse_template(s: &str, location: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        literal.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("$${") {
            literal.push_str("${");
            rest = after;
        } else if let Some(after) = tail.strip_prefix("${") {
            let end = after
                .find('}')
                .ok_or_else(|| invalid(location, "unterminated \"${\""))?;
            let reference = parse_reference(after[..end].trim(), location)?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Expr(reference));
            rest = &after[end + 1..];
        } else {
            literal.push('$');
            rest = &tail[1..];
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Collect every reference inside a value, recursively
pub fn references(value: &Value, location: &str) -> Result<Vec<Reference>> {
    let mut out = Vec::new();
    collect_references(value, location, &mut out)?;
    Ok(out)
}

fn collect_references(value: &Value, location: &str, out: &mut Vec<Reference>) -> Result<()> {
    match value {
        Value::String(s) => {
            for segment in parse_template(s, location)? {
                if let Segment::Expr(r) = segment {
                    out.push(r);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, location, out)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_references(item, location, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Outcome of looking up a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Known(Value),
    Unknown,
    Missing,
}

/// Source of values for references during interpolation
pub trait Scope {
    fn lookup(&self, reference: &Reference) -> Lookup;
}

/// Resolve all references inside a value
pub fn interpolate(value: &Value, scope: &dyn Scope, location: &str) -> Result<PlannedValue> {
    match value {
        Value::String(s) => interpolate_string(s, scope, location),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match interpolate(item, scope, location)? {
                    PlannedValue::Known(v) => out.push(v),
                    PlannedValue::Unknown => return Ok(PlannedValue::Unknown),
                }
            }
            Ok(PlannedValue::Known(Value::Array(out)))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                match interpolate(item, scope, location)? {
                    PlannedValue::Known(v) => {
                        out.insert(key.clone(), v);
                    }
                    PlannedValue::Unknown => return Ok(PlannedValue::Unknown),
                }
            }
            Ok(PlannedValue::Known(Value::Object(out)))
        }
        other => Ok(PlannedValue::Known(other.clone())),
    }
}

fn resolve(reference: &Reference, scope: &dyn Scope, location: &str) -> Result<Option<Value>> {
    match scope.lookup(reference) {
        Lookup::Known(v) => Ok(Some(v)),
        Lookup::Unknown => Ok(None),
        Lookup::Missing => Err(Error::UnknownReference {
            location: location.to_string(),
            target: reference.to_string(),
        }),
    }
}

fn interpolate_string(s: &str, scope: &dyn Scope, location: &str) -> Result<PlannedValue> {
    let segments = parse_template(s, location)?;

    // A lone reference keeps its type
    if let [Segment::Expr(reference)] = segments.as_slice() {
        return Ok(match resolve(reference, scope, location)? {
            Some(v) => PlannedValue::Known(v),
            None => PlannedValue::Unknown,
        });
    }

    let mut out = String::new();
    let mut unknown = false;
    for segment in &segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Expr(reference) => match resolve(reference, scope, location)? {
                Some(v) => out.push_str(&render(&v)),
                None => unknown = true,
            },
        }
    }

    if unknown {
        Ok(PlannedValue::Unknown)
    } else {
        Ok(PlannedValue::Known(Value::String(out)))
    }
}

/// Render a value for splicing into a string
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert a TOML value into its JSON counterpart
pub fn from_toml(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(from_toml).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, from_toml(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapScope {
        values: HashMap<String, Lookup>,
    }

    impl MapScope {
        fn with(mut self, key: &str, lookup: Lookup) -> Self {
            self.values.insert(key.to_string(), lookup);
            self
        }
    }

    impl Scope for MapScope {
        fn lookup(&self, reference: &Reference) -> Lookup {
            self.values
                .get(&reference.to_string())
                .cloned()
                .unwrap_or(Lookup::Missing)
        }
    }

    #[test]
    fn test_references_found_in_nested_values() {
        let value = json!({
            "a": "${var.region}",
            "b": ["x", "prefix-${null_resource.seed.id}-suffix"],
        });
        let refs = references(&value, "t").unwrap();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&Reference::Variable("region".into())));
        assert!(refs.contains(&Reference::Attribute {
            address: ResourceAddress::new("null_resource", "seed"),
            attribute: "id".into(),
        }));
    }

    #[test]
    fn test_escaped_dollar_is_literal() {
        let scope = MapScope::default();
        let out = interpolate(&json!("cost: $5, tmpl: $${x}"), &scope, "t").unwrap();
        assert_eq!(out, PlannedValue::Known(json!("cost: $5, tmpl: ${x}")));
        assert!(references(&json!("$${var.x}"), "t").unwrap().is_empty());
    }

    #[test]
    fn test_lone_reference_keeps_type() {
        let scope = MapScope::default().with("var.count", Lookup::Known(json!(3)));
        let out = interpolate(&json!("${var.count}"), &scope, "t").unwrap();
        assert_eq!(out, PlannedValue::Known(json!(3)));
    }

    #[test]
    fn test_splice_renders_non_strings_as_json() {
        let scope = MapScope::default()
            .with("var.count", Lookup::Known(json!(3)))
            .with("var.name", Lookup::Known(json!("web")));
        let out = interpolate(&json!("${var.name}-${ var.count }"), &scope, "t").unwrap();
        assert_eq!(out, PlannedValue::Known(json!("web-3")));
    }

    #[test]
    fn test_unknown_propagates_through_containers() {
        let scope = MapScope::default().with("null_resource.a.id", Lookup::Unknown);
        let out = interpolate(&json!({"k": ["id=${null_resource.a.id}"]}), &scope, "t").unwrap();
        assert_eq!(out, PlannedValue::Unknown);
    }

    #[test]
    fn test_missing_reference_is_error() {
        let scope = MapScope::default();
        let err = interpolate(&json!("${var.nope}"), &scope, "local_file.a.content").unwrap_err();
        assert!(matches!(err, Error::UnknownReference { .. }));
    }

    #[test]
    fn test_malformed_expressions() {
        for bad in ["${var}", "${a.b}", "${var.x.y}", "${a.b.c.d}", "${", "${foo bar}"] {
            assert!(
                references(&json!(bad), "t").is_err(),
                "expected error for {bad}"
            );
        }
    }

    #[test]
    fn test_all_known() {
        let mut planned = PlannedAttributes::new();
        planned.insert("a".into(), PlannedValue::Known(json!(1)));
        assert_eq!(all_known(&planned).unwrap()["a"], json!(1));
        planned.insert("b".into(), PlannedValue::Unknown);
        assert!(all_known(&planned).is_none());
    }

    #[test]
    fn test_from_toml() {
        let table: toml::Table = toml::from_str("a = 1\nb = [true, \"x\"]\n[c]\nd = 1.5").unwrap();
        assert_eq!(
            from_toml(toml::Value::Table(table)),
            json!({"a": 1, "b": [true, "x"], "c": {"d": 1.5}})
        );
    }
}
