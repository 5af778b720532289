//! Configuration loader
//!
//! Parses declarative TOML configuration into resources, variables and
//! outputs. A configuration directory holds any number of `*.tf.toml` files
//! that are merged into one [`Configuration`].
//!
//! ```toml
//! [variable.greeting]
//! default = "hello"
//!
//! [resource.local_file.motd]
//! filename = "/tmp/motd"
//! content = "${var.greeting}"
//! depends_on = ["null_resource.seed"]
//!
//! [resource.local_file.motd.lifecycle]
//! prevent_destroy = true
//!
//! [output.motd_path]
//! value = "${local_file.motd.filename}"
//! ```

use crate::address::{ResourceAddress, is_identifier};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::provider::ProviderRegistry;
use crate::value::{Attributes, Reference, from_toml, references};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// File suffix of configuration files inside a directory
pub const CONFIG_SUFFIX: &str = ".tf.toml";

/// Prefix of environment variables that assign input variables
pub const VAR_ENV_PREFIX: &str = "TERRACE_VAR_";

/// Lifecycle customizations for a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lifecycle {
    /// Refuse any plan that destroys this resource
    #[serde(default)]
    pub prevent_destroy: bool,
    /// On replacement, create the new object before deleting the old one
    #[serde(default)]
    pub create_before_destroy: bool,
    /// Attributes whose changes are ignored when diffing
    #[serde(default)]
    pub ignore_changes: Vec<String>,
}

/// A declared resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    pub address: ResourceAddress,
    /// Raw attribute values, possibly containing `${...}` references
    pub attributes: Attributes,
    /// Explicit `depends_on` entries
    pub depends_on: Vec<ResourceAddress>,
    pub lifecycle: Lifecycle,
    /// File this resource was declared in
    pub source: PathBuf,
}

impl ResourceConfig {
    /// Location string used in error messages, e.g. `local_file.motd.content`
    pub fn location(&self, attribute: &str) -> String {
        format!("{}.{attribute}", self.address)
    }

    /// All references made by the resource's attributes
    pub fn references(&self) -> Result<Vec<Reference>> {
        let mut out = Vec::new();
        for (name, value) in &self.attributes {
            out.extend(references(value, &self.location(name))?);
        }
        Ok(out)
    }

    /// Explicit and implicit dependencies
    pub fn dependencies(&self) -> Result<BTreeSet<ResourceAddress>> {
        let mut deps: BTreeSet<ResourceAddress> = self.depends_on.iter().cloned().collect();
        for reference in self.references()? {
            if let Reference::Attribute { address, .. } = reference {
                deps.insert(address);
            }
        }
        Ok(deps)
    }
}

/// A declared input variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableConfig {
    pub default: Option<Value>,
    pub description: Option<String>,
    pub source: PathBuf,
}

/// A declared output value
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub value: Value,
    pub sensitive: bool,
    pub description: Option<String>,
    pub source: PathBuf,
}

/// Merged configuration of one directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    pub variables: BTreeMap<String, VariableConfig>,
    pub resources: BTreeMap<ResourceAddress, ResourceConfig>,
    pub outputs: BTreeMap<String, OutputConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFile {
    #[serde(default)]
    variable: BTreeMap<String, RawVariable>,
    #[serde(default)]
    resource: BTreeMap<String, BTreeMap<String, toml::Table>>,
    #[serde(default)]
    output: BTreeMap<String, RawOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVariable {
    default: Option<toml::Value>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOutput {
    value: toml::Value,
    #[serde(default)]
    sensitive: bool,
    description: Option<String>,
}

impl Configuration {
    /// Load a configuration file, or every `*.tf.toml` file in a directory
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_file() {
            return Self::load_file(path);
        }

        let entries = fs::read_dir(path).map_err(|source| Error::File {
            path: path.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(CONFIG_SUFFIX))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::NoConfiguration(path.to_path_buf()));
        }

        let mut config = Self::default();
        for file in &files {
            config.merge(Self::load_file(file)?)?;
        }
        log::debug!(
            "Loaded {} resources from {} files in {}",
            config.resources.len(),
            files.len(),
            path.display()
        );
        Ok(config)
    }

    /// Load a single configuration file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse configuration text; `source` is used for error messages
    pub fn parse(content: &str, source: &Path) -> Result<Self> {
        let raw: RawFile = toml::from_str(content).map_err(|e| Error::Parse {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;
        let invalid = |message: String| Error::InvalidConfig {
            path: source.to_path_buf(),
            message,
        };

        let mut config = Self::default();

        for (name, var) in raw.variable {
            if !is_identifier(&name) {
                return Err(invalid(format!("invalid variable name \"{name}\"")));
            }
            config.variables.insert(
                name,
                VariableConfig {
                    default: var.default.map(from_toml),
                    description: var.description,
                    source: source.to_path_buf(),
                },
            );
        }

        for (resource_type, by_name) in raw.resource {
            for (name, table) in by_name {
                let address = ResourceAddress::new(&resource_type, &name);
                if !is_identifier(&resource_type) || !is_identifier(&name) {
                    return Err(invalid(format!("invalid resource address \"{address}\"")));
                }
                let resource = parse_resource(address.clone(), table, source)?;
                config.resources.insert(address, resource);
            }
        }

        for (name, output) in raw.output {
            if !is_identifier(&name) {
                return Err(invalid(format!("invalid output name \"{name}\"")));
            }
            let value = from_toml(output.value);
            references(&value, &format!("output.{name}"))?;
            config.outputs.insert(
                name,
                OutputConfig {
                    value,
                    sensitive: output.sensitive,
                    description: output.description,
                    source: source.to_path_buf(),
                },
            );
        }

        Ok(config)
    }

    /// Merge another file's definitions, rejecting duplicates
    pub fn merge(&mut self, other: Self) -> Result<()> {
        for (name, var) in other.variables {
            if let Some(existing) = self.variables.get(&name) {
                return Err(duplicate("variable", &name, &existing.source, &var.source));
            }
            self.variables.insert(name, var);
        }
        for (address, resource) in other.resources {
            if let Some(existing) = self.resources.get(&address) {
                return Err(duplicate(
                    "resource",
                    &address.to_string(),
                    &existing.source,
                    &resource.source,
                ));
            }
            self.resources.insert(address, resource);
        }
        for (name, output) in other.outputs {
            if let Some(existing) = self.outputs.get(&name) {
                return Err(duplicate("output", &name, &existing.source, &output.source));
            }
            self.outputs.insert(name, output);
        }
        Ok(())
    }

    pub fn resource(&self, address: &ResourceAddress) -> Option<&ResourceConfig> {
        self.resources.get(address)
    }

    /// Resolve input variable values
    ///
    /// Precedence, lowest first: declared default, `TERRACE_VAR_<name>`
    /// environment variables, explicit assignments.
    pub fn resolve_variables<I>(
        &self,
        env: I,
        assignments: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Value>>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        if let Some(name) = assignments.keys().find(|k| !self.variables.contains_key(*k)) {
            return Err(Error::UndeclaredVariable(name.clone()));
        }

        let env: BTreeMap<String, String> = env
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(VAR_ENV_PREFIX).map(|n| (n.to_string(), v)))
            .collect();

        let mut values = BTreeMap::new();
        for (name, var) in &self.variables {
            let assigned = assignments.get(name).or_else(|| env.get(name));
            let value = match (assigned, &var.default) {
                (Some(raw), default) => parse_assignment(raw, default.as_ref()),
                (None, Some(default)) => default.clone(),
                (None, None) => return Err(Error::MissingVariable(name.clone())),
            };
            values.insert(name.clone(), value);
        }
        Ok(values)
    }

    /// Check the configuration against provider schemas and the graph
    pub fn validate(&self, registry: &ProviderRegistry) -> Result<()> {
        for resource in self.resources.values() {
            let provider = registry.require(&resource.address)?;
            let schema = provider.schema();
            schema.validate(&resource.address, &resource.attributes, |v| {
                references(v, "").is_ok_and(|r| !r.is_empty())
            })?;
            provider
                .validate(&resource.attributes)
                .map_err(|e| Error::Schema {
                    address: resource.address.clone(),
                    message: format!("{e:#}"),
                })?;

            for attribute in &resource.lifecycle.ignore_changes {
                if schema.get(attribute).is_none() {
                    return Err(Error::Schema {
                        address: resource.address.clone(),
                        message: format!("ignore_changes names unknown attribute \"{attribute}\""),
                    });
                }
            }

            for dep in &resource.depends_on {
                if !self.resources.contains_key(dep) {
                    return Err(Error::UnknownReference {
                        location: format!("{}.depends_on", resource.address),
                        target: format!("resource {dep}"),
                    });
                }
            }

            for (name, value) in &resource.attributes {
                let location = resource.location(name);
                self.check_references(&references(value, &location)?, &location, registry)?;
            }
        }

        for (name, output) in &self.outputs {
            let location = format!("output.{name}");
            self.check_references(&references(&output.value, &location)?, &location, registry)?;
        }

        DependencyGraph::build(self)?;
        Ok(())
    }

    fn check_references(
        &self,
        refs: &[Reference],
        location: &str,
        registry: &ProviderRegistry,
    ) -> Result<()> {
        for reference in refs {
            let unknown = |target: String| Error::UnknownReference {
                location: location.to_string(),
                target,
            };
            match reference {
                Reference::Variable(name) => {
                    if !self.variables.contains_key(name) {
                        return Err(unknown(format!("variable \"{name}\"")));
                    }
                }
                Reference::Attribute { address, attribute } => {
                    if !self.resources.contains_key(address) {
                        return Err(unknown(format!("resource {address}")));
                    }
                    let known_attribute = registry
                        .get(&address.resource_type)
                        .is_none_or(|p| p.schema().get(attribute).is_some());
                    if !known_attribute {
                        return Err(unknown(format!("attribute {address}.{attribute}")));
                    }
                }
            }
        }
        Ok(())
    }
}

fn duplicate(kind: &'static str, name: &str, first: &Path, second: &Path) -> Error {
    Error::Duplicate {
        kind,
        name: name.to_string(),
        first: first.to_path_buf(),
        second: second.to_path_buf(),
    }
}

fn parse_resource(
    address: ResourceAddress,
    mut table: toml::Table,
    source: &Path,
) -> Result<ResourceConfig> {
    let invalid = |message: String| Error::InvalidConfig {
        path: source.to_path_buf(),
        message: format!("{address}: {message}"),
    };

    let depends_on = match table.remove("depends_on") {
        None => Vec::new(),
        Some(toml::Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                toml::Value::String(s) => s.parse::<ResourceAddress>(),
                other => Err(Error::InvalidAddress(other.to_string())),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(invalid("depends_on must be a list of addresses".into())),
    };

    let lifecycle = match table.remove("lifecycle") {
        None => Lifecycle::default(),
        Some(value) => value
            .try_into::<Lifecycle>()
            .map_err(|e| invalid(format!("invalid lifecycle block: {e}")))?,
    };

    let attributes = table
        .into_iter()
        .map(|(k, v)| (k, from_toml(v)))
        .collect();

    let resource = ResourceConfig {
        address,
        attributes,
        depends_on,
        lifecycle,
        source: source.to_path_buf(),
    };
    // Malformed interpolations fail at load time
    resource.references()?;
    Ok(resource)
}

/// Interpret an assigned string in light of the variable's default type
fn parse_assignment(raw: &str, default: Option<&Value>) -> Value {
    match default {
        Some(Value::String(_)) | None => Value::String(raw.to_string()),
        Some(_) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
[variable.greeting]
default = "hello"

[variable.out]

[resource.null_resource.seed]
triggers = { version = "1" }

[resource.local_file.motd]
filename = "${var.out}/motd"
content = "${var.greeting} ${null_resource.seed.id}"
depends_on = ["null_resource.other"]

[resource.local_file.motd.lifecycle]
prevent_destroy = true
ignore_changes = ["content"]

[resource.null_resource.other]

[output.path]
value = "${local_file.motd.filename}"
sensitive = true
"#;

    fn sample() -> Configuration {
        Configuration::parse(SAMPLE, Path::new("main.tf.toml")).unwrap()
    }

    #[test]
    fn test_parse_resources_and_meta_arguments() {
        let config = sample();
        assert_eq!(config.resources.len(), 3);

        let motd = config
            .resource(&ResourceAddress::new("local_file", "motd"))
            .unwrap();
        assert_eq!(motd.depends_on, vec![ResourceAddress::new("null_resource", "other")]);
        assert!(motd.lifecycle.prevent_destroy);
        assert_eq!(motd.lifecycle.ignore_changes, vec!["content".to_string()]);
        assert!(!motd.attributes.contains_key("depends_on"));
        assert!(!motd.attributes.contains_key("lifecycle"));
        assert_eq!(motd.attributes["filename"], json!("${var.out}/motd"));
    }

    #[test]
    fn test_dependencies_include_explicit_and_implicit() {
        let config = sample();
        let motd = config
            .resource(&ResourceAddress::new("local_file", "motd"))
            .unwrap();
        let deps: Vec<_> = motd.dependencies().unwrap().into_iter().collect();
        assert_eq!(
            deps,
            vec![
                ResourceAddress::new("null_resource", "other"),
                ResourceAddress::new("null_resource", "seed"),
            ]
        );
    }

    #[test]
    fn test_outputs_and_variables() {
        let config = sample();
        assert!(config.outputs["path"].sensitive);
        assert_eq!(config.variables["greeting"].default, Some(json!("hello")));
        assert_eq!(config.variables["out"].default, None);
    }

    #[test]
    fn test_resolve_variables_precedence() {
        let config = sample();
        let env = vec![
            ("TERRACE_VAR_greeting".to_string(), "hi".to_string()),
            ("TERRACE_VAR_out".to_string(), "/env".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        let mut assignments = BTreeMap::new();
        assignments.insert("out".to_string(), "/cli".to_string());

        let values = config.resolve_variables(env, &assignments).unwrap();
        assert_eq!(values["greeting"], json!("hi"));
        assert_eq!(values["out"], json!("/cli"));
    }

    #[test]
    fn test_resolve_variables_missing_and_undeclared() {
        let config = sample();
        let err = config
            .resolve_variables(Vec::new(), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::MissingVariable(ref n) if n == "out"));

        let mut assignments = BTreeMap::new();
        assignments.insert("nope".to_string(), "1".to_string());
        let err = config.resolve_variables(Vec::new(), &assignments).unwrap_err();
        assert!(matches!(err, Error::UndeclaredVariable(_)));
    }

    #[test]
    fn test_assignment_follows_default_type() {
        assert_eq!(parse_assignment("3", Some(&json!(1))), json!(3));
        assert_eq!(parse_assignment("3", Some(&json!("1"))), json!("3"));
        assert_eq!(parse_assignment("not json", Some(&json!(true))), json!("not json"));
    }

    #[test]
    fn test_parse_rejects_unknown_top_level_keys() {
        let err = Configuration::parse("[provider.aws]\nregion = 1", Path::new("x.tf.toml"))
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_parse_rejects_bad_depends_on() {
        let err = Configuration::parse(
            "[resource.null_resource.a]\ndepends_on = \"null_resource.b\"",
            Path::new("x.tf.toml"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_parse_rejects_malformed_interpolation() {
        let err = Configuration::parse(
            "[resource.null_resource.a]\ntriggers = { v = \"${var.x\" }\n",
            Path::new("x.tf.toml"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInterpolation { .. }));

        let err = Configuration::parse("[output.o]\nvalue = \"${nope}\"\n", Path::new("x.tf.toml"))
            .unwrap_err();
        match err {
            Error::InvalidInterpolation { location, .. } => assert_eq!(location, "output.o"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_directory_merges_and_detects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.tf.toml"), "[resource.null_resource.a]\n").unwrap();
        fs::write(dir.path().join("b.tf.toml"), "[resource.null_resource.b]\n").unwrap();
        fs::write(dir.path().join("notes.toml"), "[resource.null_resource.a]\n").unwrap();

        let config = Configuration::load(dir.path()).unwrap();
        assert_eq!(config.resources.len(), 2);

        fs::write(dir.path().join("c.tf.toml"), "[resource.null_resource.a]\n").unwrap();
        let err = Configuration::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Duplicate { kind: "resource", .. }));
    }

    #[test]
    fn test_load_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = Configuration::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NoConfiguration(_)));
    }
}
