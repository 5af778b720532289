//! Built-in resource providers

mod local_file;
mod local_symlink;
mod null_resource;

use declarative::ProviderRegistry;
use local_file::LocalFile;
use local_symlink::LocalSymlink;
use null_resource::NullResource;

/// Registry with every built-in provider
pub fn builtin() -> ProviderRegistry {
    ProviderRegistry::new()
        .with(Box::new(NullResource))
        .with(Box::new(LocalFile))
        .with(Box::new(LocalSymlink))
}

/// Read a string attribute that the schema guarantees is present
fn required_str<'a>(attributes: &'a declarative::Attributes, name: &str) -> anyhow::Result<&'a str> {
    attributes
        .get(name)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("attribute \"{name}\" must be a string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = builtin();
        let types: Vec<_> = registry.resource_types().collect();
        assert_eq!(types, ["local_file", "local_symlink", "null_resource"]);
    }
}
