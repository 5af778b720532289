//! `local_symlink` - a symbolic link on the local filesystem

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, AttributeSchema, Attributes, ResourceProvider, Schema, ValueType};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

use super::required_str;
use crate::paths;

#[derive(Debug)]
pub struct LocalSymlink;

/// Expanded (source, link path) of a symlink resource
fn expand_paths(attributes: &Attributes) -> Result<(PathBuf, PathBuf)> {
    let source = paths::expand(required_str(attributes, "source")?);
    let path = paths::expand(required_str(attributes, "path")?);
    Ok((source, path))
}

/// Create the symlink at `path` pointing to `source`
fn create_symlink(source: &Path, path: &Path) -> Result<()> {
    if !source.exists() {
        bail!("Source does not exist: {}", source.display());
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
    }

    if path.is_symlink() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove existing symlink: {}", path.display()))?;
    } else if path.exists() {
        bail!("Refusing to replace existing file at {}", path.display());
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(source, path).with_context(|| {
        format!(
            "Failed to create symlink: {} -> {}",
            path.display(),
            source.display()
        )
    })?;

    #[cfg(windows)]
    {
        use std::os::windows::fs::{symlink_dir, symlink_file};

        if source.is_dir() {
            // Junctions don't require admin privileges
            if let Err(e) = junction::create(source, path) {
                log::debug!("Junction creation failed ({}), trying symlink_dir", e);
                symlink_dir(source, path).with_context(|| {
                    format!(
                        "Failed to create directory symlink: {} -> {}",
                        path.display(),
                        source.display()
                    )
                })?;
            }
        } else {
            symlink_file(source, path).with_context(|| {
                format!(
                    "Failed to create file symlink: {} -> {}",
                    path.display(),
                    source.display()
                )
            })?;
        }
    }

    #[cfg(not(any(unix, windows)))]
    bail!("Symlinks not supported on this platform");

    Ok(())
}

impl ResourceProvider for LocalSymlink {
    fn resource_type(&self) -> &'static str {
        "local_symlink"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("source", AttributeSchema::required(ValueType::String).force_new())
            .attribute("path", AttributeSchema::required(ValueType::String).force_new())
            .attribute("id", AttributeSchema::computed(ValueType::String))
    }

    fn create(&self, ctx: &ApplyContext, desired: &Attributes) -> Result<Attributes> {
        let (source, path) = expand_paths(desired)?;
        create_symlink(&source, &path)?;
        if ctx.verbose {
            log::info!("{} linked {} -> {}", ctx.address, path.display(), source.display());
        }

        let mut attributes = desired.clone();
        attributes.insert("id".into(), json!(path.to_string_lossy()));
        Ok(attributes)
    }

    fn update(&self, ctx: &ApplyContext, _prior: &Attributes, desired: &Attributes) -> Result<Attributes> {
        // Both configurable attributes force replacement
        self.create(ctx, desired)
    }

    fn delete(&self, _ctx: &ApplyContext, prior: &Attributes) -> Result<()> {
        let (_, path) = expand_paths(prior)?;
        if path.is_symlink() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove symlink: {}", path.display()))?;
        } else {
            log::debug!("{} is not a symlink, nothing to remove", path.display());
        }
        Ok(())
    }

    fn read(&self, _ctx: &ApplyContext, prior: &Attributes) -> Result<Option<Attributes>> {
        let (source, path) = expand_paths(prior)?;
        if !path.is_symlink() {
            return Ok(None);
        }

        let actual = fs::read_link(&path).context("Failed to read symlink")?;
        let mut attributes = prior.clone();
        if actual != source {
            attributes.insert("source".into(), json!(actual.to_string_lossy()));
        }
        Ok(Some(attributes))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use declarative::ResourceAddress;

    fn attrs(source: &Path, path: &Path) -> Attributes {
        serde_json::from_value(json!({
            "source": source.to_str().unwrap(),
            "path": path.to_str().unwrap(),
        }))
        .unwrap()
    }

    #[test]
    fn test_create_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("real");
        fs::write(&source, "x").unwrap();
        let link = dir.path().join("links/alias");
        let address = ResourceAddress::new("local_symlink", "alias");
        let ctx = ApplyContext::new(&address, false);

        let created = LocalSymlink.create(&ctx, &attrs(&source, &link)).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), source);
        assert_eq!(created["id"], json!(link.to_str().unwrap()));
        assert_eq!(LocalSymlink.read(&ctx, &created).unwrap().as_ref(), Some(&created));

        LocalSymlink.delete(&ctx, &created).unwrap();
        assert!(!link.is_symlink());
        assert!(LocalSymlink.read(&ctx, &created).unwrap().is_none());
        assert!(source.exists());
    }

    #[test]
    fn test_read_reports_retargeted_link() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a");
        let other = dir.path().join("b");
        fs::write(&source, "a").unwrap();
        fs::write(&other, "b").unwrap();
        let link = dir.path().join("alias");
        let address = ResourceAddress::new("local_symlink", "alias");
        let ctx = ApplyContext::new(&address, false);

        let created = LocalSymlink.create(&ctx, &attrs(&source, &link)).unwrap();
        fs::remove_file(&link).unwrap();
        std::os::unix::fs::symlink(&other, &link).unwrap();

        let read = LocalSymlink.read(&ctx, &created).unwrap().unwrap();
        assert_eq!(read["source"], json!(other.to_str().unwrap()));
    }

    #[test]
    fn test_refuses_to_replace_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a");
        fs::write(&source, "a").unwrap();
        let link = dir.path().join("occupied");
        fs::write(&link, "keep me").unwrap();
        let address = ResourceAddress::new("local_symlink", "occupied");
        let ctx = ApplyContext::new(&address, false);

        let err = LocalSymlink.create(&ctx, &attrs(&source, &link)).unwrap_err();
        assert!(err.to_string().contains("Refusing to replace"));
        assert_eq!(fs::read_to_string(&link).unwrap(), "keep me");
    }
}
