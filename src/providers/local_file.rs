//! `local_file` - a file on the local filesystem with managed content

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, AttributeSchema, Attributes, ResourceProvider, Schema, ValueType};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

use super::required_str;
use crate::paths;

const DEFAULT_PERMISSION: &str = "0644";

#[derive(Debug)]
pub struct LocalFile;

fn content_id(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

fn parse_permission(permission: &str) -> Result<u32> {
    u32::from_str_radix(permission, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .with_context(|| format!("invalid file_permission \"{permission}\": expected octal like 0644"))
}

/// Canonical four-digit octal form, as `read` reports it
fn normalize_permission(permission: &str) -> Result<String> {
    Ok(format!("{:04o}", parse_permission(permission)?))
}

#[cfg(unix)]
fn set_permission(path: &Path, permission: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = parse_permission(permission)?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_permission(_path: &Path, permission: &str) -> Result<()> {
    parse_permission(permission).map(|_| ())
}

#[cfg(unix)]
fn read_permission(path: &Path) -> Result<Option<String>> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)?.permissions().mode() & 0o7777;
    Ok(Some(format!("{mode:04o}")))
}

#[cfg(not(unix))]
fn read_permission(_path: &Path) -> Result<Option<String>> {
    Ok(None)
}

impl LocalFile {
    fn write(&self, ctx: &ApplyContext, desired: &Attributes) -> Result<Attributes> {
        let filename = required_str(desired, "filename")?;
        let content = required_str(desired, "content")?;
        let permission = normalize_permission(
            desired
                .get("file_permission")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(DEFAULT_PERMISSION),
        )?;
        let path = paths::expand(filename);

        if path.is_dir() {
            bail!("{} is a directory", path.display());
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        set_permission(&path, &permission)?;

        if ctx.verbose {
            log::info!("{} wrote {} bytes to {}", ctx.address, content.len(), path.display());
        }

        let mut attributes = desired.clone();
        attributes.insert("file_permission".into(), json!(permission));
        attributes.insert("id".into(), json!(content_id(content)));
        Ok(attributes)
    }
}

impl ResourceProvider for LocalFile {
    fn resource_type(&self) -> &'static str {
        "local_file"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("filename", AttributeSchema::required(ValueType::String).force_new())
            .attribute("content", AttributeSchema::required(ValueType::String))
            .attribute(
                "file_permission",
                AttributeSchema::optional(ValueType::String).with_default(json!(DEFAULT_PERMISSION)),
            )
            .attribute("id", AttributeSchema::computed(ValueType::String))
    }

    fn create(&self, ctx: &ApplyContext, desired: &Attributes) -> Result<Attributes> {
        self.write(ctx, desired)
    }

    fn update(&self, ctx: &ApplyContext, _prior: &Attributes, desired: &Attributes) -> Result<Attributes> {
        self.write(ctx, desired)
    }

    fn delete(&self, _ctx: &ApplyContext, prior: &Attributes) -> Result<()> {
        let path = paths::expand(required_str(prior, "filename")?);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("{} was already removed", path.display());
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    fn validate(&self, attributes: &Attributes) -> Result<()> {
        if let Some(permission) = attributes.get("file_permission").and_then(Value::as_str)
            && !permission.contains("${")
        {
            let normalized = normalize_permission(permission)?;
            if normalized != permission {
                bail!("file_permission \"{permission}\" must be four octal digits, e.g. \"{normalized}\"");
            }
        }
        Ok(())
    }

    fn read(&self, _ctx: &ApplyContext, prior: &Attributes) -> Result<Option<Attributes>> {
        let path = paths::expand(required_str(prior, "filename")?);
        if !path.is_file() {
            return Ok(None);
        }

        let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        let mut attributes = prior.clone();
        attributes.insert("id".into(), json!(content_id(&content)));
        attributes.insert("content".into(), json!(content));
        if let Some(permission) = read_permission(&path)? {
            attributes.insert("file_permission".into(), json!(permission));
        }
        Ok(Some(attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ResourceAddress;

    fn attrs(value: serde_json::Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_create_writes_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/motd");
        let address = ResourceAddress::new("local_file", "motd");
        let ctx = ApplyContext::new(&address, false);

        let created = LocalFile
            .create(
                &ctx,
                &attrs(json!({"filename": path.to_str().unwrap(), "content": "hello\n"})),
            )
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        assert_eq!(created["id"], json!(content_id("hello\n")));
        assert_eq!(created["file_permission"], json!("0644"));
    }

    #[test]
    fn test_read_detects_drift_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motd");
        let address = ResourceAddress::new("local_file", "motd");
        let ctx = ApplyContext::new(&address, false);
        let created = LocalFile
            .create(&ctx, &attrs(json!({"filename": path.to_str().unwrap(), "content": "a"})))
            .unwrap();

        assert_eq!(LocalFile.read(&ctx, &created).unwrap().as_ref(), Some(&created));

        fs::write(&path, "b").unwrap();
        let drifted = LocalFile.read(&ctx, &created).unwrap().unwrap();
        assert_eq!(drifted["content"], json!("b"));

        LocalFile.delete(&ctx, &created).unwrap();
        assert!(LocalFile.read(&ctx, &created).unwrap().is_none());
        LocalFile.delete(&ctx, &created).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.sh");
        let address = ResourceAddress::new("local_file", "script");
        let ctx = ApplyContext::new(&address, false);
        LocalFile
            .create(
                &ctx,
                &attrs(json!({
                    "filename": path.to_str().unwrap(),
                    "content": "#!/bin/sh\n",
                    "file_permission": "0755",
                })),
            )
            .unwrap();
        assert_eq!(read_permission(&path).unwrap(), Some("0755".to_string()));
    }

    #[test]
    fn test_short_permission_is_stored_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motd");
        let address = ResourceAddress::new("local_file", "motd");
        let ctx = ApplyContext::new(&address, false);

        let created = LocalFile
            .create(
                &ctx,
                &attrs(json!({
                    "filename": path.to_str().unwrap(),
                    "content": "a",
                    "file_permission": "600",
                })),
            )
            .unwrap();

        assert_eq!(created["file_permission"], json!("0600"));
        if cfg!(unix) {
            assert_eq!(LocalFile.read(&ctx, &created).unwrap().as_ref(), Some(&created));
        }
    }

    #[test]
    fn test_validate_requires_canonical_permission() {
        let err = LocalFile
            .validate(&attrs(json!({"filename": "/tmp/x", "content": "", "file_permission": "644"})))
            .unwrap_err();
        assert!(err.to_string().contains("\"0644\""));

        LocalFile
            .validate(&attrs(json!({"filename": "/tmp/x", "content": "", "file_permission": "0755"})))
            .unwrap();
        LocalFile
            .validate(&attrs(json!({"file_permission": "${var.mode}"})))
            .unwrap();
        assert!(LocalFile.validate(&attrs(json!({"file_permission": "rw"}))).is_err());
    }

    #[test]
    fn test_invalid_permission() {
        assert!(parse_permission("rwx").is_err());
        assert!(parse_permission("99999").is_err());
        assert_eq!(parse_permission("0600").unwrap(), 0o600);
    }
}
