//! `null_resource` - no real object, only an id and replacement triggers

use anyhow::Result;
use declarative::{ApplyContext, AttributeSchema, Attributes, ResourceProvider, Schema, ValueType};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct NullResource;

/// Fresh decimal id, unique within the process and across runs
fn new_id() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let hash = blake3::hash(format!("{nanos}:{seq}:{}", std::process::id()).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(bytes) >> 1).to_string()
}

impl ResourceProvider for NullResource {
    fn resource_type(&self) -> &'static str {
        "null_resource"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("triggers", AttributeSchema::optional(ValueType::Map).force_new())
            .attribute("id", AttributeSchema::computed(ValueType::String))
    }

    fn create(&self, ctx: &ApplyContext, desired: &Attributes) -> Result<Attributes> {
        let mut attributes = desired.clone();
        let id = new_id();
        if ctx.verbose {
            log::info!("{} created with id {id}", ctx.address);
        }
        attributes.insert("id".into(), json!(id));
        Ok(attributes)
    }

    fn update(&self, _ctx: &ApplyContext, prior: &Attributes, desired: &Attributes) -> Result<Attributes> {
        let mut attributes = desired.clone();
        if let Some(id) = prior.get("id") {
            attributes.insert("id".into(), id.clone());
        }
        Ok(attributes)
    }

    fn delete(&self, _ctx: &ApplyContext, _prior: &Attributes) -> Result<()> {
        Ok(())
    }
}
