//! In-memory provider used by engine tests

use crate::context::ApplyContext;
use crate::provider::{AttributeSchema, ProviderRegistry, ResourceProvider, Schema, ValueType};
use crate::value::Attributes;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<String>,
    forgotten: BTreeSet<String>,
    failing: BTreeSet<String>,
    next_id: usize,
    active: usize,
    max_active: usize,
}

/// Provider with a `value` attribute and a computed `id`
///
/// Clones share the same recorder so tests can inspect calls after the
/// provider was moved into a registry.
#[derive(Debug, Clone)]
pub struct MockProvider {
    resource_type: &'static str,
    delay: Duration,
    recorder: Arc<Mutex<Recorder>>,
}

impl MockProvider {
    pub fn new(resource_type: &'static str) -> Self {
        Self {
            resource_type,
            delay: Duration::ZERO,
            recorder: Arc::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Pretend the object with this id was deleted out of band
    pub fn forget(&self, id: &str) {
        self.recorder.lock().unwrap().forgotten.insert(id.to_string());
    }

    /// Fail any create or update whose `value` equals this
    pub fn fail_on(&self, value: &str) {
        self.recorder.lock().unwrap().failing.insert(value.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.recorder.lock().unwrap().calls.clone()
    }

    pub fn max_active(&self) -> usize {
        self.recorder.lock().unwrap().max_active
    }

    fn enter(&self, call: String, desired: Option<&Attributes>) -> anyhow::Result<()> {
        let mut rec = self.recorder.lock().unwrap();
        rec.calls.push(call);
        if let Some(value) = desired.and_then(|d| d.get("value")).and_then(Value::as_str)
            && rec.failing.contains(value)
        {
            anyhow::bail!("injected failure for {value}");
        }
        rec.active += 1;
        rec.max_active = rec.max_active.max(rec.active);
        drop(rec);
        std::thread::sleep(self.delay);
        self.recorder.lock().unwrap().active -= 1;
        Ok(())
    }
}

impl ResourceProvider for MockProvider {
    fn resource_type(&self) -> &'static str {
        self.resource_type
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("value", AttributeSchema::optional(ValueType::String))
            .attribute("id", AttributeSchema::computed(ValueType::String))
    }

    fn create(&self, ctx: &ApplyContext, desired: &Attributes) -> anyhow::Result<Attributes> {
        self.enter(format!("create {}", ctx.address), Some(desired))?;
        let id = {
            let mut rec = self.recorder.lock().unwrap();
            rec.next_id += 1;
            format!("id-{}", rec.next_id)
        };
        let mut attrs = desired.clone();
        attrs.insert("id".into(), json!(id));
        Ok(attrs)
    }

    fn update(
        &self,
        ctx: &ApplyContext,
        prior: &Attributes,
        desired: &Attributes,
    ) -> anyhow::Result<Attributes> {
        self.enter(format!("update {}", ctx.address), Some(desired))?;
        let mut attrs = desired.clone();
        if let Some(id) = prior.get("id") {
            attrs.insert("id".into(), id.clone());
        }
        Ok(attrs)
    }

    fn delete(&self, ctx: &ApplyContext, _prior: &Attributes) -> anyhow::Result<()> {
        self.enter(format!("delete {}", ctx.address), None)
    }

    fn read(&self, _ctx: &ApplyContext, prior: &Attributes) -> anyhow::Result<Option<Attributes>> {
        let rec = self.recorder.lock().unwrap();
        let gone = prior
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| rec.forgotten.contains(id));
        Ok(if gone { None } else { Some(prior.clone()) })
    }
}

pub fn registry(provider: MockProvider) -> ProviderRegistry {
    ProviderRegistry::new().with(Box::new(provider))
}
