//! `terrace force-unlock`

use anyhow::Result;
use declarative::StateStore;

use super::store;
use crate::{Context, ui};

pub fn run(ctx: &Context, lock_id: &str) -> Result<()> {
    let store = store(ctx);
    store.force_unlock(lock_id)?;
    if !ctx.quiet {
        ui::success(&format!("Released lock {lock_id} on {}", store.path().display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use declarative::LocalStateStore;

    #[test]
    fn test_force_unlock_requires_matching_id() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "");
        let lock = LocalStateStore::new(&ctx.state_path).lock("apply").unwrap();
        let id = lock.info().id.clone();
        // Simulate a crashed process that never released its lock
        std::mem::forget(lock);

        assert!(run(&ctx, "wrong").is_err());
        run(&ctx, &id).unwrap();
        assert!(!dir.path().join("terrace.tfstate.lock").exists());
        assert!(run(&ctx, &id).is_err());
    }
}
