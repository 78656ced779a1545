//! The `rm` / `rm1` housekeeping modes.

use anyhow::Result;
use patchchain_core::store::StepStore;
use tracing::info;

const SEED_STEP: &str = "0";

/// Delete every step directory except the seed. Returns what was removed.
pub fn remove_all_but_seed<S: StepStore + ?Sized>(store: &mut S) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for name in store.step_names()? {
        if name == SEED_STEP {
            continue;
        }
        if store.remove_step(&name)? {
            info!("removed step {}", name);
            removed.push(name);
        }
    }
    Ok(removed)
}

/// Delete the most recently created step, named by the step count minus one.
pub fn remove_latest<S: StepStore + ?Sized>(store: &mut S) -> Result<Option<String>> {
    let count = store.count_steps()?;
    if count == 0 {
        return Ok(None);
    }
    let name = (count - 1).to_string();
    if store.remove_step(&name)? {
        info!("removed step {}", name);
        Ok(Some(name))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchchain_core::store::MemoryStore;

    fn chain(len: usize) -> MemoryStore {
        let mut store = MemoryStore::new("/runs/x");
        for id in 0..len {
            store.create_step_dir(id).unwrap();
        }
        store
    }

    #[test]
    fn rm_keeps_only_seed() {
        let mut store = chain(4);
        let removed = remove_all_but_seed(&mut store).unwrap();
        assert_eq!(removed, vec!["1", "2", "3"]);
        assert_eq!(store.step_names().unwrap(), vec!["0"]);
    }

    #[test]
    fn rm1_drops_newest_step() {
        let mut store = chain(3);
        assert_eq!(remove_latest(&mut store).unwrap().as_deref(), Some("2"));
        assert_eq!(store.step_names().unwrap(), vec!["0", "1"]);
        assert_eq!(remove_latest(&mut chain(0)).unwrap(), None);
    }
}
