use crate::error::{ChainError, ChainResult};
use crate::info::InfoRecord;
use crate::store::{StepStore, COEF_FILE, INFO_FILE, INPUT_ARTIFACT};
use std::path::PathBuf;
use tracing::info;

/// Id of the most recently created step.
pub fn latest_step<S: StepStore + ?Sized>(store: &S) -> ChainResult<usize> {
    match store.count_steps()? {
        0 => Err(ChainError::EmptyChain(store.root().to_path_buf())),
        n => Ok(n - 1),
    }
}

pub fn read_info<S: StepStore + ?Sized>(store: &S, id: usize) -> ChainResult<InfoRecord> {
    let text = store.read_text(id, INFO_FILE)?.ok_or_else(|| {
        ChainError::MalformedRecord(format!(
            "'{}' is missing",
            store.step_dir(id).join(INFO_FILE).display()
        ))
    })?;
    InfoRecord::parse(&text)
}

/// Persist the record and the coefficient file derived from it.
pub fn write_info<S: StepStore + ?Sized>(
    store: &mut S,
    id: usize,
    record: &InfoRecord,
) -> ChainResult<()> {
    store.write_text(id, INFO_FILE, &record.serialize()?)?;
    store.write_text(id, COEF_FILE, &record.coefficients().render())
}

/// Open the next step after `prev`: the previous result becomes the new
/// input artifact and the circuit selector flips.
pub fn create_step<S: StepStore + ?Sized>(
    store: &mut S,
    prev: &InfoRecord,
) -> ChainResult<(usize, PathBuf, InfoRecord)> {
    let id = store.count_steps()?;
    let source = PathBuf::from(&prev.result);
    // Checked before mkdir so a missing artifact leaves no half-built step.
    if !store.has_artifact(&source) {
        return Err(ChainError::StepCreation {
            id,
            reason: format!("previous result '{}' does not exist", source.display()),
        });
    }

    let dir = store.create_step_dir(id)?;
    store.import_artifact(&source, id, INPUT_ARTIFACT)?;

    let result_name = source
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            ChainError::MalformedRecord(format!("Result '{}' has no file name", prev.result))
        })?;

    let record = InfoRecord {
        circuit: prev.circuit.flipped(),
        partition: prev.partition.clone(),
        result: dir.join(result_name).to_string_lossy().to_string(),
        budget: prev.budget,
        base_command: prev.base_command.clone(),
        extra: prev.extra.clone(),
    };
    write_info(store, id, &record)?;

    info!(
        step = id,
        circuit = record.circuit.as_str(),
        budget = record.budget,
        "created step directory {}",
        dir.display()
    );
    Ok((id, dir, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::Circuit;
    use crate::store::{MemoryStore, FINAL_ARTIFACT};

    fn seed(store: &mut MemoryStore) -> InfoRecord {
        let record = InfoRecord {
            circuit: Circuit::First,
            partition: "4".to_string(),
            result: "/runs/x/0/final.aig".to_string(),
            budget: 1500,
            base_command: "-g -G 5".to_string(),
            extra: Vec::new(),
        };
        store.create_step_dir(0).unwrap();
        write_info(store, 0, &record).unwrap();
        store.put_file(0, FINAL_ARTIFACT, b"seed".to_vec());
        record
    }

    #[test]
    fn create_step_flips_circuit_and_rebases_result() {
        let mut store = MemoryStore::new("/runs/x");
        let prev = seed(&mut store);

        let (id, dir, next) = create_step(&mut store, &prev).unwrap();
        assert_eq!(id, 1);
        assert_eq!(dir, PathBuf::from("/runs/x/1"));
        assert_eq!(next.circuit, Circuit::Second);
        assert_eq!(next.budget, 1500);
        assert_eq!(next.result, "/runs/x/1/final.aig");
        assert_eq!(store.file(1, INPUT_ARTIFACT), Some(&b"seed"[..]));
        assert_eq!(store.file(1, COEF_FILE), Some(&b"-7,2,4\n"[..]));
        assert_eq!(read_info(&store, 1).unwrap(), next);
    }

    #[test]
    fn create_step_without_artifact_fails_cleanly() {
        let mut store = MemoryStore::new("/runs/x");
        let mut prev = seed(&mut store);
        prev.result = "/runs/x/0/missing.aig".to_string();

        let err = create_step(&mut store, &prev).unwrap_err();
        assert!(matches!(err, ChainError::StepCreation { id: 1, .. }));
        assert_eq!(store.count_steps().unwrap(), 1);
    }

    #[test]
    fn latest_step_requires_seed() {
        let store = MemoryStore::new("/runs/empty");
        assert!(matches!(latest_step(&store), Err(ChainError::EmptyChain(_))));
    }
}
