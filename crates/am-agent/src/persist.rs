use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AgentError;

/// Classifier artifact file name inside the model directory.
pub const CLASSIFIER_FILE: &str = "classifier.bin";
/// Q-table artifact file name inside the model directory.
pub const Q_TABLE_FILE: &str = "q_table.bin";

fn io_err(path: &Path, source: std::io::Error) -> AgentError {
    AgentError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Écrit `value` de façon atomique : fichier temporaire dans le même
/// répertoire puis renommage. Un lecteur voit l'ancien ou le nouveau
/// contenu, jamais un fichier partiel.
///
/// # Errors
/// Returns [`AgentError::Io`] or [`AgentError::Codec`]; the previous file,
/// if any, is left untouched.
pub fn save_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), AgentError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_err(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        bincode::serialize_into(&mut writer, value).map_err(|e| AgentError::Codec {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        writer.flush().map_err(|e| io_err(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| io_err(path, e))?;
    tmp.persist(path).map_err(|e| io_err(path, e.error))?;
    Ok(())
}

/// Read a value written by [`save_atomic`].
///
/// # Errors
/// Returns [`AgentError::Io`] if the file is missing or unreadable and
/// [`AgentError::Codec`] if it does not decode.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, AgentError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|e| AgentError::Codec {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// [`load`], or `T::default()` with a warning on any failure.
///
/// A missing file is the normal first-run case and is logged at info.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match load(path) {
        Ok(value) => {
            log::info!("Chargé : {}", path.display());
            value
        }
        Err(AgentError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            log::info!("Aucun artefact {} : état vierge", path.display());
            T::default()
        }
        Err(e) => {
            log::warn!("{e} : état vierge");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn save_then_load_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("values.bin");
        let mut table = BTreeMap::new();
        table.insert(vec![1u16, 2], [0.1f64, -1.0 / 3.0, f64::MIN_POSITIVE]);
        save_atomic(&path, &table).unwrap();
        let back: BTreeMap<Vec<u16>, [f64; 3]> = load(&path).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        std::fs::write(&path, [0xff; 3]).unwrap();
        assert!(matches!(
            load::<Vec<String>>(&path),
            Err(AgentError::Codec { .. })
        ));
        let fallback: Vec<String> = load_or_default(&path);
        assert!(fallback.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load::<u32>(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, AgentError::Io { .. }));
    }

    #[test]
    fn failed_write_keeps_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.bin");
        save_atomic(&path, &7u32).unwrap();
        // A directory where the file should go: persist must fail.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::create_dir(blocked.join("x")).unwrap();
        assert!(save_atomic(&blocked.join("x"), &1u32).is_err());
        assert_eq!(load::<u32>(&path).unwrap(), 7);
    }
}
