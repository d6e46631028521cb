//! # Session Persistence
//!
//! Saves and loads the 88-key session document as pretty-printed JSON.
//! Loading never touches an in-memory piano: callers receive a fresh
//! [`Piano`] and decide whether to swap it in.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use log::info;

use crate::error::PersistenceError;
use crate::piano::Piano;

/// Serializes a piano session to a JSON file, creating parent directories.
pub fn save_session(piano: &Piano, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json_string = serde_json::to_string_pretty(piano)?;
    let mut file = File::create(path)?;
    file.write_all(json_string.as_bytes())?;
    info!("[SESSION] Saved session to {}", path.display());
    Ok(())
}

/// Loads a piano session from a JSON file.
///
/// A missing file is reported as [`PersistenceError::NotFound`].
pub fn load_session(path: impl AsRef<Path>) -> Result<Piano, PersistenceError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PersistenceError::NotFound(path.to_path_buf()),
        _ => PersistenceError::Io(e),
    })?;
    let mut data = String::new();
    file.read_to_string(&mut data)?;
    let piano = load_session_str(&data)?;
    info!("[SESSION] Loaded session from {}", path.display());
    Ok(piano)
}

/// Parses a session document held in memory.
pub fn load_session_str(json: &str) -> Result<Piano, PersistenceError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piano::Peak;
    use std::path::PathBuf;

    fn unique_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "tuner_core_persistence_{}_{}_{}.json",
            name,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        path
    }

    #[test]
    fn save_then_load_restores_session() {
        let mut piano = Piano::new();
        piano
            .record(48, 440.7, vec![Peak { frequency: 881.9, magnitude: 12.0 }])
            .unwrap();
        piano.key_mut(48).unwrap().computed_frequency = Some(440.0);
        let path = unique_path("roundtrip");
        save_session(&piano, &path).unwrap();
        let loaded = load_session(&path).unwrap();
        assert_eq!(loaded, piano);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_not_found() {
        let path = unique_path("missing");
        match load_session(&path) {
            Err(PersistenceError::NotFound(p)) => assert_eq!(p, path),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn structural_errors_are_rejected() {
        assert!(matches!(load_session_str(r#"{ "keys": [] }"#), Err(PersistenceError::Json(_))));
        assert!(matches!(load_session_str("not json"), Err(PersistenceError::Json(_))));
    }
}
