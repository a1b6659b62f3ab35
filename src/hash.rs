//! Content fingerprinting for staleness detection.
//!
//! A fingerprint is a Sha256 digest over the sorted set of
//! (relative path, byte content) pairs of every YAML-family file under the
//! store root. Any byte or path change anywhere changes the digest; the
//! filesystem's iteration order does not.

use crate::error::FabulaError;
use sha2::{Digest, Sha256};
use std::{fs, path::Path};
use walkdir::WalkDir;

/// Extensions counted as document-store content.
const YAML_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            YAML_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Compute the deterministic fingerprint of the document store at `store_root`.
///
/// Pure function of filesystem state at call time. The caller must not mutate
/// the store during the walk. A file that disappears between enumeration and
/// read propagates as a hard error; a partial digest would be meaningless for
/// staleness comparison.
pub fn fingerprint(store_root: &Path) -> Result<String, FabulaError> {
    if !store_root.is_dir() {
        return Err(FabulaError::NotFound(format!(
            "document store root {store_root:?} does not exist"
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(store_root) {
        let entry = entry?;
        if entry.file_type().is_file() && is_yaml_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    // Canonical order: relative path components, independent of walk order.
    files.sort_by(|a, b| a.components().cmp(b.components()));

    let mut hasher = Sha256::new();
    for path in &files {
        let rel = path.strip_prefix(store_root)?;
        // Forward-slash join keeps the digest stable across platforms.
        let rel_str = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        hasher.update(rel_str.as_bytes());
        hasher.update([0u8]);
        hasher.update(fs::read(path)?);
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let temp = TempDir::new().unwrap();
        write(&temp, "a.yaml", "x");
        write(&temp, "sub/b.yaml", "y");
        let first = fingerprint(temp.path()).unwrap();
        let second = fingerprint(temp.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fingerprint_ignores_creation_order() {
        // Same logical content written in two different orders yields the
        // same digest, since paths are canonically sorted before hashing.
        let forward = TempDir::new().unwrap();
        write(&forward, "a.yaml", "x");
        write(&forward, "b.yaml", "y");

        let reverse = TempDir::new().unwrap();
        write(&reverse, "b.yaml", "y");
        write(&reverse, "a.yaml", "x");

        assert_eq!(
            fingerprint(forward.path()).unwrap(),
            fingerprint(reverse.path()).unwrap()
        );
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let temp = TempDir::new().unwrap();
        write(&temp, "a.yaml", "x");
        write(&temp, "b.yaml", "y");
        let before = fingerprint(temp.path()).unwrap();
        write(&temp, "a.yaml", "z");
        let after = fingerprint(temp.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn fingerprint_changes_with_relative_path() {
        let temp = TempDir::new().unwrap();
        write(&temp, "a.yaml", "x");
        let before = fingerprint(temp.path()).unwrap();
        std::fs::rename(temp.path().join("a.yaml"), temp.path().join("b.yaml")).unwrap();
        let after = fingerprint(temp.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn non_yaml_files_do_not_affect_fingerprint() {
        let temp = TempDir::new().unwrap();
        write(&temp, "a.yaml", "x");
        let before = fingerprint(temp.path()).unwrap();
        write(&temp, "index.db", "binary junk");
        write(&temp, "notes.txt", "scratch");
        let after = fingerprint(temp.path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        assert!(matches!(
            fingerprint(&missing),
            Err(FabulaError::NotFound(_))
        ));
    }
}
