use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

const CLASSES_FILE: &str = "classes.json";

/// Find `classes.json` by walking up from `start` through ancestor directories.
fn find_upward(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CLASSES_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Resolve the class schema path: an explicit path must exist; otherwise
/// search from the current directory upward, then next to the executable.
pub fn resolve(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        bail!("class schema not found: {}", path.display());
    }
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    if let Some(found) = find_upward(&cwd) {
        debug!("using class schema {}", found.display());
        return Ok(found);
    }
    let exe = std::env::current_exe().context("failed to locate the executable")?;
    if let Some(candidate) = exe.parent().map(|dir| dir.join(CLASSES_FILE)) {
        if candidate.exists() {
            debug!("using class schema {}", candidate.display());
            return Ok(candidate);
        }
    }
    bail!("{CLASSES_FILE} not found; place it next to the scenepack executable or pass --classes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_schema_in_an_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLASSES_FILE), "{}").unwrap();
        let nested = dir.path().join("levels/act1");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_upward(&nested), Some(dir.path().join(CLASSES_FILE)));
    }

    #[test]
    fn explicit_path_must_exist() {
        assert!(resolve(Some(Path::new("/nonexistent/classes.json"))).is_err());
    }
}
