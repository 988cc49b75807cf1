//! File system helpers used when locating install artifacts.

use std::path::{Path, PathBuf};

/// Return the first `dir/name` that exists as a regular file.
pub fn first_existing_file(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Deduplicate directories while keeping their first-seen order.
pub fn unique_dirs<I>(dirs: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        if !seen.contains(&dir) {
            seen.push(dir);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_existing_file_respects_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.yml"), "").unwrap();
        std::fs::write(dir.path().join("c.yml"), "").unwrap();

        let found = first_existing_file(dir.path(), &["a.yml", "b.yml", "c.yml"]);
        assert_eq!(found, Some(dir.path().join("b.yml")));
    }

    #[test]
    fn test_first_existing_file_ignores_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("a.yml")).unwrap();
        assert_eq!(first_existing_file(dir.path(), &["a.yml"]), None);
    }

    #[test]
    fn test_unique_dirs_keeps_first_occurrence() {
        let dirs = unique_dirs(vec![
            PathBuf::from("/opt/stack"),
            PathBuf::from("/opt"),
            PathBuf::from("/opt/stack"),
        ]);
        assert_eq!(dirs, vec![PathBuf::from("/opt/stack"), PathBuf::from("/opt")]);
    }
}
