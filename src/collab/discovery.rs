use std::path::PathBuf;

use anyhow::{Context, Result};

/// Resolves the test identifiers (`path::selector` or `path:selector`) of a repository.
pub trait TestDiscovery: Send + Sync {
    fn test_ids(&self, repo_name: &str) -> Result<Vec<String>>;
}

/// Reads `<dir>/<repo_name>.txt`, one test id per line.
#[derive(Debug, Clone)]
pub struct TestIdFiles {
    dir: PathBuf,
}

impl TestIdFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, repo_name: &str) -> PathBuf {
        self.dir.join(format!("{repo_name}.txt"))
    }
}

impl TestDiscovery for TestIdFiles {
    fn test_ids(&self, repo_name: &str) -> Result<Vec<String>> {
        let p = self.path_for(repo_name);
        let text = std::fs::read_to_string(&p)
            .with_context(|| format!("no test ids for {repo_name} at {}", p.display()))?;
        Ok(parse_test_ids(&text))
    }
}

pub fn parse_test_ids(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// The file part of a test id: everything before the first `:`.
pub fn test_file_of(test_id: &str) -> &str {
    test_id.split(':').next().unwrap_or(test_id).trim()
}

/// Sorted, de-duplicated test files for a set of ids.
pub fn unique_test_files(ids: &[String]) -> Vec<String> {
    let mut files: Vec<String> = ids
        .iter()
        .map(|id| test_file_of(id))
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    files.sort();
    files.dedup();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_file_of_strips_selectors() {
        assert_eq!(test_file_of("tests/test_a.py::TestX::test_y"), "tests/test_a.py");
        assert_eq!(test_file_of("tests/test_b.py:test_z"), "tests/test_b.py");
        assert_eq!(test_file_of("tests/test_c.py"), "tests/test_c.py");
    }

    #[test]
    fn test_unique_test_files_sorted_dedup() {
        let ids: Vec<String> = [
            "tests/test_b.py::t1",
            "tests/test_a.py::t1",
            "tests/test_b.py::t2",
            "tests/test_a.py::t2",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(
            unique_test_files(&ids),
            vec!["tests/test_a.py".to_string(), "tests/test_b.py".to_string()]
        );
    }

    #[test]
    fn test_test_id_files_reads_lines() {
        let td = tempfile::tempdir().expect("tmpdir");
        std::fs::write(
            td.path().join("simpy.txt"),
            "# generated\ntests/test_core.py::test_a\n\ntests/test_core.py::test_b\n",
        )
        .expect("write");
        let src = TestIdFiles::new(td.path());
        let ids = src.test_ids("simpy").expect("ids");
        assert_eq!(ids.len(), 2);
        assert!(src.test_ids("missing").is_err());
    }
}
