//! Directory layout of one branch inside the shared store.

/// Name of the archive directory under a branch root.
pub const ARCHIVE_DIR: &str = "archive";
/// Quarantine for source files whose submission failed.
pub const QUARANTINE_DIR: &str = "failed";
/// Files that exhausted their retry budget.
pub const DEAD_LETTER_DIR: &str = "dead-letter";
pub const LOGS_DIR: &str = "logs";
pub const VOID_LOGS_DIR: &str = "void";
pub const BLOCKED_LOGS_DIR: &str = "blocked";
pub const FAILED_LOGS_DIR: &str = "failed";
/// Holding area for failure logs already recycled by the retry job.
pub const TO_BE_DELETED_DIR: &str = "To be deleted";

/// Joins a store directory and an entry name with a single `/`.
pub fn join(dir: &str, name: &str) -> String {
    format!(
        "{}/{}",
        dir.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}

/// Last path segment of a `/`-separated store path.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Paths derived from a branch root. Never persisted; always recomputed from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPaths {
    root: String,
}

impl BranchPaths {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let trimmed = root.trim_end_matches('/');
        let root = if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        Self { root }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Directory name of the branch, used for allow-list matching.
    pub fn name(&self) -> &str {
        file_name(&self.root)
    }

    pub fn archive(&self) -> String {
        join(&self.root, ARCHIVE_DIR)
    }

    pub fn quarantine(&self) -> String {
        join(&self.archive(), QUARANTINE_DIR)
    }

    pub fn dead_letter(&self) -> String {
        join(&self.archive(), DEAD_LETTER_DIR)
    }

    pub fn logs(&self) -> String {
        join(&self.root, LOGS_DIR)
    }

    pub fn void_logs(&self) -> String {
        join(&self.logs(), VOID_LOGS_DIR)
    }

    pub fn blocked_logs(&self) -> String {
        join(&self.logs(), BLOCKED_LOGS_DIR)
    }

    pub fn failed_logs(&self) -> String {
        join(&self.logs(), FAILED_LOGS_DIR)
    }

    pub fn to_be_deleted(&self) -> String {
        join(&self.failed_logs(), TO_BE_DELETED_DIR)
    }

    /// Directories the scanner needs before it touches any file, parents first.
    pub fn scanner_dirs(&self) -> Vec<String> {
        vec![
            self.archive(),
            self.quarantine(),
            self.logs(),
            self.blocked_logs(),
            self.void_logs(),
            self.failed_logs(),
        ]
    }

    pub fn archived_file(&self, name: &str) -> String {
        join(&self.archive(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_derived_from_root() {
        let branch = BranchPaths::new("/sftp/branches/B001/");
        assert_eq!(branch.root(), "/sftp/branches/B001");
        assert_eq!(branch.name(), "B001");
        assert_eq!(branch.quarantine(), "/sftp/branches/B001/archive/failed");
        assert_eq!(branch.void_logs(), "/sftp/branches/B001/logs/void");
        assert_eq!(
            branch.to_be_deleted(),
            "/sftp/branches/B001/logs/failed/To be deleted"
        );
        assert_eq!(
            branch.archived_file("a.json"),
            "/sftp/branches/B001/archive/a.json"
        );
    }

    #[test]
    fn test_scanner_dirs_list_parents_first() {
        let dirs = BranchPaths::new("/b").scanner_dirs();
        let archive = dirs.iter().position(|d| d == "/b/archive").unwrap();
        let quarantine = dirs.iter().position(|d| d == "/b/archive/failed").unwrap();
        let logs = dirs.iter().position(|d| d == "/b/logs").unwrap();
        let failed = dirs.iter().position(|d| d == "/b/logs/failed").unwrap();
        assert!(archive < quarantine);
        assert!(logs < failed);
    }

    #[test]
    fn test_join_and_file_name() {
        assert_eq!(join("/a/", "/b.json"), "/a/b.json");
        assert_eq!(join("/", "b"), "/b");
        assert_eq!(file_name("/a/b/c.csv"), "c.csv");
        assert_eq!(file_name("c.csv"), "c.csv");
    }
}
