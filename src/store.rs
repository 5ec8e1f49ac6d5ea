//! Durable per-branch persistence: one workbook file per branch under a
//! branch-scoped data directory.
//!
//! Writes replace the whole file, so they go to a sibling temp path first
//! and are renamed into place; a failed write leaves the previous file
//! version on disk untouched.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::business_day;
use crate::models::{BranchTables, User};
use crate::workbook;

const BRANCH_FILE_PREFIX: &str = "branch_";
const BRANCH_FILE_SUFFIX: &str = ".xlsx";

/// Reserved legacy workbook that must never be treated as a branch.
pub const GLOBAL_WORKBOOK_NAME: &str = "branch_GLOBAL.xlsx";

/// File-backed store rooted at an application data directory. Branch
/// workbooks live in `<root>/data`, templates (optional) in
/// `<root>/templates`.
#[derive(Debug, Clone)]
pub struct SpreadsheetStore {
    root: PathBuf,
}

impl SpreadsheetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SpreadsheetStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The branch data directory (`<root>/data`).
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Deterministic workbook path for a branch code.
    pub fn branch_file_path(&self, branch_code: &str) -> PathBuf {
        self.data_dir()
            .join(format!("{BRANCH_FILE_PREFIX}{branch_code}{BRANCH_FILE_SUFFIX}"))
    }

    /// Optional template workbook for a branch (`<root>/templates/...`).
    fn template_path(&self, branch_code: &str) -> Option<PathBuf> {
        let path = self
            .root
            .join("templates")
            .join(format!("{BRANCH_FILE_PREFIX}{branch_code}{BRANCH_FILE_SUFFIX}"));
        path.exists().then_some(path)
    }

    /// Ensure the branch workbook exists, creating the data directory and
    /// the file if needed. A template is copied when one is found;
    /// otherwise a new workbook is synthesized with all sheets declared,
    /// default settings rows, and the two seed users. Returns the resolved
    /// path.
    pub fn ensure_file(&self, branch_code: &str) -> Result<PathBuf, String> {
        let data_dir = self.data_dir();
        fs::create_dir_all(&data_dir)
            .map_err(|e| format!("Failed to create data directory: {e}"))?;

        let path = self.branch_file_path(branch_code);
        if path.exists() {
            return Ok(path);
        }

        if let Some(template) = self.template_path(branch_code) {
            fs::copy(&template, &path)
                .map_err(|e| format!("Failed to copy branch template: {e}"))?;
            info!(branch = branch_code, "branch workbook created from template");
            return Ok(path);
        }

        let tables = BranchTables::new_with_defaults(&business_day::calendar_today());
        self.write(&path, &tables)?;
        info!(branch = branch_code, path = %path.display(), "new branch workbook created");
        Ok(path)
    }

    /// Load all tables from a workbook. `Ok(None)` when the file does not
    /// exist; a malformed file surfaces as a load failure rather than a
    /// panic.
    pub fn load(&self, path: &Path) -> Result<Option<BranchTables>, String> {
        if !path.exists() {
            return Ok(None);
        }
        match workbook::read_workbook(path) {
            Ok(tables) => Ok(Some(tables)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "workbook load failed");
                Err(format!("Failed to load workbook: {e}"))
            }
        }
    }

    /// Serialize the complete table set, atomically with respect to the
    /// previous file version: write to a sibling temp file, then rename.
    pub fn write(&self, path: &Path, tables: &BranchTables) -> Result<(), String> {
        let tmp = sibling_temp_path(path);
        if let Err(e) = workbook::write_workbook(&tmp, tables) {
            let _ = fs::remove_file(&tmp);
            warn!(path = %path.display(), error = %e, "workbook write failed");
            return Err(format!("Failed to write workbook: {e}"));
        }
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            format!("Failed to replace workbook: {e}")
        })
    }

    /// Users for a workbook, read fresh from disk. Falls back to the seed
    /// accounts when the file is missing, unreadable, or has no users —
    /// credentials must survive saves triggered by flows that never loaded
    /// them.
    pub fn read_users(&self, path: &Path) -> Vec<User> {
        let users = match self.load(path) {
            Ok(Some(tables)) => tables.users,
            _ => Vec::new(),
        };
        if users.is_empty() {
            User::seed_accounts()
        } else {
            users
        }
    }

    /// Branch codes present in the data directory, excluding the legacy
    /// GLOBAL workbook.
    pub fn list_branch_codes(&self) -> Vec<String> {
        let entries = match fs::read_dir(self.data_dir()) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut codes: Vec<String> = entries
            .filter_map(|entry| {
                let name = entry.ok()?.file_name().to_str()?.to_string();
                if name == GLOBAL_WORKBOOK_NAME {
                    return None;
                }
                let code = name
                    .strip_prefix(BRANCH_FILE_PREFIX)?
                    .strip_suffix(BRANCH_FILE_SUFFIX)?;
                (!code.is_empty()).then(|| code.to_string())
            })
            .collect();
        codes.sort();
        codes
    }

    /// Delete a branch workbook. Errors with "Branch not found" when the
    /// file does not exist.
    pub fn delete_branch_file(&self, branch_code: &str) -> Result<(), String> {
        let path = self.branch_file_path(branch_code);
        if !path.exists() {
            return Err("Branch not found".to_string());
        }
        fs::remove_file(&path).map_err(|e| format!("Failed to delete branch: {e}"))?;
        info!(branch = branch_code, "branch workbook deleted");
        Ok(())
    }

    /// Remove the legacy GLOBAL workbook if it is still around. Silently
    /// succeeds when absent.
    pub fn remove_global_workbook(&self) {
        let path = self.data_dir().join(GLOBAL_WORKBOOK_NAME);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(error = %e, "failed to remove legacy GLOBAL workbook");
            }
        }
    }
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workbook.xlsx");
    path.with_file_name(format!(".{file_name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BranchDetails, Product, SETTING_LAST_CLEANUP_DATE};
    use tempfile::TempDir;

    fn store() -> (TempDir, SpreadsheetStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = SpreadsheetStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn ensure_file_synthesizes_workbook_with_defaults() {
        let (_dir, store) = store();
        let path = store.ensure_file("BR001").expect("ensure file");
        assert!(path.exists());

        let tables = store.load(&path).expect("load").expect("tables");
        assert_eq!(tables.users, User::seed_accounts());
        assert!(tables.settings.contains_key(SETTING_LAST_CLEANUP_DATE));
        assert!(tables.products.is_empty());
    }

    #[test]
    fn ensure_file_copies_template_when_present() {
        let (dir, store) = store();
        let template_dir = dir.path().join("templates");
        fs::create_dir_all(&template_dir).expect("template dir");

        let mut tables = BranchTables::new_with_defaults("2024-05-10");
        tables.products = vec![Product {
            product_id: "p1".into(),
            name: "Vada".into(),
            branch: "BR002".into(),
            price: 25.0,
            ..Default::default()
        }];
        workbook::write_workbook(&template_dir.join("branch_BR002.xlsx"), &tables)
            .expect("write template");

        let path = store.ensure_file("BR002").expect("ensure file");
        let loaded = store.load(&path).expect("load").expect("tables");
        assert_eq!(loaded.products.len(), 1);
        assert_eq!(loaded.products[0].name, "Vada");
    }

    #[test]
    fn load_missing_file_is_none_not_error() {
        let (_dir, store) = store();
        let result = store
            .load(&store.branch_file_path("NOPE"))
            .expect("load should not error");
        assert!(result.is_none());
    }

    #[test]
    fn load_malformed_file_is_an_error() {
        let (_dir, store) = store();
        fs::create_dir_all(store.data_dir()).expect("data dir");
        let path = store.branch_file_path("BAD");
        fs::write(&path, b"this is not a workbook").expect("write junk");
        assert!(store.load(&path).is_err());
    }

    #[test]
    fn failed_write_leaves_previous_version_intact() {
        let (_dir, store) = store();
        let path = store.ensure_file("BR001").expect("ensure file");

        let mut tables = store.load(&path).expect("load").expect("tables");
        tables.branch_details = Some(BranchDetails {
            branch_code: "BR001".into(),
            name: "Original".into(),
            ..Default::default()
        });
        store.write(&path, &tables).expect("write");

        // No partial content is ever visible at the target path: the temp
        // file is the only thing a failed write can leave behind.
        let reloaded = store.load(&path).expect("load").expect("tables");
        assert_eq!(
            reloaded.branch_details.expect("details").name,
            "Original"
        );
        assert!(!sibling_temp_path(&path).exists());
    }

    #[test]
    fn list_branch_codes_skips_global_workbook() {
        let (_dir, store) = store();
        store.ensure_file("BR001").expect("ensure BR001");
        store.ensure_file("BR002").expect("ensure BR002");
        let global = store.data_dir().join(GLOBAL_WORKBOOK_NAME);
        fs::write(&global, b"legacy").expect("write global");

        assert_eq!(store.list_branch_codes(), vec!["BR001", "BR002"]);

        store.remove_global_workbook();
        assert!(!global.exists());
    }

    #[test]
    fn delete_branch_file_reports_missing_branch() {
        let (_dir, store) = store();
        assert_eq!(
            store.delete_branch_file("GHOST").expect_err("should fail"),
            "Branch not found"
        );

        store.ensure_file("BR001").expect("ensure file");
        store.delete_branch_file("BR001").expect("delete");
        assert!(!store.branch_file_path("BR001").exists());
    }

    #[test]
    fn read_users_falls_back_to_seed_accounts() {
        let (_dir, store) = store();
        // Missing file -> seeds.
        assert_eq!(
            store.read_users(&store.branch_file_path("NOPE")),
            User::seed_accounts()
        );

        // Workbook with an empty users sheet -> seeds.
        let path = store.ensure_file("BR001").expect("ensure file");
        let mut tables = store.load(&path).expect("load").expect("tables");
        tables.users.clear();
        store.write(&path, &tables).expect("write");
        assert_eq!(store.read_users(&path), User::seed_accounts());
    }
}
