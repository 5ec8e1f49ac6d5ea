//! Authentication for the three entry points: the admin console (email
//! allow-list), branch entry (shared branch password), and the in-branch
//! user login (users sheet).
//!
//! Credentials are plaintext throughout. That is the legacy data format
//! this system is bound to, not a convention to extend.

use std::fs;
use tracing::{info, warn};

use crate::cache::{BranchCache, BranchCatalog};
use crate::models::User;
use crate::sync::SyncClient;

/// Email addresses allowed into the admin console.
const ADMIN_EMAILS: &[&str] = &[
    "admin@posbilling.com",
    "manager@posbilling.com",
    "superadmin@posbilling.com",
];

/// Admin console entry: the email must be on the allow-list.
pub fn authenticate_admin(email: &str) -> Result<(), String> {
    let email = email.trim();
    if ADMIN_EMAILS
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(email))
    {
        info!(email, "admin authenticated");
        Ok(())
    } else {
        warn!(email, "admin authentication rejected");
        Err("Invalid credentials".to_string())
    }
}

/// In-branch user login against the selected branch's users sheet. The
/// sheet is read fresh from disk so edits made outside this process count
/// immediately.
pub fn login(cache: &BranchCache, username: &str, password: &str) -> Result<User, String> {
    let path = cache
        .file_path()
        .ok_or_else(|| "No branch selected".to_string())?;
    let user = cache
        .store()
        .read_users(path)
        .into_iter()
        .find(|u| u.username == username && u.password == password)
        .ok_or_else(|| "Invalid credentials".to_string())?;
    info!(username = user.username.as_str(), role = user.role.as_str(), "user logged in");
    Ok(user)
}

/// Branch entry against the local workbooks only. `Ok(None)` when no local
/// branch matches the password.
pub fn authenticate_branch_local(
    cache: &mut BranchCache,
    password: &str,
) -> Result<Option<BranchCatalog>, String> {
    if password.is_empty() {
        return Err("Invalid credentials".to_string());
    }

    let mut matched: Option<String> = None;
    for code in cache.store().list_branch_codes() {
        let path = cache.store().branch_file_path(&code);
        let tables = match cache.store().load(&path) {
            Ok(Some(tables)) => tables,
            Ok(None) => continue,
            Err(e) => {
                warn!(branch = code.as_str(), error = %e, "skipping unreadable branch during login");
                continue;
            }
        };
        if tables
            .branch_details
            .is_some_and(|d| !d.password.is_empty() && d.password == password)
        {
            matched = Some(code);
            break;
        }
    }

    let Some(code) = matched else {
        return Ok(None);
    };
    Ok(Some(enter_branch(cache, &code)?))
}

/// Branch entry with remote recovery: when no local workbook matches, ask
/// the sync server for a branch with this password, materialize its
/// workbook locally, and enter it.
pub async fn authenticate_branch(
    cache: &mut BranchCache,
    password: &str,
    sync: Option<&SyncClient>,
) -> Result<BranchCatalog, String> {
    if let Some(catalog) = authenticate_branch_local(cache, password)? {
        return Ok(catalog);
    }

    let Some(client) = sync else {
        warn!("branch authentication failed, no local match");
        return Err("Invalid credentials".to_string());
    };
    let Some((code, bytes)) = client.find_branch_by_password(password).await? else {
        warn!("branch authentication failed locally and on sync server");
        return Err("Invalid credentials".to_string());
    };

    let data_dir = cache.store().data_dir();
    fs::create_dir_all(&data_dir)
        .map_err(|e| format!("Failed to create data directory: {e}"))?;
    fs::write(cache.store().branch_file_path(&code), bytes)
        .map_err(|e| format!("Failed to store recovered branch workbook: {e}"))?;
    info!(branch = code.as_str(), "branch workbook recovered from sync server");
    enter_branch(cache, &code)
}

/// Select and load a branch after a successful password match, run the
/// daily cleanup sweep, and hand back the catalog.
fn enter_branch(cache: &mut BranchCache, branch_code: &str) -> Result<BranchCatalog, String> {
    cache.select_branch(branch_code)?;
    cache.load()?;
    cache.cleanup_old_bills()?;
    info!(branch = branch_code, "branch authenticated");
    Ok(cache.catalog())
}
