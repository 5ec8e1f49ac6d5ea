//! Sync client for the central backup server.
//!
//! The unit of sync is a whole branch workbook. Push uploads every local
//! workbook as a multipart file; pull downloads one branch's workbook and
//! merges it over the local file, keeping the locally-owned sheets (bills,
//! bill items, settings, users) and taking the catalog sheets from the
//! server. Branch recovery looks a workbook up by its branch password.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{BranchCache, BranchCatalog};
use crate::models::BranchTables;
use crate::workbook;

/// Default timeout for sync requests (60 seconds; uploads carry whole
/// workbooks).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach sync server at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid sync server URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 | 403 => "Sync server rejected the request".to_string(),
        404 => "Sync server endpoint not found".to_string(),
        s if s >= 500 => format!("Sync server error (HTTP {s})"),
        s => format!("Unexpected response from sync server (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Per-branch outcome of a push run.
#[derive(Debug, Clone, Serialize)]
pub struct PushResult {
    pub branch: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyncClient {
    base_url: String,
    timeout: Duration,
}

impl SyncClient {
    /// Build a client for the given server. Trailing slashes are stripped
    /// so endpoint paths join cleanly.
    pub fn new(base_url: &str) -> Self {
        SyncClient {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn http_client(&self) -> Result<Client, String> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))
    }

    /// Upload every local branch workbook to the server. Branches are
    /// pushed independently; one failure does not stop the run. A branch
    /// that uploads successfully gets its `last_sync_ts` stamped.
    pub async fn push_sync(&self, cache: &mut BranchCache) -> Result<Vec<PushResult>, String> {
        let url = format!("{}/sync/upload", self.base_url);
        let client = self.http_client()?;
        let codes = cache.store().list_branch_codes();
        if codes.is_empty() {
            return Err("No branches to sync".to_string());
        }

        let mut results = Vec::with_capacity(codes.len());
        for code in codes {
            match self.push_one(&client, &url, cache, &code).await {
                Ok(()) => {
                    info!(branch = code.as_str(), "branch pushed to sync server");
                    results.push(PushResult {
                        branch: code,
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(branch = code.as_str(), error = %e, "branch push failed");
                    results.push(PushResult {
                        branch: code,
                        success: false,
                        error: Some(e),
                    });
                }
            }
        }
        Ok(results)
    }

    async fn push_one(
        &self,
        client: &Client,
        url: &str,
        cache: &mut BranchCache,
        branch_code: &str,
    ) -> Result<(), String> {
        cache.select_branch(branch_code)?;
        cache.load()?;

        let path = cache
            .file_path()
            .ok_or_else(|| "No branch selected".to_string())?
            .to_path_buf();
        let bytes =
            fs::read(&path).map_err(|e| format!("Failed to read branch workbook: {e}"))?;
        let file_name = remote_branch_name(branch_code);

        let form = Form::new().text("branch", file_name.clone()).part(
            "file",
            Part::bytes(bytes).file_name(format!("{file_name}.xlsx")),
        );
        let resp = client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| friendly_error(url, &e))?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status()));
        }

        cache.stamp_last_sync()?;
        Ok(())
    }

    /// Download one branch's workbook and merge it over the local copy,
    /// keeping the locally-owned sheets. Returns the refreshed catalog.
    pub async fn pull_sync(
        &self,
        cache: &mut BranchCache,
        branch_code: &str,
    ) -> Result<BranchCatalog, String> {
        let url = format!(
            "{}/sync/download?branch={}",
            self.base_url,
            remote_branch_name(branch_code)
        );
        let client = self.http_client()?;
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(|e| friendly_error(&url, &e))?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status()));
        }
        let bytes = resp.bytes().await.map_err(|e| friendly_error(&url, &e))?;
        let remote = workbook::read_workbook_bytes(&bytes)
            .map_err(|e| format!("Sync server returned an unreadable workbook: {e}"))?;

        cache.select_branch(branch_code)?;
        let path = cache
            .file_path()
            .ok_or_else(|| "No branch selected".to_string())?
            .to_path_buf();
        let local = cache.store().load(&path)?.unwrap_or_default();
        let merged = merge_pulled_tables(local, remote);
        cache.store().write(&path, &merged)?;

        cache.load()?;
        info!(branch = branch_code, "branch pulled from sync server");
        Ok(cache.catalog())
    }

    /// Look up a branch workbook by its branch password. `Ok(None)` when
    /// the server knows no such branch; otherwise the branch code and the
    /// decoded workbook bytes.
    pub async fn find_branch_by_password(
        &self,
        password: &str,
    ) -> Result<Option<(String, Vec<u8>)>, String> {
        let url = format!("{}/sync/find-branch-by-password", self.base_url);
        let client = self.http_client()?;
        let resp = client
            .post(&url)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(|e| friendly_error(&url, &e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(status_error(resp.status()));
        }

        let body: Value = resp.json().await.map_err(|e| friendly_error(&url, &e))?;
        let branch_code = body
            .get("branchCode")
            .and_then(Value::as_str)
            .map(str::to_string);
        let file_buffer = body.get("fileBuffer").and_then(Value::as_str);
        match (branch_code, file_buffer) {
            (Some(code), Some(encoded)) => {
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|e| format!("Sync server returned an invalid workbook: {e}"))?;
                Ok(Some((code, bytes)))
            }
            _ => Ok(None),
        }
    }
}

/// Branch identifier as the server knows it (`branch_<code>`).
fn remote_branch_name(branch_code: &str) -> String {
    format!("branch_{branch_code}")
}

/// Merge a pulled workbook over the local one: catalog sheets come from the
/// server, transactional and credential sheets stay local.
fn merge_pulled_tables(local: BranchTables, remote: BranchTables) -> BranchTables {
    BranchTables {
        branch_details: remote.branch_details.or(local.branch_details),
        products: remote.products,
        offers: remote.offers,
        categories: remote.categories,
        bills: local.bills,
        bill_items: local.bill_items,
        settings: local.settings,
        users: local.users,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_day;
    use crate::models::{Bill, BranchDetails, Offer, Product, User};
    use crate::store::SpreadsheetStore;
    use chrono::Local;
    use tempfile::TempDir;

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(
            SyncClient::new("https://sync.example.com/").base_url(),
            "https://sync.example.com"
        );
        assert_eq!(
            SyncClient::new("  https://sync.example.com//  ").base_url(),
            "https://sync.example.com"
        );
    }

    #[test]
    fn remote_branch_names_carry_the_file_prefix() {
        assert_eq!(remote_branch_name("BR001"), "branch_BR001");
    }

    #[test]
    fn pull_merge_keeps_local_bills_and_users() {
        let mut local = BranchTables::new_with_defaults("2024-05-10");
        local.bills = vec![Bill {
            bill_no: 1,
            total: 210.0,
            ..Default::default()
        }];
        local.users.push(User {
            username: "manager".into(),
            password: "m123".into(),
            role: "admin".into(),
        });
        local.products = vec![Product {
            product_id: "stale".into(),
            ..Default::default()
        }];

        let remote = BranchTables {
            branch_details: Some(BranchDetails {
                branch_code: "BR001".into(),
                name: "Renamed".into(),
                ..Default::default()
            }),
            products: vec![Product {
                product_id: "p1".into(),
                ..Default::default()
            }],
            offers: vec![Offer {
                offer_id: "o1".into(),
                discount: 10.0,
                ..Default::default()
            }],
            categories: vec!["Snacks".into()],
            // A server copy may carry its own bills; they must not clobber
            // the local ledger.
            bills: vec![Bill {
                bill_no: 99,
                ..Default::default()
            }],
            ..Default::default()
        };

        let merged = merge_pulled_tables(local.clone(), remote);
        assert_eq!(merged.branch_details.expect("details").name, "Renamed");
        assert_eq!(merged.products.len(), 1);
        assert_eq!(merged.products[0].product_id, "p1");
        assert_eq!(merged.offers.len(), 1);
        assert_eq!(merged.categories, vec!["Snacks"]);
        assert_eq!(merged.bills, local.bills);
        assert_eq!(merged.users, local.users);
        assert_eq!(merged.settings, local.settings);
    }

    #[test]
    fn pull_merge_without_remote_details_keeps_local_row() {
        let local = BranchTables {
            branch_details: Some(BranchDetails {
                branch_code: "BR001".into(),
                name: "Local".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge_pulled_tables(local, BranchTables::default());
        assert_eq!(merged.branch_details.expect("details").name, "Local");
    }

    #[test]
    fn status_errors_are_user_readable() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND),
            "Sync server endpoint not found"
        );
        assert_eq!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR),
            "Sync server error (HTTP 500)"
        );
    }

    fn cache_with_branches(codes: &[&str]) -> (TempDir, BranchCache) {
        let dir = TempDir::new().expect("temp dir");
        let mut cache = BranchCache::new(SpreadsheetStore::new(dir.path()));
        for code in codes {
            cache
                .create_branch(BranchDetails {
                    branch_code: (*code).into(),
                    name: format!("Branch {code}"),
                    password: "pw".into(),
                    ..Default::default()
                })
                .expect("create branch");
        }
        (dir, cache)
    }

    fn workbook_bytes(tables: &BranchTables) -> Vec<u8> {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("remote.xlsx");
        workbook::write_workbook(&path, tables).expect("write workbook");
        std::fs::read(&path).expect("read workbook bytes")
    }

    #[tokio::test]
    async fn push_sync_uploads_every_branch_workbook() {
        let (_dir, mut cache) = cache_with_branches(&["BR001", "BR002"]);
        let (base, stub) = http_stub::serve(vec![(200, b"{}".to_vec()), (200, b"{}".to_vec())]);

        let results = SyncClient::new(&base)
            .push_sync(&mut cache)
            .await
            .expect("push");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success && r.error.is_none()));

        let seen = stub.join().expect("stub thread");
        assert!(seen[0].starts_with("POST /sync/upload"));
        assert!(seen[0].contains("name=\"branch\""));
        assert!(seen[0].contains("filename=\"branch_BR001.xlsx\""));
        assert!(seen[1].contains("filename=\"branch_BR002.xlsx\""));
    }

    #[tokio::test]
    async fn push_sync_reports_failures_per_branch() {
        let (_dir, mut cache) = cache_with_branches(&["BR001"]);
        let (base, stub) = http_stub::serve(vec![(500, Vec::new())]);

        let results = SyncClient::new(&base)
            .push_sync(&mut cache)
            .await
            .expect("push");
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(
            results[0].error.as_deref(),
            Some("Sync server error (HTTP 500)")
        );
        stub.join().expect("stub thread");
    }

    #[tokio::test]
    async fn push_sync_without_branches_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let mut cache = BranchCache::new(SpreadsheetStore::new(dir.path()));
        assert_eq!(
            SyncClient::new("http://127.0.0.1:1")
                .push_sync(&mut cache)
                .await
                .expect_err("no branches"),
            "No branches to sync"
        );
    }

    #[tokio::test]
    async fn pull_sync_takes_catalog_from_server_and_keeps_local_bills() {
        let (_dir, mut cache) = cache_with_branches(&["BR001"]);

        cache.select_branch("BR001").expect("select");
        cache.load().expect("load");
        let (today, _) = business_day::retention_window(Local::now().naive_local());
        cache.data.bills.push(Bill {
            bill_no: 1,
            date_iso: today.clone(),
            created_at_ts: format!("{today}T12:00:00.000Z"),
            day_boundary: today,
            total: 210.0,
            ..Default::default()
        });
        cache.save().expect("save");

        let remote = BranchTables {
            products: vec![Product {
                product_id: "p1".into(),
                name: "Server Dosa".into(),
                branch: "BR001".into(),
                price: 100.0,
                ..Default::default()
            }],
            categories: vec!["Snacks".into()],
            // Server-side bills must not clobber the local ledger.
            bills: vec![Bill {
                bill_no: 42,
                ..Default::default()
            }],
            ..Default::default()
        };
        let (base, stub) = http_stub::serve(vec![(200, workbook_bytes(&remote))]);

        let catalog = SyncClient::new(&base)
            .pull_sync(&mut cache, "BR001")
            .await
            .expect("pull");
        assert_eq!(catalog.products.len(), 1);
        assert_eq!(catalog.products[0].name, "Server Dosa");
        assert_eq!(catalog.categories, vec!["Snacks"]);

        let nos: Vec<u32> = cache.data.bills.iter().map(|b| b.bill_no).collect();
        assert_eq!(nos, vec![1]);

        // Local users survive the merge.
        let path = cache.file_path().expect("path").to_path_buf();
        assert_eq!(cache.store().read_users(&path), User::seed_accounts());

        let seen = stub.join().expect("stub thread");
        assert!(seen[0].starts_with("GET /sync/download?branch=branch_BR001"));
    }

    #[tokio::test]
    async fn find_branch_by_password_decodes_the_server_workbook() {
        let bytes = workbook_bytes(&BranchTables::new_with_defaults("2024-05-10"));
        let body = serde_json::json!({
            "branchCode": "BR009",
            "fileBuffer": BASE64.encode(&bytes),
        })
        .to_string()
        .into_bytes();
        let (base, stub) = http_stub::serve(vec![(200, body)]);

        let (code, decoded) = SyncClient::new(&base)
            .find_branch_by_password("north123")
            .await
            .expect("lookup")
            .expect("match");
        assert_eq!(code, "BR009");
        assert_eq!(decoded, bytes);

        let seen = stub.join().expect("stub thread");
        assert!(seen[0].starts_with("POST /sync/find-branch-by-password"));
        assert!(seen[0].contains("\"password\":\"north123\""));
    }

    #[tokio::test]
    async fn find_branch_by_password_maps_not_found_to_none() {
        let (base, stub) = http_stub::serve(vec![(404, b"{}".to_vec())]);
        let result = SyncClient::new(&base)
            .find_branch_by_password("unknown")
            .await
            .expect("lookup");
        assert!(result.is_none());
        stub.join().expect("stub thread");
    }
}
