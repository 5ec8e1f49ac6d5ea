//! In-process snapshot of the currently selected branch.
//!
//! The cache holds exactly one branch's tables at a time and mediates every
//! higher-level operation. Store writes are all-or-nothing whole-file
//! replaces, so every targeted mutation must select + fully load its branch
//! first: the freshly loaded working set is what preserves the sheets the
//! operation does not touch. Skipping that load before a save silently
//! destroys sibling tables — this is the central correctness contract of
//! the whole system.
//!
//! Users is never part of the working set; `save()` re-reads it from the
//! on-disk file immediately before writing so credentials survive saves
//! triggered by flows that never loaded them.

use chrono::{Local, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::business_day;
use crate::models::{
    BranchDetails, BranchTables, Bill, BillItem, Offer, Product,
    SETTING_LAST_CLEANUP_DATE,
};
use crate::store::SpreadsheetStore;

/// The working set for one branch: every sheet except `users`.
#[derive(Debug, Clone, Default)]
pub struct BranchData {
    pub branch_details: Option<BranchDetails>,
    /// Filtered to rows whose `branch` field matches the selected branch.
    pub products: Vec<Product>,
    pub offers: Vec<Offer>,
    pub categories: Vec<String>,
    /// Retained window only: today and yesterday by business-day boundary.
    pub bills: Vec<Bill>,
    /// Items whose bill number survived the bill filter.
    pub bill_items: Vec<BillItem>,
    pub settings: HashMap<String, String>,
}

/// Catalog view returned to the UI layer after branch selection.
#[derive(Debug, Clone, Serialize)]
pub struct BranchCatalog {
    pub branch_details: Option<BranchDetails>,
    pub products: Vec<Product>,
    pub offers: Vec<Offer>,
    pub categories: Vec<String>,
}

/// Sole mutable owner of the selected branch's table snapshots.
pub struct BranchCache {
    store: SpreadsheetStore,
    branch_code: Option<String>,
    file_path: Option<PathBuf>,
    pub data: BranchData,
}

impl BranchCache {
    pub fn new(store: SpreadsheetStore) -> Self {
        BranchCache {
            store,
            branch_code: None,
            file_path: None,
            data: BranchData::default(),
        }
    }

    pub fn store(&self) -> &SpreadsheetStore {
        &self.store
    }

    pub fn branch_code(&self) -> Option<&str> {
        self.branch_code.as_deref()
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Point the cache at a branch, creating its workbook if needed. Does
    /// not load any data.
    pub fn select_branch(&mut self, branch_code: &str) -> Result<(), String> {
        let path = self.store.ensure_file(branch_code)?;
        self.branch_code = Some(branch_code.to_string());
        self.file_path = Some(path);
        Ok(())
    }

    fn active_path(&self) -> Result<&Path, String> {
        self.file_path
            .as_deref()
            .ok_or_else(|| "No branch selected".to_string())
    }

    /// Read every table for the selected branch into the working set,
    /// applying the load-time filters: products to this branch, bills and
    /// items to the retention window.
    pub fn load(&mut self) -> Result<(), String> {
        let branch_code = self
            .branch_code
            .clone()
            .ok_or_else(|| "No branch selected".to_string())?;
        let path = self.active_path()?.to_path_buf();

        let tables = match self.store.load(&path)? {
            Some(tables) => tables,
            None => {
                // The file can vanish between select and load; recreate it.
                let path = self.store.ensure_file(&branch_code)?;
                self.file_path = Some(path.clone());
                self.store
                    .load(&path)?
                    .ok_or_else(|| "Failed to load branch data".to_string())?
            }
        };

        let (today, yesterday) = business_day::retention_window(Local::now().naive_local());
        let bills: Vec<Bill> = tables
            .bills
            .into_iter()
            .filter(|b| b.day_boundary == today || b.day_boundary == yesterday)
            .collect();
        let retained: HashSet<u32> = bills.iter().map(|b| b.bill_no).collect();
        let bill_items: Vec<BillItem> = tables
            .bill_items
            .into_iter()
            .filter(|item| retained.contains(&item.bill_no))
            .collect();

        self.data = BranchData {
            branch_details: tables.branch_details,
            products: tables
                .products
                .into_iter()
                .filter(|p| p.branch == branch_code)
                .collect(),
            offers: tables.offers,
            categories: tables.categories,
            bills,
            bill_items,
            settings: tables.settings,
        };
        debug!(
            branch = branch_code.as_str(),
            products = self.data.products.len(),
            bills = self.data.bills.len(),
            "branch data loaded"
        );
        Ok(())
    }

    /// Write the entire working set back to the workbook. Users is read
    /// fresh from the existing on-disk file, never from the cache.
    pub fn save(&mut self) -> Result<(), String> {
        let path = self.active_path()?.to_path_buf();
        let users = self.store.read_users(&path);
        let tables = BranchTables {
            branch_details: self.data.branch_details.clone(),
            products: self.data.products.clone(),
            offers: self.data.offers.clone(),
            categories: self.data.categories.clone(),
            bills: self.data.bills.clone(),
            bill_items: self.data.bill_items.clone(),
            settings: self.data.settings.clone(),
            users,
        };
        self.store.write(&path, &tables)
    }

    /// Select and fully load a branch so a following targeted save
    /// preserves every sheet it does not touch.
    fn select_and_load(&mut self, branch_code: &str) -> Result<(), String> {
        self.select_branch(branch_code)?;
        self.load()
    }

    // -----------------------------------------------------------------------
    // Targeted per-branch mutations
    // -----------------------------------------------------------------------

    /// Replace the product list for a branch. Refuses an empty list so an
    /// uninitialized collection can never wipe a populated sheet.
    pub fn save_products_for_branch(
        &mut self,
        branch_code: &str,
        products: Vec<Product>,
    ) -> Result<(), String> {
        self.select_and_load(branch_code)?;
        if products.is_empty() {
            warn!(branch = branch_code, "refusing to save empty product list");
            return Err("Refusing to overwrite products with empty list.".to_string());
        }
        self.data.products = products
            .into_iter()
            .map(|mut p| {
                p.branch = branch_code.to_string();
                p
            })
            .collect();
        self.save()
    }

    /// Merge new branch details onto the stored row. Empty incoming fields
    /// keep their stored values; the password changes only when a new one
    /// is supplied.
    pub fn save_branch_details_for_branch(
        &mut self,
        branch_code: &str,
        details: BranchDetails,
    ) -> Result<(), String> {
        self.select_and_load(branch_code)?;
        let merged = merge_branch_details(self.data.branch_details.take(), details);
        self.data.branch_details = Some(merged);
        self.save()
    }

    /// Broadcast the offer list to every branch workbook. Offers are
    /// logically global despite per-branch storage.
    pub fn save_offers_to_all_branches(&mut self, offers: Vec<Offer>) -> Result<(), String> {
        for code in self.store.list_branch_codes() {
            if let Err(e) = self.select_and_load(&code) {
                warn!(branch = code.as_str(), error = %e, "skipping branch during offer broadcast");
                continue;
            }
            self.data.offers = offers.clone();
            self.save()?;
        }
        self.store.remove_global_workbook();
        info!(offers = offers.len(), "offers broadcast to all branches");
        Ok(())
    }

    /// Broadcast the category list to every branch workbook.
    pub fn save_categories_to_all_branches(
        &mut self,
        categories: Vec<String>,
    ) -> Result<(), String> {
        for code in self.store.list_branch_codes() {
            if let Err(e) = self.select_and_load(&code) {
                warn!(branch = code.as_str(), error = %e, "skipping branch during category broadcast");
                continue;
            }
            self.data.categories = categories.clone();
            self.save()?;
        }
        info!(categories = categories.len(), "categories broadcast to all branches");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Current-branch mutations
    // -----------------------------------------------------------------------

    pub fn save_products(&mut self, products: Vec<Product>) -> Result<(), String> {
        if products.is_empty() {
            warn!("refusing to save empty product list");
            return Err("Refusing to overwrite products with empty list.".to_string());
        }
        self.data.products = products;
        self.save()
    }

    pub fn save_offers(&mut self, offers: Vec<Offer>) -> Result<(), String> {
        if offers.is_empty() {
            warn!("refusing to save empty offers list");
            return Err("Refusing to overwrite offers with empty list.".to_string());
        }
        self.data.offers = offers;
        self.save()
    }

    pub fn save_categories(&mut self, categories: Vec<String>) -> Result<(), String> {
        if categories.is_empty() {
            warn!("refusing to save empty categories list");
            return Err("Refusing to overwrite categories with empty list.".to_string());
        }
        self.data.categories = categories;
        self.save()
    }

    pub fn save_branch_details(&mut self, details: BranchDetails) -> Result<(), String> {
        let merged = merge_branch_details(self.data.branch_details.take(), details);
        self.data.branch_details = Some(merged);
        self.save()
    }

    /// Record a successful sync on the loaded branch details and persist.
    pub fn stamp_last_sync(&mut self) -> Result<(), String> {
        if let Some(details) = self.data.branch_details.as_mut() {
            details.last_sync_ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        }
        self.save()
    }

    // -----------------------------------------------------------------------
    // Retention sweep
    // -----------------------------------------------------------------------

    /// Once-per-calendar-day sweep dropping bills older than yesterday.
    ///
    /// Deliberately filters by raw `date_iso`, not the 5am boundary key
    /// used by load-time retention — inherited behavior, pinned by tests.
    /// Runs after every successful authentication/load; the
    /// `lastCleanupDate` setting guards re-entry.
    pub fn cleanup_old_bills(&mut self) -> Result<(), String> {
        let today = business_day::calendar_today();
        let yesterday = business_day::calendar_yesterday();

        let last_cleanup = self.data.settings.get(SETTING_LAST_CLEANUP_DATE);
        if last_cleanup.map(String::as_str) == Some(today.as_str()) {
            return Ok(());
        }

        let before = self.data.bills.len();
        self.data
            .bills
            .retain(|b| b.date_iso == today || b.date_iso == yesterday);
        let retained: HashSet<u32> = self.data.bills.iter().map(|b| b.bill_no).collect();
        self.data
            .bill_items
            .retain(|item| retained.contains(&item.bill_no));

        self.data
            .settings
            .insert(SETTING_LAST_CLEANUP_DATE.to_string(), today.clone());
        info!(
            dropped = before - self.data.bills.len(),
            cleanup_date = today.as_str(),
            "old bills cleaned up"
        );
        self.save()
    }

    // -----------------------------------------------------------------------
    // Branch lifecycle
    // -----------------------------------------------------------------------

    /// Create a new branch workbook seeded with the given details. Fails
    /// when the branch already exists.
    pub fn create_branch(&mut self, details: BranchDetails) -> Result<BranchDetails, String> {
        let branch_code = details.branch_code.clone();
        if branch_code.is_empty() {
            return Err("Branch code is required".to_string());
        }
        if self.store.branch_file_path(&branch_code).exists() {
            return Err("Branch already exists".to_string());
        }

        self.select_branch(&branch_code)?;
        let today = business_day::calendar_today();
        let mut fresh = BranchTables::new_with_defaults(&today);
        self.data = BranchData {
            branch_details: Some(BranchDetails {
                last_sync_ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                ..details
            }),
            settings: std::mem::take(&mut fresh.settings),
            ..Default::default()
        };
        self.save()?;
        self.load()?;
        info!(branch = branch_code.as_str(), "branch created");
        self.data
            .branch_details
            .clone()
            .ok_or_else(|| "Failed to create branch".to_string())
    }

    /// Delete a branch workbook from disk.
    pub fn delete_branch(&mut self, branch_code: &str) -> Result<(), String> {
        self.store.delete_branch_file(branch_code)?;
        if self.branch_code.as_deref() == Some(branch_code) {
            self.branch_code = None;
            self.file_path = None;
            self.data = BranchData::default();
        }
        Ok(())
    }

    /// Branch details from every readable workbook; unreadable files are
    /// skipped with a warning rather than failing the listing.
    pub fn get_all_branches(&self) -> Vec<BranchDetails> {
        let mut branches = Vec::new();
        for code in self.store.list_branch_codes() {
            match self.store.load(&self.store.branch_file_path(&code)) {
                Ok(Some(tables)) => {
                    if let Some(details) = tables.branch_details {
                        branches.push(details);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(branch = code.as_str(), error = %e, "skipping unreadable branch"),
            }
        }
        branches
    }

    /// Load a branch and return its catalog view.
    pub fn get_branch_data(&mut self, branch_code: &str) -> Result<BranchCatalog, String> {
        self.select_and_load(branch_code)?;
        Ok(self.catalog())
    }

    /// Catalog view of the current working set.
    pub fn catalog(&self) -> BranchCatalog {
        BranchCatalog {
            branch_details: self.data.branch_details.clone(),
            products: self.data.products.clone(),
            offers: self.data.offers.clone(),
            categories: self.data.categories.clone(),
        }
    }
}

/// Field-wise merge of incoming details onto the stored row. The branch
/// code always follows the incoming row when set.
fn merge_branch_details(existing: Option<BranchDetails>, incoming: BranchDetails) -> BranchDetails {
    let mut merged = existing.unwrap_or_default();
    let take = |current: &mut String, incoming: String| {
        if !incoming.is_empty() {
            *current = incoming;
        }
    };
    take(&mut merged.branch_code, incoming.branch_code);
    take(&mut merged.name, incoming.name);
    take(&mut merged.password, incoming.password);
    take(&mut merged.gst, incoming.gst);
    take(&mut merged.fssai, incoming.fssai);
    take(&mut merged.bill_address, incoming.bill_address);
    take(&mut merged.phone, incoming.phone);
    take(&mut merged.email, incoming.email);
    take(&mut merged.last_sync_ts, incoming.last_sync_ts);
    merged
}
