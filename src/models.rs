//! Typed rows for the per-branch workbook sheets.
//!
//! Each struct maps one row of a named sheet. Field names follow the sheet
//! headers (snake_case), so serde round-trips match what the admin screens
//! and the sync backend exchange as JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sheet names, in the order they are written to a workbook.
pub const SHEET_BRANCH_DETAILS: &str = "branch_details";
pub const SHEET_PRODUCTS: &str = "products";
pub const SHEET_OFFERS: &str = "offers";
pub const SHEET_CATEGORIES: &str = "categories";
pub const SHEET_BILLS: &str = "bills";
pub const SHEET_BILL_ITEMS: &str = "bill_items";
pub const SHEET_SETTINGS: &str = "settings";
pub const SHEET_USERS: &str = "users";

/// Settings keys recognized by the cache.
pub const SETTING_LAST_CLEANUP_DATE: &str = "lastCleanupDate";
pub const SETTING_VERSION: &str = "version";

/// Singleton row of the `branch_details` sheet.
///
/// The password is the shared branch-entry secret, stored in plaintext —
/// a documented weakness of the legacy data format, reproduced as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchDetails {
    pub branch_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub gst: String,
    #[serde(default)]
    pub fssai: String,
    #[serde(default)]
    pub bill_address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub last_sync_ts: String,
}

/// One row of the `products` sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    /// Owning branch code. Stamped on every targeted product save.
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub price: f64,
    /// Defaults to 0 when missing or non-numeric in the sheet.
    #[serde(default)]
    pub discount: f64,
    /// Optional fast-entry shortcut, unique within a branch.
    #[serde(default)]
    pub shortcut_number: Option<u32>,
    #[serde(default)]
    pub add_gst: bool,
}

/// One row of the `offers` sheet. Offers are stored per-workbook but are
/// logically global: broadcast writes keep every branch identical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: String,
    #[serde(default)]
    pub name: String,
    /// Percentage discount. Only the first offer with a nonzero discount
    /// is applied at billing time.
    #[serde(default)]
    pub discount: f64,
}

/// Bill fulfilment type. Unknown wire strings fall back to Takeaway,
/// matching how the legacy screens treated missing values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillType {
    #[default]
    #[serde(rename = "Takeaway")]
    Takeaway,
    #[serde(rename = "Home Delivery")]
    HomeDelivery,
}

impl BillType {
    pub fn as_str(self) -> &'static str {
        match self {
            BillType::Takeaway => "Takeaway",
            BillType::HomeDelivery => "Home Delivery",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "Home Delivery" => BillType::HomeDelivery,
            _ => BillType::Takeaway,
        }
    }
}

/// One row of the `bills` sheet.
///
/// `bill_no` is unique only within one business day and resets to 1 at the
/// 05:00 cutover. `date_iso` is the calendar date of creation while
/// `day_boundary` is the shifted business-day key; retention filters use
/// the boundary, cleanup and reports use the calendar date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub bill_no: u32,
    pub date_iso: String,
    pub created_at_ts: String,
    pub day_boundary: String,
    pub total: f64,
    #[serde(default)]
    pub cgst: f64,
    #[serde(default)]
    pub sgst: f64,
    #[serde(default, rename = "billType")]
    pub bill_type: BillType,
    /// One-way flag, stored as 0/1 in the sheet. A bill prints at most once.
    #[serde(default)]
    pub printed: bool,
}

/// One row of the `bill_items` sheet, tied 1:N to its parent bill and
/// purged together with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillItem {
    pub bill_no: u32,
    pub product_id: String,
    /// Name snapshot at billing time; the catalog may change later.
    pub name: String,
    pub qty: u32,
    pub price: f64,
    pub total: f64,
    pub date_iso: String,
    pub day_boundary: String,
}

/// One row of the `users` sheet. Plaintext credentials, per the legacy
/// format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    pub role: String,
}

impl User {
    /// The two accounts seeded into every new branch workbook.
    pub fn seed_accounts() -> Vec<User> {
        vec![
            User {
                username: "admin".into(),
                password: "admin123".into(),
                role: "admin".into(),
            },
            User {
                username: "user".into(),
                password: "user123".into(),
                role: "user".into(),
            },
        ]
    }
}

/// The complete parsed contents of one branch workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchTables {
    pub branch_details: Option<BranchDetails>,
    pub products: Vec<Product>,
    pub offers: Vec<Offer>,
    pub categories: Vec<String>,
    pub bills: Vec<Bill>,
    pub bill_items: Vec<BillItem>,
    pub settings: HashMap<String, String>,
    pub users: Vec<User>,
}

impl BranchTables {
    /// A fresh workbook: every sheet declared, default settings rows, and
    /// the two seed users.
    pub fn new_with_defaults(today_iso: &str) -> Self {
        let mut settings = HashMap::new();
        settings.insert(SETTING_LAST_CLEANUP_DATE.to_string(), today_iso.to_string());
        settings.insert(SETTING_VERSION.to_string(), "1.0.0".to_string());
        BranchTables {
            settings,
            users: User::seed_accounts(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bill_type_round_trips_wire_strings() {
        assert_eq!(BillType::parse("Home Delivery"), BillType::HomeDelivery);
        assert_eq!(BillType::HomeDelivery.as_str(), "Home Delivery");
        assert_eq!(BillType::parse("Takeaway"), BillType::Takeaway);
    }

    #[test]
    fn bill_type_defaults_to_takeaway_for_unknown_values() {
        assert_eq!(BillType::parse(""), BillType::Takeaway);
        assert_eq!(BillType::parse("Dine In"), BillType::Takeaway);
    }

    #[test]
    fn new_workbook_has_seed_users_and_settings() {
        let tables = BranchTables::new_with_defaults("2024-05-10");
        assert_eq!(tables.users.len(), 2);
        assert_eq!(tables.users[0].role, "admin");
        assert_eq!(
            tables.settings.get(SETTING_LAST_CLEANUP_DATE).map(String::as_str),
            Some("2024-05-10")
        );
        assert_eq!(
            tables.settings.get(SETTING_VERSION).map(String::as_str),
            Some("1.0.0")
        );
        assert!(tables.products.is_empty());
    }
}
