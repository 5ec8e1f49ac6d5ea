//! Bill creation, numbering, tax/discount computation, and the print-once
//! flag.
//!
//! "Transactional" here means atomic with respect to the cache mutation
//! and the single save() that follows — there is no cross-process
//! transaction. Bill numbers are per business day (the 5am boundary), not
//! globally monotonic, and reset to 1 at each cutover.

use chrono::{Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::business_day;
use crate::cache::BranchCache;
use crate::models::{Bill, BillItem, BillType, Offer};
use crate::settings::GlobalSettings;

/// GST rate applied twice: once as SGST, once as CGST.
const GST_COMPONENT_RATE: f64 = 0.025;

/// One line of an incoming bill, as entered at the till.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillItemInput {
    pub product_id: String,
    pub name: String,
    pub qty: u32,
    pub price: f64,
}

/// A bill ready for creation: line items plus the totals the till computed
/// via [`compute_bill_totals`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillDraft {
    pub items: Vec<BillItemInput>,
    #[serde(default, rename = "billType")]
    pub bill_type: BillType,
    pub total: f64,
    #[serde(default)]
    pub cgst: f64,
    #[serde(default)]
    pub sgst: f64,
}

impl BillDraft {
    /// Build a draft from line items, applying the offer and tax contract.
    pub fn from_items(items: Vec<BillItemInput>, offers: &[Offer], bill_type: BillType) -> Self {
        let totals = compute_bill_totals(&items, offers);
        BillDraft {
            items,
            bill_type,
            total: totals.grand_total,
            cgst: totals.cgst,
            sgst: totals.sgst,
        }
    }
}

/// Breakdown of a bill's money math.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BillTotals {
    pub subtotal: f64,
    pub discount: f64,
    pub sgst: f64,
    pub cgst: f64,
    pub grand_total: f64,
}

/// subtotal = Σ price×qty; only the FIRST offer with a nonzero discount
/// applies (later offers are ignored); SGST and CGST are each 2.5% of the
/// discounted subtotal.
pub fn compute_bill_totals(items: &[BillItemInput], offers: &[Offer]) -> BillTotals {
    let subtotal: f64 = items.iter().map(|i| i.price * i.qty as f64).sum();
    let discount = offers
        .iter()
        .find(|o| o.discount != 0.0)
        .map(|o| subtotal * (o.discount / 100.0))
        .unwrap_or(0.0);
    let discounted = subtotal - discount;
    let sgst = discounted * GST_COMPONENT_RATE;
    let cgst = discounted * GST_COMPONENT_RATE;
    BillTotals {
        subtotal,
        discount,
        sgst,
        cgst,
        grand_total: discounted + sgst + cgst,
    }
}

/// Next bill number for the given business day: 1 when no bill carries the
/// boundary key, otherwise max + 1. Yesterday's numbering is irrelevant.
pub fn next_bill_number(bills: &[Bill], today_boundary: &str) -> u32 {
    bills
        .iter()
        .filter(|b| b.day_boundary == today_boundary)
        .map(|b| b.bill_no)
        .max()
        .map(|max| max + 1)
        .unwrap_or(1)
}

/// Create a bill and its line items against the branch cache, then persist.
///
/// The cache is re-pointed at the branch and reloaded first so earlier
/// bills for the day are visible — stale numbering would otherwise hand
/// out duplicates. Returns the assigned bill number.
pub fn create_bill(
    cache: &mut BranchCache,
    branch_code: &str,
    draft: BillDraft,
    global: &GlobalSettings,
) -> Result<u32, String> {
    if draft.items.is_empty() {
        warn!(branch = branch_code, "rejected bill with no items");
        return Err("Cannot create bill with no items.".to_string());
    }

    cache.select_branch(branch_code)?;
    cache.load()?;

    let now = Local::now().naive_local();
    let (today_boundary, yesterday_boundary) = business_day::retention_window(now);
    let bill_no = next_bill_number(&cache.data.bills, &today_boundary);

    let total = if global.round_off {
        draft.total.round()
    } else {
        draft.total
    };

    let date_iso = now.date().format("%Y-%m-%d").to_string();
    let created_at_ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    cache.data.bills.push(Bill {
        bill_no,
        date_iso: date_iso.clone(),
        created_at_ts,
        day_boundary: today_boundary.clone(),
        total,
        cgst: draft.cgst,
        sgst: draft.sgst,
        bill_type: draft.bill_type,
        printed: false,
    });
    for item in &draft.items {
        cache.data.bill_items.push(BillItem {
            bill_no,
            product_id: item.product_id.clone(),
            name: item.name.clone(),
            qty: item.qty,
            price: item.price,
            total: item.price * item.qty as f64,
            date_iso: date_iso.clone(),
            day_boundary: today_boundary.clone(),
        });
    }

    // Defensive re-apply of the retention filter before persisting.
    cache
        .data
        .bills
        .retain(|b| b.day_boundary == today_boundary || b.day_boundary == yesterday_boundary);
    cache
        .data
        .bill_items
        .retain(|i| i.day_boundary == today_boundary || i.day_boundary == yesterday_boundary);

    cache.save()?;
    info!(
        branch = branch_code,
        bill_no,
        total,
        items = draft.items.len(),
        "bill created"
    );
    Ok(bill_no)
}

/// Mark a bill as printed. The flag is one-way: a second call for the same
/// bill number fails with "Already printed" and the flag stays set.
pub fn mark_printed(cache: &mut BranchCache, bill_no: u32) -> Result<(), String> {
    let bill = cache
        .data
        .bills
        .iter_mut()
        .find(|b| b.bill_no == bill_no)
        .ok_or_else(|| "Bill not found".to_string())?;
    if bill.printed {
        return Err("Already printed".to_string());
    }
    bill.printed = true;
    cache.save()?;
    info!(bill_no, "bill marked printed");
    Ok(())
}
