//! Sales report aggregation over the cached working set.
//!
//! Reports are scoped by calendar date (`date_iso`), not the 5am business
//! boundary, so a bill rung up at 2am appears under the date it was
//! actually created. Items are joined to bills by bill number alone, which
//! is unique only within a business day; the retention window keeps the
//! overlap small enough that this matches the historical numbers.
//!
//! The item-wise view goes through the product catalog: an item whose
//! product was deleted is left out of the per-product rows and their grand
//! total, while the day-wise quantity still counts it.

use serde::Serialize;
use std::collections::HashMap;

use crate::business_day;
use crate::cache::BranchData;
use crate::models::{BillItem, BillType};

/// Which calendar day to report on. Anything that is not "yesterday"
/// means today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFilter {
    Today,
    Yesterday,
}

impl ReportFilter {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("yesterday") {
            ReportFilter::Yesterday
        } else {
            ReportFilter::Today
        }
    }

    fn date(self) -> String {
        match self {
            ReportFilter::Today => business_day::calendar_today(),
            ReportFilter::Yesterday => business_day::calendar_yesterday(),
        }
    }
}

/// Per-product sales line, keyed by product id, in first-sold order. The
/// name comes from the catalog, not the billing-time snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemWiseRow {
    pub name: String,
    pub qty: u32,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemWiseTotals {
    pub qty: u32,
    pub total: f64,
}

/// One bill as shown on the bill-wise tab, with its line items attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillWiseRow {
    pub bill_no: u32,
    pub total: f64,
    /// Raw creation timestamp; the consumer decides how to render it.
    pub time: String,
    #[serde(rename = "billType")]
    pub bill_type: BillType,
    pub items: Vec<BillItem>,
    pub cgst: f64,
    pub sgst: f64,
}

/// Whole-day rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DayWiseSummary {
    pub date: String,
    pub total_bills: u32,
    pub total_qty: u32,
    pub total_sales: f64,
    pub cgst: f64,
    pub sgst: f64,
    pub takeaway_count: u32,
    pub home_delivery_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub item_wise: Vec<ItemWiseRow>,
    pub item_wise_total: ItemWiseTotals,
    pub bill_wise: Vec<BillWiseRow>,
    pub day_wise: DayWiseSummary,
}

/// Aggregate the working set into the three report views for one calendar
/// day.
pub fn report(data: &BranchData, filter: ReportFilter) -> ReportData {
    let date = filter.date();

    let bills: Vec<_> = data
        .bills
        .iter()
        .filter(|b| b.date_iso == date)
        .collect();
    let target_items: Vec<&BillItem> = data
        .bill_items
        .iter()
        .filter(|item| bills.iter().any(|b| b.bill_no == item.bill_no))
        .collect();

    let mut item_wise: Vec<ItemWiseRow> = Vec::new();
    let mut index_by_product: HashMap<&str, usize> = HashMap::new();
    let mut item_wise_total = ItemWiseTotals::default();
    for item in &target_items {
        // Items for a product no longer in the catalog are excluded from
        // the item-wise view and its grand total.
        let Some(product) = data
            .products
            .iter()
            .find(|p| p.product_id == item.product_id)
        else {
            continue;
        };
        item_wise_total.qty += item.qty;
        item_wise_total.total += item.total;
        match index_by_product.get(product.product_id.as_str()) {
            Some(&i) => {
                item_wise[i].qty += item.qty;
                item_wise[i].total += item.total;
            }
            None => {
                index_by_product.insert(product.product_id.as_str(), item_wise.len());
                item_wise.push(ItemWiseRow {
                    name: product.name.clone(),
                    qty: item.qty,
                    total: item.total,
                });
            }
        }
    }

    let mut day_wise = DayWiseSummary {
        date,
        // The day-wise quantity counts every item on the day's bills,
        // catalog or not.
        total_qty: target_items.iter().map(|i| i.qty).sum(),
        ..Default::default()
    };
    let bill_wise: Vec<BillWiseRow> = bills
        .iter()
        .map(|bill| {
            day_wise.total_bills += 1;
            day_wise.total_sales += bill.total;
            day_wise.cgst += bill.cgst;
            day_wise.sgst += bill.sgst;
            match bill.bill_type {
                BillType::Takeaway => day_wise.takeaway_count += 1,
                BillType::HomeDelivery => day_wise.home_delivery_count += 1,
            }
            BillWiseRow {
                bill_no: bill.bill_no,
                total: bill.total,
                time: bill.created_at_ts.clone(),
                bill_type: bill.bill_type,
                items: data
                    .bill_items
                    .iter()
                    .filter(|item| item.bill_no == bill.bill_no)
                    .cloned()
                    .collect(),
                cgst: bill.cgst,
                sgst: bill.sgst,
            }
        })
        .collect();

    ReportData {
        item_wise,
        item_wise_total,
        bill_wise,
        day_wise,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bill, Product};

    fn bill(no: u32, date_iso: &str, total: f64, bill_type: BillType) -> Bill {
        Bill {
            bill_no: no,
            date_iso: date_iso.into(),
            created_at_ts: format!("{date_iso}T10:30:00.000Z"),
            day_boundary: date_iso.into(),
            total,
            cgst: total * 0.025 / 1.05,
            sgst: total * 0.025 / 1.05,
            bill_type,
            printed: false,
        }
    }

    fn item(bill_no: u32, product_id: &str, name: &str, qty: u32, price: f64) -> BillItem {
        BillItem {
            bill_no,
            product_id: product_id.into(),
            name: name.into(),
            qty,
            price,
            total: price * qty as f64,
            ..Default::default()
        }
    }

    fn product(id: &str, name: &str) -> Product {
        Product {
            product_id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    fn sample_day() -> (String, BranchData) {
        let today = business_day::calendar_today();
        let yesterday = business_day::calendar_yesterday();
        let data = BranchData {
            products: vec![product("p1", "Masala Dosa"), product("p2", "Vada")],
            bills: vec![
                bill(1, &today, 210.0, BillType::Takeaway),
                bill(2, &today, 105.0, BillType::HomeDelivery),
                bill(1, &yesterday, 999.0, BillType::Takeaway),
            ],
            bill_items: vec![
                item(1, "p1", "Dosa", 2, 100.0),
                item(2, "p1", "Dosa", 1, 100.0),
                item(2, "p2", "Vada", 3, 25.0),
            ],
            ..Default::default()
        };
        (today, data)
    }

    #[test]
    fn filter_parse_defaults_to_today() {
        assert_eq!(ReportFilter::parse("yesterday"), ReportFilter::Yesterday);
        assert_eq!(ReportFilter::parse("YESTERDAY"), ReportFilter::Yesterday);
        assert_eq!(ReportFilter::parse("today"), ReportFilter::Today);
        assert_eq!(ReportFilter::parse(""), ReportFilter::Today);
    }

    #[test]
    fn item_wise_merges_by_product_in_first_sold_order() {
        let (_, data) = sample_day();
        let result = report(&data, ReportFilter::Today);

        assert_eq!(result.item_wise.len(), 2);
        // The catalog name wins over the billing-time snapshot ("Dosa").
        assert_eq!(result.item_wise[0].name, "Masala Dosa");
        assert_eq!(result.item_wise[0].qty, 3);
        assert_eq!(result.item_wise[0].total, 300.0);
        assert_eq!(result.item_wise[1].name, "Vada");
        assert_eq!(result.item_wise[1].qty, 3);
        assert_eq!(result.item_wise[1].total, 75.0);

        assert_eq!(result.item_wise_total.qty, 6);
        assert_eq!(result.item_wise_total.total, 375.0);
    }

    #[test]
    fn item_wise_excludes_products_missing_from_catalog() {
        let (_, mut data) = sample_day();
        data.bill_items.push(item(2, "p-gone", "Ghost Curry", 5, 100.0));

        let result = report(&data, ReportFilter::Today);
        // The deleted product appears in no row and inflates no total.
        assert_eq!(result.item_wise.len(), 2);
        assert!(result.item_wise.iter().all(|r| r.name != "Ghost Curry"));
        assert_eq!(result.item_wise_total.qty, 6);
        assert_eq!(result.item_wise_total.total, 375.0);
        // The day-wise quantity still counts it.
        assert_eq!(result.day_wise.total_qty, 11);
    }

    #[test]
    fn item_wise_is_empty_when_catalog_is_empty() {
        let (_, mut data) = sample_day();
        data.products.clear();

        let result = report(&data, ReportFilter::Today);
        assert!(result.item_wise.is_empty());
        assert_eq!(result.item_wise_total, ItemWiseTotals::default());
    }

    #[test]
    fn bill_wise_attaches_line_items_and_raw_timestamps() {
        let (today, data) = sample_day();
        let result = report(&data, ReportFilter::Today);

        assert_eq!(result.bill_wise.len(), 2);
        assert_eq!(result.bill_wise[0].bill_no, 1);
        assert_eq!(result.bill_wise[0].items.len(), 1);
        assert_eq!(result.bill_wise[0].items[0].name, "Dosa");
        assert_eq!(result.bill_wise[0].time, format!("{today}T10:30:00.000Z"));
        assert_eq!(result.bill_wise[1].bill_no, 2);
        assert_eq!(result.bill_wise[1].items.len(), 2);
        assert_eq!(result.bill_wise[1].bill_type, BillType::HomeDelivery);
    }

    #[test]
    fn day_wise_rolls_up_totals_and_type_counts() {
        let (today, data) = sample_day();
        let result = report(&data, ReportFilter::Today);

        let day = &result.day_wise;
        assert_eq!(day.date, today);
        assert_eq!(day.total_bills, 2);
        assert_eq!(day.total_qty, 6);
        assert_eq!(day.total_sales, 315.0);
        assert_eq!(day.takeaway_count, 1);
        assert_eq!(day.home_delivery_count, 1);
    }

    #[test]
    fn yesterday_filter_excludes_todays_bills() {
        let (_, data) = sample_day();
        let result = report(&data, ReportFilter::Yesterday);

        assert_eq!(result.bill_wise.len(), 1);
        assert_eq!(result.day_wise.total_sales, 999.0);
        // Yesterday's bill shares number 1 with today's; the bill-number
        // join therefore credits today's Dosa items to it as well.
        assert_eq!(result.bill_wise[0].items.len(), 1);
        assert_eq!(result.item_wise_total.qty, 2);
    }

    #[test]
    fn empty_working_set_produces_empty_report() {
        let result = report(&BranchData::default(), ReportFilter::Today);
        assert!(result.item_wise.is_empty());
        assert!(result.bill_wise.is_empty());
        assert_eq!(result.day_wise.total_bills, 0);
        assert_eq!(result.day_wise.total_sales, 0.0);
    }
}
