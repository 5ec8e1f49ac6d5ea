//! Sheet-level workbook encoding and decoding.
//!
//! Reads branch workbooks with calamine and writes them with
//! rust_xlsxwriter. Every sheet is a header row followed by data rows;
//! missing sheets decode to empty tables, and rows missing their key
//! column are skipped rather than erroring, because hand-edited sheets
//! are a fact of life for this data.

use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::{Workbook, Worksheet};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use crate::models::{
    Bill, BillItem, BillType, BranchDetails, BranchTables, Offer, Product, User,
    SHEET_BILLS, SHEET_BILL_ITEMS, SHEET_BRANCH_DETAILS, SHEET_CATEGORIES, SHEET_OFFERS,
    SHEET_PRODUCTS, SHEET_SETTINGS, SHEET_USERS,
};

/// Errors from workbook I/O. Flattened to `String` at the store boundary;
/// callers treat any of these as "load (or write) unsuccessful".
#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("failed to open workbook: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse workbook: {0}")]
    Parse(#[from] calamine::XlsxError),
    #[error("failed to write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Parse all named sheets from a workbook file.
pub fn read_workbook(path: &Path) -> Result<BranchTables, WorkbookError> {
    let file = File::open(path)?;
    let mut wb = Xlsx::new(BufReader::new(file))?;
    decode_tables(&mut wb)
}

/// Parse a workbook from an in-memory buffer (sync downloads arrive this way).
pub fn read_workbook_bytes(bytes: &[u8]) -> Result<BranchTables, WorkbookError> {
    let mut wb = Xlsx::new(Cursor::new(bytes.to_vec()))?;
    decode_tables(&mut wb)
}

fn decode_tables<RS: Read + Seek>(wb: &mut Xlsx<RS>) -> Result<BranchTables, WorkbookError> {
    let mut tables = BranchTables::default();

    let rows = sheet_rows(wb, SHEET_BRANCH_DETAILS)?;
    tables.branch_details = decode_branch_details(&rows);

    let rows = sheet_rows(wb, SHEET_PRODUCTS)?;
    tables.products = decode_products(&rows);

    let rows = sheet_rows(wb, SHEET_OFFERS)?;
    tables.offers = decode_offers(&rows);

    let rows = sheet_rows(wb, SHEET_CATEGORIES)?;
    tables.categories = decode_categories(&rows);

    let rows = sheet_rows(wb, SHEET_BILLS)?;
    tables.bills = decode_bills(&rows);

    let rows = sheet_rows(wb, SHEET_BILL_ITEMS)?;
    tables.bill_items = decode_bill_items(&rows);

    let rows = sheet_rows(wb, SHEET_SETTINGS)?;
    tables.settings = decode_settings(&rows);

    let rows = sheet_rows(wb, SHEET_USERS)?;
    tables.users = decode_users(&rows);

    Ok(tables)
}

/// All rows of a sheet, or an empty list when the sheet is absent.
fn sheet_rows<RS: Read + Seek>(
    wb: &mut Xlsx<RS>,
    name: &str,
) -> Result<Vec<Vec<Data>>, calamine::XlsxError> {
    if !wb.sheet_names().iter().any(|s| s == name) {
        return Ok(Vec::new());
    }
    let range = wb.worksheet_range(name)?;
    Ok(range.rows().map(|r| r.to_vec()).collect())
}

/// Map header names to column indexes from the first row.
fn header_index(rows: &[Vec<Data>]) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    if let Some(first) = rows.first() {
        for (col, cell) in first.iter().enumerate() {
            if let Some(name) = cell_string(cell) {
                index.entry(name).or_insert(col);
            }
        }
    }
    index
}

fn field<'a>(index: &HashMap<String, usize>, row: &'a [Data], name: &str) -> Option<&'a Data> {
    index.get(name).and_then(|&col| row.get(col))
}

fn str_field(index: &HashMap<String, usize>, row: &[Data], name: &str) -> String {
    field(index, row, name).and_then(cell_string).unwrap_or_default()
}

fn f64_field(index: &HashMap<String, usize>, row: &[Data], name: &str) -> f64 {
    field(index, row, name).and_then(cell_f64).unwrap_or(0.0)
}

fn u32_field(index: &HashMap<String, usize>, row: &[Data], name: &str) -> Option<u32> {
    field(index, row, name).and_then(cell_u32)
}

fn bool_field(index: &HashMap<String, usize>, row: &[Data], name: &str) -> bool {
    field(index, row, name).map(cell_bool).unwrap_or(false)
}

fn cell_string(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => {
            // Spreadsheet engines store integer-looking values as floats;
            // render them without the trailing ".0".
            if f.fract() == 0.0 && f.abs() < 1e15 {
                Some(format!("{}", *f as i64))
            } else {
                Some(f.to_string())
            }
        }
        Data::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn cell_f64(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn cell_u32(cell: &Data) -> Option<u32> {
    cell_f64(cell).filter(|f| *f >= 0.0).map(|f| f as u32)
}

fn cell_bool(cell: &Data) -> bool {
    match cell {
        Data::Bool(b) => *b,
        Data::Int(i) => *i != 0,
        Data::Float(f) => *f != 0.0,
        Data::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

fn decode_branch_details(rows: &[Vec<Data>]) -> Option<BranchDetails> {
    let index = header_index(rows);
    let row = rows.get(1)?;
    let details = BranchDetails {
        branch_code: str_field(&index, row, "branch_code"),
        name: str_field(&index, row, "name"),
        password: str_field(&index, row, "password"),
        gst: str_field(&index, row, "gst"),
        fssai: str_field(&index, row, "fssai"),
        bill_address: str_field(&index, row, "bill_address"),
        phone: str_field(&index, row, "phone"),
        email: str_field(&index, row, "email"),
        last_sync_ts: str_field(&index, row, "last_sync_ts"),
    };
    (!details.branch_code.is_empty() || !details.name.is_empty()).then_some(details)
}

fn decode_products(rows: &[Vec<Data>]) -> Vec<Product> {
    let index = header_index(rows);
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let product_id = str_field(&index, row, "product_id");
            if product_id.is_empty() {
                return None;
            }
            Some(Product {
                product_id,
                name: str_field(&index, row, "name"),
                category: str_field(&index, row, "category"),
                branch: str_field(&index, row, "branch"),
                price: f64_field(&index, row, "price"),
                // Missing or non-numeric discounts coerce to 0.
                discount: f64_field(&index, row, "discount"),
                shortcut_number: u32_field(&index, row, "shortcut_number").filter(|n| *n > 0),
                add_gst: bool_field(&index, row, "add_gst"),
            })
        })
        .collect()
}

fn decode_offers(rows: &[Vec<Data>]) -> Vec<Offer> {
    let index = header_index(rows);
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let offer_id = str_field(&index, row, "offer_id");
            let name = str_field(&index, row, "name");
            if offer_id.is_empty() && name.is_empty() {
                return None;
            }
            Some(Offer {
                offer_id,
                name,
                discount: f64_field(&index, row, "discount"),
            })
        })
        .collect()
}

fn decode_categories(rows: &[Vec<Data>]) -> Vec<String> {
    let index = header_index(rows);
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let name = str_field(&index, row, "name");
            (!name.is_empty()).then_some(name)
        })
        .collect()
}

fn decode_bills(rows: &[Vec<Data>]) -> Vec<Bill> {
    let index = header_index(rows);
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let bill_no = u32_field(&index, row, "bill_no")?;
            Some(Bill {
                bill_no,
                date_iso: str_field(&index, row, "date_iso"),
                created_at_ts: str_field(&index, row, "created_at_ts"),
                day_boundary: str_field(&index, row, "day_boundary"),
                total: f64_field(&index, row, "total"),
                cgst: f64_field(&index, row, "cgst"),
                sgst: f64_field(&index, row, "sgst"),
                bill_type: BillType::parse(&str_field(&index, row, "billType")),
                printed: bool_field(&index, row, "printed"),
            })
        })
        .collect()
}

fn decode_bill_items(rows: &[Vec<Data>]) -> Vec<BillItem> {
    let index = header_index(rows);
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let bill_no = u32_field(&index, row, "bill_no")?;
            Some(BillItem {
                bill_no,
                product_id: str_field(&index, row, "product_id"),
                name: str_field(&index, row, "name"),
                qty: u32_field(&index, row, "qty").unwrap_or(0),
                price: f64_field(&index, row, "price"),
                total: f64_field(&index, row, "total"),
                date_iso: str_field(&index, row, "date_iso"),
                day_boundary: str_field(&index, row, "day_boundary"),
            })
        })
        .collect()
}

fn decode_settings(rows: &[Vec<Data>]) -> HashMap<String, String> {
    let index = header_index(rows);
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let key = str_field(&index, row, "key");
            (!key.is_empty()).then(|| (key, str_field(&index, row, "value")))
        })
        .collect()
}

fn decode_users(rows: &[Vec<Data>]) -> Vec<User> {
    let index = header_index(rows);
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let username = str_field(&index, row, "username");
            if username.is_empty() {
                return None;
            }
            Some(User {
                username,
                password: str_field(&index, row, "password"),
                role: str_field(&index, row, "role"),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize the complete table set to `path`. The write replaces the whole
/// file content; atomicity (temp + rename) is the store's responsibility.
pub fn write_workbook(path: &Path, tables: &BranchTables) -> Result<(), WorkbookError> {
    let mut workbook = Workbook::new();

    encode_branch_details(workbook.add_worksheet(), tables.branch_details.as_ref())?;
    encode_products(workbook.add_worksheet(), &tables.products)?;
    encode_offers(workbook.add_worksheet(), &tables.offers)?;
    encode_categories(workbook.add_worksheet(), &tables.categories)?;
    encode_bills(workbook.add_worksheet(), &tables.bills)?;
    encode_bill_items(workbook.add_worksheet(), &tables.bill_items)?;
    encode_settings(workbook.add_worksheet(), &tables.settings)?;
    encode_users(workbook.add_worksheet(), &tables.users)?;

    workbook.save(path)?;
    Ok(())
}

fn write_header(ws: &mut Worksheet, headers: &[&str]) -> Result<(), rust_xlsxwriter::XlsxError> {
    for (col, name) in headers.iter().enumerate() {
        ws.write_string(0, col as u16, *name)?;
    }
    Ok(())
}

fn encode_branch_details(
    ws: &mut Worksheet,
    details: Option<&BranchDetails>,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    ws.set_name(SHEET_BRANCH_DETAILS)?;
    write_header(
        ws,
        &[
            "branch_code",
            "name",
            "password",
            "gst",
            "fssai",
            "bill_address",
            "phone",
            "email",
            "last_sync_ts",
        ],
    )?;
    if let Some(d) = details {
        ws.write_string(1, 0, &d.branch_code)?;
        ws.write_string(1, 1, &d.name)?;
        ws.write_string(1, 2, &d.password)?;
        ws.write_string(1, 3, &d.gst)?;
        ws.write_string(1, 4, &d.fssai)?;
        ws.write_string(1, 5, &d.bill_address)?;
        ws.write_string(1, 6, &d.phone)?;
        ws.write_string(1, 7, &d.email)?;
        ws.write_string(1, 8, &d.last_sync_ts)?;
    }
    Ok(())
}

fn encode_products(
    ws: &mut Worksheet,
    products: &[Product],
) -> Result<(), rust_xlsxwriter::XlsxError> {
    ws.set_name(SHEET_PRODUCTS)?;
    write_header(
        ws,
        &[
            "product_id",
            "name",
            "category",
            "branch",
            "price",
            "discount",
            "shortcut_number",
            "add_gst",
        ],
    )?;
    for (i, p) in products.iter().enumerate() {
        let row = (i + 1) as u32;
        ws.write_string(row, 0, &p.product_id)?;
        ws.write_string(row, 1, &p.name)?;
        ws.write_string(row, 2, &p.category)?;
        ws.write_string(row, 3, &p.branch)?;
        ws.write_number(row, 4, p.price)?;
        ws.write_number(row, 5, p.discount)?;
        if let Some(n) = p.shortcut_number {
            ws.write_number(row, 6, n as f64)?;
        }
        ws.write_number(row, 7, if p.add_gst { 1.0 } else { 0.0 })?;
    }
    Ok(())
}

fn encode_offers(ws: &mut Worksheet, offers: &[Offer]) -> Result<(), rust_xlsxwriter::XlsxError> {
    ws.set_name(SHEET_OFFERS)?;
    write_header(ws, &["offer_id", "name", "discount"])?;
    for (i, o) in offers.iter().enumerate() {
        let row = (i + 1) as u32;
        ws.write_string(row, 0, &o.offer_id)?;
        ws.write_string(row, 1, &o.name)?;
        ws.write_number(row, 2, o.discount)?;
    }
    Ok(())
}

fn encode_categories(
    ws: &mut Worksheet,
    categories: &[String],
) -> Result<(), rust_xlsxwriter::XlsxError> {
    ws.set_name(SHEET_CATEGORIES)?;
    write_header(ws, &["name"])?;
    for (i, name) in categories.iter().enumerate() {
        ws.write_string((i + 1) as u32, 0, name)?;
    }
    Ok(())
}

fn encode_bills(ws: &mut Worksheet, bills: &[Bill]) -> Result<(), rust_xlsxwriter::XlsxError> {
    ws.set_name(SHEET_BILLS)?;
    write_header(
        ws,
        &[
            "bill_no",
            "date_iso",
            "created_at_ts",
            "day_boundary",
            "total",
            "cgst",
            "sgst",
            "billType",
            "printed",
        ],
    )?;
    for (i, b) in bills.iter().enumerate() {
        let row = (i + 1) as u32;
        ws.write_number(row, 0, b.bill_no as f64)?;
        ws.write_string(row, 1, &b.date_iso)?;
        ws.write_string(row, 2, &b.created_at_ts)?;
        ws.write_string(row, 3, &b.day_boundary)?;
        ws.write_number(row, 4, b.total)?;
        ws.write_number(row, 5, b.cgst)?;
        ws.write_number(row, 6, b.sgst)?;
        ws.write_string(row, 7, b.bill_type.as_str())?;
        ws.write_number(row, 8, if b.printed { 1.0 } else { 0.0 })?;
    }
    Ok(())
}

fn encode_bill_items(
    ws: &mut Worksheet,
    items: &[BillItem],
) -> Result<(), rust_xlsxwriter::XlsxError> {
    ws.set_name(SHEET_BILL_ITEMS)?;
    write_header(
        ws,
        &[
            "bill_no",
            "product_id",
            "name",
            "qty",
            "price",
            "total",
            "date_iso",
            "day_boundary",
        ],
    )?;
    for (i, item) in items.iter().enumerate() {
        let row = (i + 1) as u32;
        ws.write_number(row, 0, item.bill_no as f64)?;
        ws.write_string(row, 1, &item.product_id)?;
        ws.write_string(row, 2, &item.name)?;
        ws.write_number(row, 3, item.qty as f64)?;
        ws.write_number(row, 4, item.price)?;
        ws.write_number(row, 5, item.total)?;
        ws.write_string(row, 6, &item.date_iso)?;
        ws.write_string(row, 7, &item.day_boundary)?;
    }
    Ok(())
}

fn encode_settings(
    ws: &mut Worksheet,
    settings: &HashMap<String, String>,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    ws.set_name(SHEET_SETTINGS)?;
    write_header(ws, &["key", "value"])?;
    // Sorted for deterministic output.
    let mut entries: Vec<_> = settings.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (i, (key, value)) in entries.iter().enumerate() {
        let row = (i + 1) as u32;
        ws.write_string(row, 0, key.as_str())?;
        ws.write_string(row, 1, value.as_str())?;
    }
    Ok(())
}

fn encode_users(ws: &mut Worksheet, users: &[User]) -> Result<(), rust_xlsxwriter::XlsxError> {
    ws.set_name(SHEET_USERS)?;
    write_header(ws, &["username", "password", "role"])?;
    for (i, u) in users.iter().enumerate() {
        let row = (i + 1) as u32;
        ws.write_string(row, 0, &u.username)?;
        ws.write_string(row, 1, &u.password)?;
        ws.write_string(row, 2, &u.role)?;
    }
    Ok(())
}
