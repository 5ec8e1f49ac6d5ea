//! Single-location retail POS back office: per-branch spreadsheet storage,
//! billing, sales reports, and workbook sync against a central backup
//! server.
//!
//! All state for one branch lives in a single workbook file; the
//! [`cache::BranchCache`] is the only path through which those files are
//! read and mutated.

use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod auth;
pub mod billing;
pub mod business_day;
pub mod cache;
pub mod models;
pub mod reports;
pub mod settings;
pub mod store;
pub mod sync;
pub mod workbook;

pub use billing::{
    compute_bill_totals, create_bill, mark_printed, BillDraft, BillItemInput, BillTotals,
};
pub use cache::{BranchCache, BranchCatalog, BranchData};
pub use models::{Bill, BillItem, BillType, BranchDetails, Offer, Product, User};
pub use reports::{report, ReportData, ReportFilter};
pub use settings::{load_global_settings, save_global_settings, GlobalSettings};
pub use store::SpreadsheetStore;
pub use sync::{PushResult, SyncClient};

/// Initialize structured logging (console + rolling daily file under
/// `<root>/logs`). The returned guard must stay alive for the process
/// lifetime; dropping it flushes and stops the file writer.
pub fn init_logging(root: &Path) -> WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,branch_pos=debug"));

    let log_dir = root.join("logs");
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "pos");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Starting branch POS v{}", env!("CARGO_PKG_VERSION"));
    guard
}
