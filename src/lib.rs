//! # FP&A Engine
//!
//! Forecasting, P&L aggregation and variance analysis over a flat store of
//! monthly financial records.
//!
//! ## Core Concepts
//!
//! - **Records**: Atomic `(period, type, plan, account, cost center, product line, amount)` facts.
//!   Actuals carry no plan; Budget and Forecast records always do.
//! - **Dimension Registry**: Maps account codes to one of seven P&L categories and carries
//!   external codes used on export
//! - **Forecast Engine**: Projects an account/dimension intersection forward with a Trend,
//!   year-over-year growth, manual or percent-of-revenue rule
//! - **Overlay**: Spreads included risks and opportunities over a plan without touching the
//!   caller's records
//! - **Variance**: Ranks accounts by actual-vs-plan delta and builds the revenue-to-EBITDA bridge
//!
//! ## Example
//!
//! ```rust,ignore
//! use fpa_engine::*;
//!
//! let mut workbench = Workbench::load("snapshot.json")?;
//!
//! let assumption = ForecastAssumption::new("plan-2025-base", "REV_SUB", ForecastMethod::Trend)
//!     .with_product_line("PL_IOT");
//! workbench.upsert_assumption(assumption.clone())?;
//! workbench.commit_assumption(&assumption.id)?;
//!
//! let window = workbench.pnl_window(
//!     TimeBasis::Quarterly,
//!     "2025-05".parse()?,
//!     &RecordFilter::plan("plan-2025-base"),
//! );
//! println!("Q2 EBITDA {} vs prior year {}", window.current.ebitda, window.prior_year.ebitda);
//!
//! for driver in workbench.variance_drivers("plan-2025-base", None) {
//!     println!("{}: {}", driver.account_name, driver.variance);
//! }
//!
//! workbench.save("snapshot.json")?;
//! ```

pub mod advisory;
pub mod aggregator;
pub mod engine;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod overlay;
pub mod registry;
pub mod schema;
pub mod store;
pub mod utils;
pub mod variance;

pub use advisory::{build_context, Benchmark, BENCHMARKS};
pub use aggregator::{
    aggregate, prior_year_periods, resolve_periods, sum_by_category, EntityFilter,
    PnlAggregator, PnlSummary, PnlWindow, RecordFilter, TimeBasis,
};
pub use engine::{generate_forecast, linear_regression, ForecastEngine, ForecastSettings};
pub use error::{FpaError, Result};
pub use export::records_to_csv;
pub use ingestion::{read_actuals_csv, ActualRow};
pub use overlay::{apply_risks_and_ops, overlay_with_adjustments, strip_adjustments, OverlayAdjustment};
pub use registry::DimensionRegistry;
pub use schema::*;
pub use store::{Dataset, Workbench, WorkbenchSettings};
pub use utils::*;
pub use variance::{
    analyze_variance, analyze_variance_top, generate_profit_walk, variance_pct, ProfitWalk,
    VarianceDriver, WalkLine,
};
