//! Per-peak final tables: join, impute, winsorize, standardize.

mod assemble;
mod post;
mod schema;

pub use assemble::{build_tables, join};
pub use post::{ColumnScale, StandardizationSidecar, impute_mean, quantile, standardize, winsorize};
pub use schema::{FINAL_COLUMNS, GRID_ID, TARGET};
