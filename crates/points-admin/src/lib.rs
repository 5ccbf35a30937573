//! Admin console operations: grants/deductions, role and activation changes,
//! and read-side analytics.

pub mod analytics;
pub mod grant_deduct;
pub mod profile;

pub use analytics::{daily_stats, monthly_aggregates, top_holders, type_breakdown};
pub use grant_deduct::{deduct_points, grant_points};
pub use profile::set_role_and_active;
