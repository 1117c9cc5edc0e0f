mod compliance;
mod docs;
mod health;

pub use compliance::{check_compliance, get_aircraft, get_regulation};
pub use docs::{docs, openapi};
pub use health::{health_check, readiness_check, stats};
