mod api;
mod catalog;

pub use api::{
    ComplianceCheckRequest, ComplianceCheckResponse, ComplianceFinding, HealthResponse,
    PolicySummary, RateLimitStats, StatsResponse,
};
pub use catalog::{Aircraft, Catalog, Regulation};
