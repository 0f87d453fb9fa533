pub mod metrics;
pub mod query;
pub mod response;
