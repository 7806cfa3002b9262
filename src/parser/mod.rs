pub mod aggregate;
pub mod works;

pub use aggregate::extract_aggregate;
pub use works::extract_per_work;
