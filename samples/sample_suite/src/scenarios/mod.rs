pub mod environments;
pub mod recent_failures;
