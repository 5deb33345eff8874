/// Generic Dataverse rows.
pub mod entity;
/// Failure-record table used by the run monitor.
pub mod failurestore;
pub(crate) mod parse;
/// HTTP client for the Dataverse Web API.
pub mod serviceclient;

pub use failurestore::{DataverseFailureStore, FailureRecord, FailureStore, InsertOutcome, TableSchema};
pub use serviceclient::ServiceClient;
