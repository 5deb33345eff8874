/// Management and admin API clients.
pub mod client;
/// Flow, run and environment types.
pub mod model;
/// OAuth protected HTTP trigger invocation.
pub mod trigger;

pub use client::{AdminClient, FlowClient};
pub use model::{Environment, Flow, FlowRun, RunStatus};
