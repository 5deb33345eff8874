use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::dataverse::serviceclient::{CreateOutcome, ServiceClient};
use crate::error::ApiError;
use crate::flows::model::FlowRun;

/// A failed run that has been written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub flow_run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub run_status: String,
    pub is_aborted: bool,
}

impl From<&FlowRun> for FailureRecord {
    fn from(run: &FlowRun) -> Self {
        FailureRecord {
            flow_run_id: run.run_id.clone(),
            start_time: run.start_time,
            end_time: run.end_time,
            run_status: run.status.to_string(),
            is_aborted: run.is_aborted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The store already held a row for this run id.
    AlreadyRecorded,
}

/// Persistent record of failures already seen, keyed by flow run id.
#[async_trait]
pub trait FailureStore: Send + Sync {
    async fn exists(&self, flow_run_id: &str) -> Result<bool, ApiError>;

    async fn insert(&self, record: &FailureRecord) -> Result<InsertOutcome, ApiError>;
}

/// Column layout of the failure table: every column is `<prefix>_<name>`.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub entity_set: String,
    pub prefix: String,
}

impl TableSchema {
    pub fn new(entity_set: &str, prefix: &str) -> Self {
        Self {
            entity_set: entity_set.trim().to_string(),
            prefix: prefix.trim().trim_end_matches('_').to_string(),
        }
    }

    pub fn column(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    pub fn key_column(&self) -> String {
        self.column("flowrunid")
    }

    pub fn row(&self, record: &FailureRecord) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert(self.key_column(), json!(record.flow_run_id));
        row.insert(self.column("starttime"), json!(format_timestamp(record.start_time)));
        row.insert(
            self.column("endtime"),
            record
                .end_time
                .map(|end| json!(format_timestamp(end)))
                .unwrap_or(Value::Null),
        );
        row.insert(self.column("runstatus"), json!(record.run_status));
        row.insert(self.column("isaborted"), json!(record.is_aborted));
        row
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `FailureStore` backed by a custom Dataverse table.
pub struct DataverseFailureStore {
    client: ServiceClient,
    schema: TableSchema,
    use_alternate_key: bool,
}

impl DataverseFailureStore {
    pub fn new(client: ServiceClient, schema: TableSchema) -> Self {
        Self {
            client,
            schema,
            use_alternate_key: false,
        }
    }

    /// Insert through the table's alternate key on the run id column so the
    /// store itself rejects duplicates.
    pub fn with_alternate_key(mut self, enabled: bool) -> Self {
        self.use_alternate_key = enabled;
        self
    }
}

#[async_trait]
impl FailureStore for DataverseFailureStore {
    async fn exists(&self, flow_run_id: &str) -> Result<bool, ApiError> {
        self.client
            .exists(&self.schema.entity_set, &self.schema.key_column(), flow_run_id)
            .await
    }

    async fn insert(&self, record: &FailureRecord) -> Result<InsertOutcome, ApiError> {
        let row = self.schema.row(record);
        let outcome = if self.use_alternate_key {
            self.client
                .create_by_alternate_key(
                    &self.schema.entity_set,
                    &self.schema.key_column(),
                    &record.flow_run_id,
                    &row,
                )
                .await?
        } else {
            self.client.create(&self.schema.entity_set, &row).await?
        };

        Ok(match outcome {
            CreateOutcome::Created(id) => {
                if let Some(id) = id {
                    log::debug!("Created {} row {}", self.schema.entity_set, id);
                }
                InsertOutcome::Inserted
            }
            CreateOutcome::DuplicateKey => InsertOutcome::AlreadyRecorded,
        })
    }
}
