use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, IF_NONE_MATCH};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::dataverse::entity::Entity;
use crate::dataverse::parse::parse_entity;
use crate::error::ApiError;
use crate::http::{ODATA_VERSION, ensure_success};
use crate::paging::{PageFetch, Pager};

const API_PATH: &str = "api/data/v9.2";
const ENTITY_ID_HEADER: &str = "OData-EntityId";
/// Dataverse "duplicate key" error code.
const DUPLICATE_KEY_CODE: &str = "0x80040237";

/// Result of a create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Row created; carries the new id when the server returned it.
    Created(Option<Uuid>),
    /// A row with the same key already exists.
    DuplicateKey,
}

/// Escape a literal for use inside a quoted OData string.
pub fn escape_odata_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// HTTP client for Dataverse Web API operations.
pub struct ServiceClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ServiceClient {
    /// Create a new client for the given base URL and access token.
    pub fn new(client: &Client, base_url: &str, token: &str) -> Self {
        Self {
            client: client.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn entity_set_url(&self, entity_set: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PATH, entity_set)
    }

    fn odata_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("odata-maxversion", HeaderValue::from_static(ODATA_VERSION));
        headers.insert("odata-version", HeaderValue::from_static(ODATA_VERSION));
        headers
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        log::debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .headers(Self::odata_headers())
    }

    /// Retrieve every row matching an OData query string
    /// (`$select=...&$filter=...`), following `@odata.nextLink`.
    pub async fn retrieve_multiple(&self, entity_set: &str, query: &str) -> PageFetch<Entity> {
        let mut url = self.entity_set_url(entity_set);
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }

        let fetch = Pager::<Value>::new(&self.client, url, &self.token)
            .with_headers(Self::odata_headers())
            .collect_all()
            .await;

        let mut entities = Vec::with_capacity(fetch.items.len());
        for record in &fetch.items {
            match parse_entity(record) {
                Ok(entity) => entities.push(entity),
                Err(err) => log::warn!("Skipping {} row: {}", entity_set, err),
            }
        }

        PageFetch {
            items: entities,
            pages: fetch.pages,
            error: fetch.error,
        }
    }

    /// True when at least one row has `attribute eq 'value'`.
    pub async fn exists(
        &self,
        entity_set: &str,
        attribute: &str,
        value: &str,
    ) -> Result<bool, ApiError> {
        let filter = format!("{} eq '{}'", attribute, escape_odata_string(value));
        let url = format!(
            "{}?$select={}&$filter={}&$top=1",
            self.entity_set_url(entity_set),
            attribute,
            urlencoding::encode(&filter)
        );

        let resp = self.request(Method::GET, &url).send().await?;
        let resp = ensure_success(resp).await?;
        let json: Value = resp
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {e}")))?;

        let rows = json
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::InvalidResponse("Invalid response from Dataverse".into()))?;
        Ok(!rows.is_empty())
    }

    /// Create a row with a plain POST.
    pub async fn create(
        &self,
        entity_set: &str,
        attributes: &Map<String, Value>,
    ) -> Result<CreateOutcome, ApiError> {
        let url = self.entity_set_url(entity_set);
        let resp = self
            .request(Method::POST, &url)
            .json(attributes)
            .send()
            .await?;

        created_outcome(ensure_success(resp).await)
    }

    /// Create a row addressed by an alternate key. `If-None-Match: *` makes
    /// the upsert create-only, so an existing row is reported instead of
    /// overwritten.
    pub async fn create_by_alternate_key(
        &self,
        entity_set: &str,
        key_attribute: &str,
        key_value: &str,
        attributes: &Map<String, Value>,
    ) -> Result<CreateOutcome, ApiError> {
        let url = format!(
            "{}({}='{}')",
            self.entity_set_url(entity_set),
            key_attribute,
            urlencoding::encode(&escape_odata_string(key_value))
        );
        let resp = self
            .request(Method::PATCH, &url)
            .header(IF_NONE_MATCH, "*")
            .json(attributes)
            .send()
            .await?;

        created_outcome(ensure_success(resp).await)
    }
}

fn created_outcome(
    resp: Result<reqwest::Response, ApiError>,
) -> Result<CreateOutcome, ApiError> {
    match resp {
        Ok(resp) => {
            let id = resp
                .headers()
                .get(ENTITY_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_entity_id);
            Ok(CreateOutcome::Created(id))
        }
        Err(err) if is_duplicate_key(&err) => Ok(CreateOutcome::DuplicateKey),
        Err(err) => Err(err),
    }
}

pub(crate) fn is_duplicate_key(err: &ApiError) -> bool {
    match err {
        ApiError::UnexpectedStatus { status, message } => {
            *status == StatusCode::PRECONDITION_FAILED
                || *status == StatusCode::CONFLICT
                || message.contains(DUPLICATE_KEY_CODE)
        }
        _ => false,
    }
}

/// Pull the row id out of an `OData-EntityId` header such as
/// `https://org.crm.dynamics.com/api/data/v9.2/accounts(00000000-0000-0000-0000-000000000001)`.
fn parse_entity_id(header: &str) -> Option<Uuid> {
    let start = header.rfind('(')? + 1;
    let end = header[start..].find(')')? + start;
    Uuid::parse_str(&header[start..end]).ok()
}
