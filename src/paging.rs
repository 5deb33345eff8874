//! `value` / `nextLink` pagination shared by the management API and Dataverse.

use std::marker::PhantomData;

use log::{debug, error};
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::http::ensure_success;

/// One page of a paginated collection.
#[derive(Debug, Deserialize)]
pub struct PageEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "nextLink", alias = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// Everything a pagination pass managed to collect.
#[derive(Debug)]
pub struct PageFetch<T> {
    pub items: Vec<T>,
    pub pages: usize,
    /// Set when a page request failed and pagination stopped early.
    pub error: Option<ApiError>,
}

impl<T> PageFetch<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// All items, or the error if any page failed.
    pub fn complete(self) -> Result<Vec<T>, ApiError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.items),
        }
    }

    /// Treat a pass that failed before producing anything as an error; keep
    /// partial results otherwise.
    pub fn into_result(self) -> Result<Vec<T>, ApiError> {
        match self.error {
            Some(err) if self.items.is_empty() => Err(err),
            _ => Ok(self.items),
        }
    }
}

/// Walks a collection one page at a time. Once the last page has been
/// returned, or a request has failed, the pager is exhausted for good.
pub struct Pager<T> {
    client: Client,
    token: String,
    headers: HeaderMap,
    next_url: Option<String>,
    pages: usize,
    _item: PhantomData<T>,
}

impl<T: DeserializeOwned> Pager<T> {
    pub fn new(client: &Client, url: impl Into<String>, token: &str) -> Self {
        Self {
            client: client.clone(),
            token: token.to_string(),
            headers: HeaderMap::new(),
            next_url: Some(url.into()),
            pages: 0,
            _item: PhantomData,
        }
    }

    /// Extra headers sent with every page request.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub async fn next_page(&mut self) -> Option<Result<Vec<T>, ApiError>> {
        let url = self.next_url.take()?;
        debug!("GET page {}: {}", self.pages + 1, url);

        match self.get_page(&url).await {
            Ok(envelope) => {
                self.pages += 1;
                self.next_url = envelope.next_link.filter(|link| !link.trim().is_empty());
                Some(Ok(envelope.value))
            }
            Err(err) => Some(Err(err)),
        }
    }

    async fn get_page(&self, url: &str) -> Result<PageEnvelope<T>, ApiError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .headers(self.headers.clone())
            .send()
            .await?;

        let resp = ensure_success(resp).await?;
        resp.json::<PageEnvelope<T>>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse page: {e}")))
    }

    /// Drain the pager. A failing page ends the pass; whatever was gathered
    /// before it is returned together with the error.
    pub async fn collect_all(mut self) -> PageFetch<T> {
        let mut items = Vec::new();
        let mut failure = None;

        while let Some(page) = self.next_page().await {
            match page {
                Ok(values) => items.extend(values),
                Err(err) => {
                    error!(
                        "Pagination stopped after {} page(s), {} item(s) kept: {}",
                        self.pages, items.len(), err
                    );
                    failure = Some(err);
                    break;
                }
            }
        }

        PageFetch {
            items,
            pages: self.pages,
            error: failure,
        }
    }
}

/// One full pass over a collection.
pub async fn fetch_all_pages<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    token: &str,
) -> PageFetch<T> {
    Pager::new(client, url, token).collect_all().await
}
