use crate::core::retry::{RetryPolicies, RetryPolicy};
use crate::core::stats::RunStats;
use crate::domain::model::{Identifier, ListingPage, RawRecord};
use crate::utils::error::{EtlError, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

pub const ANIMALS_PATH: &str = "/animals/v1/animals";

/// Reads the listing and detail endpoints of the source API.
pub struct SourceFetcher {
    client: Client,
    base_url: String,
    read_policy: RetryPolicy,
    page_policy: RetryPolicy,
    timeout: Duration,
}

impl SourceFetcher {
    pub fn new(client: Client, base_url: &str, policies: &RetryPolicies, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            read_policy: policies.read.clone(),
            page_policy: policies.pagination.clone(),
            timeout,
        }
    }

    pub fn listing_url(&self) -> String {
        format!("{}{}", self.base_url, ANIMALS_PATH)
    }

    pub fn detail_url(&self, id: Identifier) -> String {
        format!("{}{}/{}", self.base_url, ANIMALS_PATH, id)
    }

    /// Fetches one listing page under the read policy.
    pub async fn fetch_page(&self, page: u64) -> Result<ListingPage> {
        self.fetch_page_with(page, &self.read_policy).await
    }

    async fn fetch_page_with(&self, page: u64, policy: &RetryPolicy) -> Result<ListingPage> {
        let url = self.listing_url();

        policy
            .run("fetch page", || {
                let url = url.clone();
                async move {
                    tracing::debug!("Fetching page {} from {}", page, url);
                    let response = self
                        .client
                        .get(&url)
                        .query(&[("page", page)])
                        .timeout(self.timeout)
                        .send()
                        .await?;

                    let status = response.status();
                    if !status.is_success() {
                        if status.is_server_error() {
                            tracing::warn!("Server error {} on page {}", status, page);
                        } else {
                            tracing::error!("HTTP error {} on page {}", status, page);
                        }
                        return Err(http_error(url, status, response.text().await.ok()));
                    }

                    let body = response.text().await?;
                    serde_json::from_str::<ListingPage>(&body).map_err(|e| {
                        EtlError::UnexpectedResponse {
                            url,
                            message: format!("unexpected listing structure on page {}: {}", page, e),
                        }
                    })
                }
            })
            .await
    }

    /// Walks the listing from page 1 until an empty page or the last page
    /// announced by `total_pages`. Identifiers keep first-seen order without
    /// duplicates. Any page failure is logged to `stats` and aborts the walk.
    pub async fn fetch_all_identifiers(&self, stats: &mut RunStats) -> Result<Vec<Identifier>> {
        tracing::info!("🔎 Starting to fetch paginated animals");

        let mut seen = HashSet::new();
        let mut identifiers = Vec::new();
        let mut page: u64 = 1;
        let mut total_pages: Option<u64> = None;

        loop {
            let listing = match self.fetch_page_with(page, &self.page_policy).await {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::error!("❌ Fatal error fetching page {}: {}", page, e);
                    stats.add_error(format!("Page {} failed permanently: {}", page, e));
                    return Err(e);
                }
            };

            // 沒帶 total_pages 的頁面沿用前一頁的值
            total_pages = listing.total_pages.or(total_pages);

            if listing.items.is_empty() {
                break;
            }

            let mut found = 0;
            for id in listing.identifiers() {
                found += 1;
                if seen.insert(id) {
                    identifiers.push(id);
                }
            }

            tracing::info!(
                "📄 Page {}/{}: Found {} animals",
                page,
                total_pages.map_or_else(|| "?".to_string(), |t| t.to_string()),
                found
            );

            if total_pages.is_some_and(|total| total > 0 && page >= total) {
                break;
            }
            page += 1;
        }

        tracing::info!("📊 Total unique animals found: {}", identifiers.len());
        Ok(identifiers)
    }

    /// Fetches one record. A 404 becomes [`EtlError::NotFound`] and is not retried.
    pub async fn fetch_detail(&self, id: Identifier) -> Result<RawRecord> {
        let url = self.detail_url(id);

        self.read_policy
            .run("fetch detail", || {
                let url = url.clone();
                async move {
                    tracing::debug!("Fetching details for animal {}", id);
                    let response = self.client.get(&url).timeout(self.timeout).send().await?;

                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        tracing::warn!("Animal {} not found", id);
                        return Err(EtlError::NotFound { id });
                    }
                    if !status.is_success() {
                        if status.is_server_error() {
                            tracing::warn!("Server error {} fetching animal {}", status, id);
                        } else {
                            tracing::error!("HTTP error {} fetching animal {}", status, id);
                        }
                        return Err(http_error(url, status, response.text().await.ok()));
                    }

                    let body = response.text().await?;
                    let record = match serde_json::from_str::<Value>(&body) {
                        Ok(Value::Object(data)) => RawRecord::new(data),
                        Ok(other) => {
                            return Err(EtlError::UnexpectedResponse {
                                url,
                                message: format!("expected a JSON object, got {}", json_type(&other)),
                            })
                        }
                        Err(e) => {
                            return Err(EtlError::UnexpectedResponse {
                                url,
                                message: e.to_string(),
                            })
                        }
                    };

                    if record.id().is_none() {
                        return Err(EtlError::UnexpectedResponse {
                            url,
                            message: "record has no numeric id".to_string(),
                        });
                    }
                    Ok(record)
                }
            })
            .await
    }
}

fn http_error(url: String, status: StatusCode, body: Option<String>) -> EtlError {
    EtlError::Http {
        url,
        status: status.as_u16(),
        body,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
