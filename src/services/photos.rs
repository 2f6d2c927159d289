use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::auth::Credential;
use crate::models::{DateQuery, MediaItem};

const SEARCH_URL: &str = "https://photoslibrary.googleapis.com/v1/mediaItems:search";
const PAGE_SIZE: u32 = 50;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("photo library error ({status}): {detail}")]
    Api {
        status: reqwest::StatusCode,
        detail: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Photo library search collaborator. Returns an empty list, never an error,
/// when nothing matches.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn search(
        &self,
        category: Option<&str>,
        date: Option<DateQuery>,
    ) -> Result<Vec<MediaItem>, SearchError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    page_size: u32,
    filters: SearchFilters,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_filter: Option<DateFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_filter: Option<ContentFilter>,
}

#[derive(Debug, Serialize)]
struct DateFilter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dates: Vec<ApiDate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ranges: Vec<DateRange>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateRange {
    start_date: ApiDate,
    end_date: ApiDate,
}

#[derive(Debug, Serialize)]
struct ApiDate {
    year: i32,
    month: u32,
    day: u32,
}

impl From<NaiveDate> for ApiDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentFilter {
    included_content_categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    media_items: Vec<MediaItem>,
}

fn build_search_body(category: Option<&str>, date: Option<DateQuery>) -> SearchRequest {
    let date_filter = date.map(|query| match query {
        DateQuery::On(day) => DateFilter {
            dates: vec![day.into()],
            ranges: vec![],
        },
        DateQuery::Between(start, end) => DateFilter {
            dates: vec![],
            ranges: vec![DateRange {
                start_date: start.into(),
                end_date: end.into(),
            }],
        },
    });

    let content_filter = category.map(|term| ContentFilter {
        included_content_categories: vec![term.to_uppercase()],
    });

    SearchRequest {
        page_size: PAGE_SIZE,
        filters: SearchFilters {
            date_filter,
            content_filter,
        },
    }
}

/// Google Photos Library API client, scoped to read-only search.
pub struct PhotoLibraryClient {
    credential: Credential,
    client: reqwest::Client,
}

impl PhotoLibraryClient {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MediaSource for PhotoLibraryClient {
    async fn search(
        &self,
        category: Option<&str>,
        date: Option<DateQuery>,
    ) -> Result<Vec<MediaItem>, SearchError> {
        let body = build_search_body(category, date);
        log::debug!(
            "🔍 Photo search request: {}",
            serde_json::to_string(&body).unwrap_or_default()
        );

        let response = self
            .client
            .post(SEARCH_URL)
            .bearer_auth(&self.credential.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await?;
            log::error!("❌ Photo search failed ({}): {}", status, detail);
            return Err(SearchError::Api { status, detail });
        }

        let parsed: SearchResponse = response.json().await?;
        log::info!("🔍 Photo search returned {} item(s)", parsed.media_items.len());
        Ok(parsed.media_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_date_body() {
        let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let body = build_search_body(Some("food"), Some(DateQuery::On(day)));

        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(
            encoded,
            json!({
                "pageSize": 50,
                "filters": {
                    "dateFilter": { "dates": [{ "year": 2024, "month": 7, "day": 1 }] },
                    "contentFilter": { "includedContentCategories": ["FOOD"] }
                }
            })
        );
    }

    #[test]
    fn test_date_range_body() {
        let start = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 8, 10).unwrap();
        let body = build_search_body(None, Some(DateQuery::Between(start, end)));

        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(
            encoded,
            json!({
                "pageSize": 50,
                "filters": {
                    "dateFilter": {
                        "ranges": [{
                            "startDate": { "year": 2024, "month": 7, "day": 1 },
                            "endDate": { "year": 2024, "month": 8, "day": 10 }
                        }]
                    }
                }
            })
        );
    }

    #[test]
    fn test_unfiltered_body() {
        let body = build_search_body(None, None);
        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded, json!({ "pageSize": 50, "filters": {} }));
    }

    #[test]
    fn test_response_without_items_is_empty() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.media_items.is_empty());
    }

    #[test]
    fn test_response_with_items() {
        let raw = r#"{"mediaItems":[{"id":"m1","filename":"lunch.jpg","baseUrl":"https://example.com/m1"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(parsed.media_items.len(), 1);
        assert_eq!(parsed.media_items[0].filename, "lunch.jpg");
    }
}
