//! Portal REST access.
//!
//! `PortalApi` is the seam between the inventory pipeline and the network;
//! `HttpPortal` is the `ureq` implementation used by the CLI.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use ureq::Agent;

/// Page size used for search requests.
pub const SEARCH_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("portal error {code} from {url}: {message}")]
    Api {
        url: String,
        code: i64,
        message: String,
    },
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Item metadata as returned by the search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalItem {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub item_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub owner: String,
    /// Epoch milliseconds.
    #[serde(deserialize_with = "null_as_default")]
    pub created: i64,
    /// Epoch milliseconds.
    #[serde(deserialize_with = "null_as_default")]
    pub modified: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub access: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    pub snippet: Option<String>,
    pub description: Option<String>,
    pub access_information: Option<String>,
    pub license_info: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub num_views: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub num_comments: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub avg_rating: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub size: i64,
    pub content_status: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub categories: Vec<String>,
    pub url: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchPage {
    pub total: u64,
    /// `-1` once the last page has been returned.
    pub next_start: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub results: Vec<PortalItem>,
}

/// Portals send explicit `null` for unset lists and counts.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Read-only portal operations used by the inventory.
pub trait PortalApi {
    /// Base portal URL without a trailing slash.
    fn portal_url(&self) -> &str;

    fn search(&self, query: &str, start: i64, num: u32) -> Result<SearchPage, PortalError>;

    /// The item's data document; `None` when the item has no JSON data.
    fn item_data(&self, id: &str) -> Result<Option<Value>, PortalError>;

    /// Titles of the groups the item is shared with.
    fn item_groups(&self, id: &str) -> Result<Vec<String>, PortalError>;

    /// Request count over the last `days`; `None` when the portal keeps no
    /// usage statistics for the item.
    fn item_usage(&self, id: &str, days: u32) -> Result<Option<u64>, PortalError>;

    fn item_page_url(&self, id: &str) -> String {
        format!("{}/home/item.html?id={id}", self.portal_url())
    }

    fn thumbnail_url(&self, id: &str, thumbnail: &str) -> String {
        format!(
            "{}/sharing/rest/content/items/{id}/info/{thumbnail}",
            self.portal_url()
        )
    }
}

/// `ureq`-backed portal session.
pub struct HttpPortal {
    base: String,
    token: Option<String>,
    agent: Agent,
}

impl HttpPortal {
    pub fn new(portal_url: &str, token: Option<String>, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            base: portal_url.trim_end_matches('/').to_string(),
            token: token.filter(|token| !token.trim().is_empty()),
            agent: Agent::new_with_config(config),
        }
    }

    fn get_text(&self, path: &str, params: &[(&str, String)]) -> Result<(String, String), PortalError> {
        let url = format!("{}/sharing/rest/{path}", self.base);
        let mut request = self.agent.get(&url).query("f", "json");
        if let Some(token) = &self.token {
            request = request.query("token", token);
        }
        for (key, value) in params {
            request = request.query(*key, value);
        }
        tracing::debug!(%url, "portal request");
        let http_error = |source: ureq::Error| PortalError::Http {
            url: url.clone(),
            source: Box::new(source),
        };
        let mut response = request.call().map_err(http_error)?;
        let body = response.body_mut().read_to_string().map_err(http_error)?;
        Ok((url, body))
    }

    fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, PortalError> {
        let (url, body) = self.get_text(path, params)?;
        let value: Value = serde_json::from_str(&body).map_err(|err| PortalError::Decode {
            url: url.clone(),
            reason: err.to_string(),
        })?;
        check_portal_error(&url, &value)?;
        Ok(value)
    }
}

impl PortalApi for HttpPortal {
    fn portal_url(&self) -> &str {
        &self.base
    }

    fn search(&self, query: &str, start: i64, num: u32) -> Result<SearchPage, PortalError> {
        let params = [
            ("q", query.to_string()),
            ("start", start.to_string()),
            ("num", num.to_string()),
            ("sortField", "title".to_string()),
        ];
        let value = self.get_json("search", &params)?;
        serde_json::from_value(value).map_err(|err| PortalError::Decode {
            url: format!("{}/sharing/rest/search", self.base),
            reason: err.to_string(),
        })
    }

    fn item_data(&self, id: &str) -> Result<Option<Value>, PortalError> {
        let (url, body) = self.get_text(&format!("content/items/{id}/data"), &[])?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let Ok(value) = serde_json::from_str::<Value>(&body) else {
            return Ok(None);
        };
        check_portal_error(&url, &value)?;
        Ok(Some(value))
    }

    fn item_groups(&self, id: &str) -> Result<Vec<String>, PortalError> {
        let value = self.get_json(&format!("content/items/{id}/groups"), &[])?;
        Ok(group_titles(&value))
    }

    fn item_usage(&self, id: &str, days: u32) -> Result<Option<u64>, PortalError> {
        let end = chrono::Utc::now().timestamp_millis();
        let start = end - i64::from(days) * 86_400_000;
        let params = [
            ("startTime", start.to_string()),
            ("endTime", end.to_string()),
            ("period", "1d".to_string()),
            ("vars", "num".to_string()),
            ("groupby", "name".to_string()),
            ("name", id.to_string()),
        ];
        let value = self.get_json("portals/self/usage", &params)?;
        Ok(usage_total(&value))
    }
}

/// Portals report failures as HTTP 200 with an `error` object.
pub fn check_portal_error(url: &str, value: &Value) -> Result<(), PortalError> {
    let Some(error) = value.get("error") else {
        return Ok(());
    };
    Err(PortalError::Api {
        url: url.to_string(),
        code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
        message: error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    })
}

/// Group titles from an item groups response (`admin`, `member`, `other`).
pub fn group_titles(value: &Value) -> Vec<String> {
    let mut titles: Vec<String> = ["admin", "member", "other"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(|group| group.get("title").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    titles.sort();
    titles.dedup();
    titles
}

/// Sum the `num` series of a usage response.
///
/// Counts arrive as `[timestamp, "count"]` pairs; the count may be a string
/// or a number.
pub fn usage_total(value: &Value) -> Option<u64> {
    let data = value.get("data")?.as_array()?;
    let mut total = 0u64;
    for series in data {
        let Some(points) = series.get("num").and_then(Value::as_array) else {
            continue;
        };
        for point in points {
            let count = point.get(1).and_then(|count| match count {
                Value::String(text) => text.trim().parse::<u64>().ok(),
                other => other.as_u64(),
            });
            total += count.unwrap_or_default();
        }
    }
    Some(total)
}
