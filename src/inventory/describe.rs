//! Per-item detail extraction.
use super::portal::{PortalApi, PortalError, PortalItem};
use chrono::DateTime;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

/// Keys whose values reference other portal items.
const DEPENDENCY_KEYS: [&str; 3] = ["itemId", "webmap", "webmapId"];

#[derive(Debug, Error)]
pub enum ItemError {
    #[error("item {id}: {source}")]
    Portal {
        id: String,
        #[source]
        source: PortalError,
    },
    #[error("item {id}: {reason}")]
    Invalid { id: String, reason: String },
}

impl ItemError {
    pub fn item_id(&self) -> &str {
        match self {
            ItemError::Portal { id, .. } | ItemError::Invalid { id, .. } => id,
        }
    }
}

/// Everything the inventory records about one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    pub id: String,
    pub title: String,
    pub item_type: String,
    pub owner: String,
    pub created: String,
    pub modified: String,
    pub access: String,
    pub shared_groups: Vec<String>,
    pub tags: Vec<String>,
    pub snippet: String,
    pub description: String,
    pub credits: String,
    pub license_info: String,
    pub num_views: u64,
    pub num_comments: u64,
    pub avg_rating: f64,
    pub size_bytes: i64,
    pub content_status: String,
    pub categories: Vec<String>,
    pub service_url: String,
    pub item_page: String,
    pub thumbnail: String,
    pub usage_30_day: Option<u64>,
    pub usage_365_day: Option<u64>,
    pub dependency_map_ids: Vec<String>,
    pub layer_urls: Vec<String>,
    pub layer_count: usize,
    pub extracted_at: String,
}

/// Collect metadata, sharing, usage, and dependencies for `item`.
///
/// Usage statistics are best effort; every other portal failure fails the
/// item.
pub fn describe_item<A: PortalApi + ?Sized>(
    api: &A,
    item: &PortalItem,
    extracted_at: &str,
) -> Result<ItemReport, ItemError> {
    if item.id.trim().is_empty() {
        return Err(ItemError::Invalid {
            id: item.title.clone(),
            reason: "search result has no item id".to_string(),
        });
    }
    let portal_error = |source| ItemError::Portal {
        id: item.id.clone(),
        source,
    };
    let data = api.item_data(&item.id).map_err(portal_error)?;
    let shared_groups = api.item_groups(&item.id).map_err(portal_error)?;

    let mut dependency_map_ids = Vec::new();
    let mut layer_urls = Vec::new();
    if let Some(data) = &data {
        collect_references(data, &mut dependency_map_ids, &mut layer_urls);
    }
    dependency_map_ids.retain(|id| !id.eq_ignore_ascii_case(&item.id));
    let service_url = item.url.clone().unwrap_or_default();
    if layer_urls.is_empty() && !service_url.is_empty() {
        layer_urls.push(service_url.clone());
    }

    Ok(ItemReport {
        id: item.id.clone(),
        title: item.title.clone(),
        item_type: item.item_type.clone(),
        owner: item.owner.clone(),
        created: format_epoch_millis(item.created),
        modified: format_epoch_millis(item.modified),
        access: item.access.clone(),
        shared_groups,
        tags: item.tags.clone(),
        snippet: item.snippet.clone().unwrap_or_default(),
        description: strip_html(item.description.as_deref().unwrap_or_default()),
        credits: strip_html(item.access_information.as_deref().unwrap_or_default()),
        license_info: strip_html(item.license_info.as_deref().unwrap_or_default()),
        num_views: item.num_views,
        num_comments: item.num_comments,
        avg_rating: item.avg_rating,
        size_bytes: item.size,
        content_status: item.content_status.clone().unwrap_or_default(),
        categories: item.categories.clone(),
        service_url,
        item_page: api.item_page_url(&item.id),
        thumbnail: item
            .thumbnail
            .as_deref()
            .filter(|thumbnail| !thumbnail.is_empty())
            .map(|thumbnail| api.thumbnail_url(&item.id, thumbnail))
            .unwrap_or_default(),
        usage_30_day: usage(api, &item.id, 30),
        usage_365_day: usage(api, &item.id, 365),
        layer_count: layer_urls.len(),
        dependency_map_ids,
        layer_urls,
        extracted_at: extracted_at.to_string(),
    })
}

fn usage<A: PortalApi + ?Sized>(api: &A, id: &str, days: u32) -> Option<u64> {
    match api.item_usage(id, days) {
        Ok(count) => count,
        Err(err) => {
            tracing::debug!(item = id, days, error = %err, "usage statistics unavailable");
            None
        }
    }
}

/// ISO-8601 UTC rendering of an epoch-millisecond timestamp; empty when unset.
pub fn format_epoch_millis(millis: i64) -> String {
    if millis <= 0 {
        return String::new();
    }
    DateTime::from_timestamp_millis(millis)
        .map(|moment| moment.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_default()
}

fn html_tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("regex for html tags"))
}

/// Plain text from an HTML fragment: tags removed, common entities decoded,
/// whitespace collapsed.
pub fn strip_html(html: &str) -> String {
    let text = html_tag_regex().replace_all(html, " ");
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_item_id(text: &str) -> bool {
    text.len() == 32 && text.bytes().all(|byte| byte.is_ascii_hexdigit())
}

/// Walk an item data document collecting referenced item ids and layer URLs,
/// each in first-seen order without repeats.
pub fn collect_references(data: &Value, item_ids: &mut Vec<String>, urls: &mut Vec<String>) {
    let mut seen_ids: HashSet<String> = item_ids.iter().map(|id| id.to_ascii_lowercase()).collect();
    let mut seen_urls: HashSet<String> = urls.iter().cloned().collect();
    let mut pending = vec![data];
    while let Some(value) = pending.pop() {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    if let Value::String(text) = child {
                        let text = text.trim();
                        if DEPENDENCY_KEYS.iter().any(|name| name.eq_ignore_ascii_case(key))
                            && is_item_id(text)
                            && seen_ids.insert(text.to_ascii_lowercase())
                        {
                            item_ids.push(text.to_string());
                        } else if key.eq_ignore_ascii_case("url")
                            && (text.starts_with("http://") || text.starts_with("https://"))
                            && seen_urls.insert(text.to_string())
                        {
                            urls.push(text.to_string());
                        }
                    }
                }
                // Reverse so document order is preserved when popping.
                pending.extend(map.values().rev());
            }
            Value::Array(values) => pending.extend(values.iter().rev()),
            _ => {}
        }
    }
}
