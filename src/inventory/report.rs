//! Tab-delimited per-type reports and the JSON catalog.
use super::describe::{ItemError, ItemReport};
use crate::staging::RunStamp;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Column header shared by every per-type report.
pub const COLUMNS: [&str; 28] = [
    "ItemID",
    "Title",
    "Type",
    "Owner",
    "Created",
    "Modified",
    "Access",
    "SharedGroups",
    "Tags",
    "Snippet",
    "Description",
    "Credits",
    "LicenseInfo",
    "NumViews",
    "NumComments",
    "AvgRating",
    "SizeBytes",
    "ContentStatus",
    "Categories",
    "ServiceURL",
    "ItemPage",
    "Thumbnail",
    "Usage30Day",
    "Usage365Day",
    "DependencyMapIDs",
    "LayerURLs",
    "LayerCount",
    "ExtractedAt",
];

const LIST_SEPARATOR: &str = "; ";

/// `"Web Mapping Application"` becomes `"WebMappingApplication"`.
pub fn type_slug(item_type: &str) -> String {
    item_type
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

pub fn tsv_file_name(item_type: &str, stamp: &RunStamp) -> String {
    format!("WebInventory_{}_{}.txt", type_slug(item_type), stamp.suffix())
}

pub fn catalog_file_name(stamp: &RunStamp) -> String {
    format!("WebInventory_{}.json", stamp.suffix())
}

/// Tabs and line breaks would break the row structure.
fn sanitize(value: &str) -> String {
    value.replace(['\t', '\r', '\n'], " ")
}

fn optional_count(value: Option<u64>) -> String {
    value.map(|count| count.to_string()).unwrap_or_default()
}

/// The report row for `item`, in [`COLUMNS`] order.
pub fn report_row(item: &ItemReport) -> Vec<String> {
    let row = vec![
        item.id.clone(),
        item.title.clone(),
        item.item_type.clone(),
        item.owner.clone(),
        item.created.clone(),
        item.modified.clone(),
        item.access.clone(),
        item.shared_groups.join(LIST_SEPARATOR),
        item.tags.join(LIST_SEPARATOR),
        item.snippet.clone(),
        item.description.clone(),
        item.credits.clone(),
        item.license_info.clone(),
        item.num_views.to_string(),
        item.num_comments.to_string(),
        item.avg_rating.to_string(),
        item.size_bytes.to_string(),
        item.content_status.clone(),
        item.categories.join(LIST_SEPARATOR),
        item.service_url.clone(),
        item.item_page.clone(),
        item.thumbnail.clone(),
        optional_count(item.usage_30_day),
        optional_count(item.usage_365_day),
        item.dependency_map_ids.join(LIST_SEPARATOR),
        item.layer_urls.join(LIST_SEPARATOR),
        item.layer_count.to_string(),
        item.extracted_at.clone(),
    ];
    row.iter().map(|value| sanitize(value)).collect()
}

/// Write one tab-delimited report with the fixed header.
pub fn write_tsv(path: &Path, items: &[&ItemReport]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    writer
        .write_record(COLUMNS)
        .with_context(|| format!("write header to {}", path.display()))?;
    for item in items {
        writer
            .write_record(report_row(item))
            .with_context(|| format!("write {} to {}", item.id, path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TocEntry {
    pub title: String,
    pub item_type: String,
    pub item_page: String,
    pub anchor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub error: String,
}

impl From<&ItemError> for ItemFailure {
    fn from(err: &ItemError) -> Self {
        Self {
            item_id: err.item_id().to_string(),
            error: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSection<'a> {
    pub anchor: String,
    #[serde(flatten)]
    pub item: &'a ItemReport,
}

/// Document-style catalog: table of contents, one section per item, and the
/// failures.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryCatalog<'a> {
    pub portal: String,
    pub generated_at: String,
    pub item_types: Vec<String>,
    pub toc: Vec<TocEntry>,
    pub sections: Vec<CatalogSection<'a>>,
    pub failures: Vec<ItemFailure>,
}

fn anchor(item: &ItemReport) -> String {
    format!("item-{}", item.id)
}

pub fn build_catalog<'a>(
    portal: &str,
    generated_at: &str,
    item_types: &[String],
    items: &'a [ItemReport],
    failures: Vec<ItemFailure>,
) -> InventoryCatalog<'a> {
    InventoryCatalog {
        portal: portal.to_string(),
        generated_at: generated_at.to_string(),
        item_types: item_types.to_vec(),
        toc: items
            .iter()
            .map(|item| TocEntry {
                title: item.title.clone(),
                item_type: item.item_type.clone(),
                item_page: item.item_page.clone(),
                anchor: anchor(item),
            })
            .collect(),
        sections: items
            .iter()
            .map(|item| CatalogSection {
                anchor: anchor(item),
                item,
            })
            .collect(),
        failures,
    }
}

pub fn write_catalog(path: &Path, catalog: &InventoryCatalog<'_>) -> Result<PathBuf> {
    let text = serde_json::to_string_pretty(catalog).context("serialize inventory catalog")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ItemReport {
        ItemReport {
            id: "0123456789abcdef0123456789abcdef".to_string(),
            title: "Pavement\tCondition".to_string(),
            item_type: "Web Map".to_string(),
            owner: "gis".to_string(),
            created: "2024-01-01T00:00:00Z".to_string(),
            modified: String::new(),
            access: "public".to_string(),
            shared_groups: vec!["Roads".to_string(), "Bridges".to_string()],
            tags: vec![],
            snippet: "line one\nline two".to_string(),
            description: String::new(),
            credits: String::new(),
            license_info: String::new(),
            num_views: 4,
            num_comments: 0,
            avg_rating: 0.0,
            size_bytes: 1024,
            content_status: String::new(),
            categories: vec![],
            service_url: String::new(),
            item_page: "https://portal/home/item.html?id=0123456789abcdef0123456789abcdef"
                .to_string(),
            thumbnail: String::new(),
            usage_30_day: Some(3),
            usage_365_day: None,
            dependency_map_ids: vec![],
            layer_urls: vec![],
            layer_count: 0,
            extracted_at: "2024-02-01T00:00:00".to_string(),
        }
    }

    #[test]
    fn rows_match_header_and_are_sanitized() {
        let row = report_row(&item());
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[1], "Pavement Condition");
        assert_eq!(row[7], "Roads; Bridges");
        assert_eq!(row[9], "line one line two");
        assert_eq!(row[22], "3");
        assert_eq!(row[23], "");
        assert!(row.iter().all(|value| !value.contains(['\t', '\n'])));
    }

    #[test]
    fn slugs_drop_spaces_and_punctuation() {
        assert_eq!(type_slug("Web Mapping Application"), "WebMappingApplication");
        assert_eq!(type_slug("StoryMap"), "StoryMap");
    }

    #[test]
    fn tsv_has_one_line_per_item_plus_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        let report = item();
        write_tsv(&path, &[&report]).expect("write tsv");
        let text = fs::read_to_string(&path).expect("read tsv");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split('\t').count(), 28);
        assert_eq!(lines[1].split('\t').count(), 28);
        assert!(lines[0].starts_with("ItemID\tTitle\tType"));
    }
}
