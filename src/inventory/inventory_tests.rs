use super::*;
use crate::overlay::temporal::parse_date;
use portal::SearchPage;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Default)]
struct FakePortal {
    /// Items returned for each `type:"..."` query, paged by `page_size`.
    by_type: HashMap<String, Vec<PortalItem>>,
    page_size: usize,
    data: HashMap<String, Value>,
    failing_groups: HashSet<String>,
    searches: RefCell<Vec<(String, i64)>>,
}

impl FakePortal {
    fn with_items(item_type: &str, items: Vec<PortalItem>, page_size: usize) -> Self {
        let mut by_type = HashMap::new();
        by_type.insert(item_type.to_string(), items);
        Self {
            by_type,
            page_size,
            ..Self::default()
        }
    }
}

impl PortalApi for FakePortal {
    fn portal_url(&self) -> &str {
        "https://portal.test/portal"
    }

    fn search(&self, query: &str, start: i64, _num: u32) -> Result<SearchPage, PortalError> {
        self.searches.borrow_mut().push((query.to_string(), start));
        let item_type = query
            .split('"')
            .nth(1)
            .unwrap_or_default()
            .to_string();
        let items = self.by_type.get(&item_type).cloned().unwrap_or_default();
        let offset = usize::try_from(start - 1).unwrap_or_default();
        let results: Vec<PortalItem> = items.iter().skip(offset).take(self.page_size).cloned().collect();
        let next = offset + results.len();
        Ok(SearchPage {
            total: items.len() as u64,
            next_start: if next < items.len() { next as i64 + 1 } else { -1 },
            results,
        })
    }

    fn item_data(&self, id: &str) -> Result<Option<Value>, PortalError> {
        Ok(self.data.get(id).cloned())
    }

    fn item_groups(&self, id: &str) -> Result<Vec<String>, PortalError> {
        if self.failing_groups.contains(id) {
            return Err(PortalError::Api {
                url: format!("{}/sharing/rest/content/items/{id}/groups", self.portal_url()),
                code: 403,
                message: "You do not have permissions to access this resource.".to_string(),
            });
        }
        Ok(vec!["Roads".to_string()])
    }

    fn item_usage(&self, _id: &str, days: u32) -> Result<Option<u64>, PortalError> {
        if days > 30 {
            return Err(PortalError::Decode {
                url: "usage".to_string(),
                reason: "usage disabled".to_string(),
            });
        }
        Ok(Some(u64::from(days)))
    }
}

fn item(id_digit: char, item_type: &str) -> PortalItem {
    PortalItem {
        id: id_digit.to_string().repeat(32),
        title: format!("Item {id_digit}"),
        item_type: item_type.to_string(),
        owner: "gis".to_string(),
        created: 1_704_067_200_000,
        thumbnail: Some("thumbnail/map.png".to_string()),
        ..PortalItem::default()
    }
}

fn request(out_dir: PathBuf, item_types: &[&str]) -> InventoryRequest {
    InventoryRequest {
        item_types: item_types.iter().map(|t| t.to_string()).collect(),
        owner: None,
        max_items: None,
        out_dir,
        stamp: RunStamp::at(parse_date("2024-02-01T08:30:00").expect("date")),
    }
}

#[test]
fn enumeration_follows_next_start_until_exhausted() {
    let items: Vec<PortalItem> = ['1', '2', '3', '4', '5'].into_iter().map(|d| item(d, "Web Map")).collect();
    let portal = FakePortal::with_items("Web Map", items, 2);
    let found = enumerate_items(&portal, &["Web Map".to_string()], None, None).expect("enumerate");
    assert_eq!(found.len(), 5);
    let starts: Vec<i64> = portal.searches.borrow().iter().map(|(_, start)| *start).collect();
    assert_eq!(starts, vec![1, 3, 5]);
}

#[test]
fn enumeration_filters_loose_type_matches_and_respects_cap() {
    let items = vec![
        item('1', "Web Map"),
        item('2', "Web Mapping Application"),
        item('3', "Web Map"),
        item('1', "Web Map"),
        item('4', "Web Map"),
    ];
    let portal = FakePortal::with_items("Web Map", items, 100);
    let all = enumerate_items(&portal, &["Web Map".to_string()], None, None).expect("enumerate");
    assert_eq!(all.len(), 3);
    let capped =
        enumerate_items(&portal, &["Web Map".to_string()], Some("gis"), Some(2)).expect("enumerate");
    assert_eq!(capped.len(), 2);
    assert!(portal
        .searches
        .borrow()
        .iter()
        .any(|(query, _)| query == "type:\"Web Map\" AND owner:gis"));
}

#[test]
fn describe_collects_dependencies_and_tolerates_missing_usage() {
    let mut portal = FakePortal::with_items("Dashboard", vec![], 100);
    let dashboard = item('d', "Dashboard");
    portal.data.insert(
        dashboard.id.clone(),
        json!({"widgets": [{"itemId": "ffffffffffffffffffffffffffffffff"}, {"url": "https://svc/x/FeatureServer/0"}]}),
    );
    let report = describe_item(&portal, &dashboard, "2024-02-01T08:30:00").expect("describe");
    assert_eq!(report.dependency_map_ids, vec!["ffffffffffffffffffffffffffffffff"]);
    assert_eq!(report.layer_urls, vec!["https://svc/x/FeatureServer/0"]);
    assert_eq!(report.layer_count, 1);
    assert_eq!(report.shared_groups, vec!["Roads"]);
    assert_eq!(report.usage_30_day, Some(30));
    assert_eq!(report.usage_365_day, None);
    assert_eq!(report.created, "2024-01-01T00:00:00Z");
    assert!(report.thumbnail.ends_with("/info/thumbnail/map.png"));
    assert!(report.item_page.ends_with("item.html?id=dddddddddddddddddddddddddddddddd"));
}

#[test]
fn service_items_fall_back_to_their_own_url() {
    let portal = FakePortal::default();
    let mut service = item('5', "Feature Service");
    service.url = Some("https://svc/roads/FeatureServer".to_string());
    let report = describe_item(&portal, &service, "now").expect("describe");
    assert_eq!(report.layer_urls, vec!["https://svc/roads/FeatureServer"]);
    assert_eq!(report.service_url, "https://svc/roads/FeatureServer");
}

#[test]
fn run_writes_reports_and_records_failures_without_aborting() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut portal =
        FakePortal::with_items("Web Map", vec![item('1', "Web Map"), item('2', "Web Map")], 100);
    portal.failing_groups.insert(item('2', "Web Map").id);

    let report = run_inventory(&portal, &request(dir.path().join("inv"), &["Web Map", "Dashboard"]))
        .expect("run inventory");
    assert_eq!(report.items_found, 2);
    assert_eq!(report.described, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].item_id, item('2', "Web Map").id);

    let web_map_tsv = dir.path().join("inv").join("WebInventory_WebMap_20240201_083000.txt");
    let text = fs::read_to_string(&web_map_tsv).expect("read tsv");
    assert_eq!(text.lines().count(), 2);
    assert!(dir
        .path()
        .join("inv")
        .join("WebInventory_Dashboard_20240201_083000.txt")
        .is_file());

    let catalog: Value = serde_json::from_str(
        &fs::read_to_string(&report.catalog).expect("read catalog"),
    )
    .expect("parse catalog");
    assert_eq!(catalog["toc"].as_array().map(Vec::len), Some(1));
    assert_eq!(catalog["sections"][0]["anchor"], json!(format!("item-{}", item('1', "Web Map").id)));
    assert_eq!(catalog["failures"].as_array().map(Vec::len), Some(1));
}

#[test]
fn default_types_apply_when_none_requested() {
    let request = request(PathBuf::from("out"), &[" Web Map", "web map", ""]);
    assert_eq!(request.resolved_types(), vec!["Web Map"]);
    let defaults = InventoryRequest {
        item_types: vec![],
        ..request
    };
    assert_eq!(defaults.resolved_types().len(), DEFAULT_ITEM_TYPES.len());
}
