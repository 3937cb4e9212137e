use super::*;

#[test]
fn default_config_is_valid_and_omits_unset_filter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("overlay.json");
    write_config(&path, &default_config()).expect("write config");
    let text = std::fs::read_to_string(&path).expect("read config");
    assert!(!text.contains("sql_filter"));
    let parsed = load_config(&path).expect("load config");
    assert_eq!(parsed, default_config());
    validate_config(&parsed).expect("default config validates");
}

#[test]
fn overrides_replace_file_values() {
    let mut config = default_config();
    apply_overrides(
        &mut config,
        &ConfigOverrides {
            route_id_field: Some("ROUTE_ID".to_string()),
            decimal_places: Some(5),
            sql_filter: Some("LANES > 2".to_string()),
            ..ConfigOverrides::default()
        },
    );
    assert_eq!(config.route_id_field, "ROUTE_ID");
    assert_eq!(config.from_measure_field, "FromMeasure");
    assert_eq!(config.decimal_places, 5);
    assert_eq!(config.sql_filter.as_deref(), Some("LANES > 2"));
    assert_eq!(config.control_fields().route_id, "ROUTE_ID");
}

#[test]
fn rejects_duplicate_and_empty_control_fields() {
    let mut config = default_config();
    config.to_measure_field = "frommeasure".to_string();
    assert!(validate_config(&config).is_err());

    let mut config = default_config();
    config.to_date_field = "  ".to_string();
    assert!(validate_config(&config).is_err());
}

#[test]
fn rejects_out_of_range_settings() {
    let mut config = default_config();
    config.decimal_places = MAX_DECIMAL_PLACES + 1;
    assert!(validate_config(&config).is_err());

    let mut config = default_config();
    config.staging_base_name = "../escape".to_string();
    assert!(validate_config(&config).is_err());

    let mut config = default_config();
    config.schema_version = 2;
    assert!(validate_config(&config).is_err());
}

#[test]
fn load_and_write_config_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("overlay.json");
    let mut config = default_config();
    config.decimal_places = 4;
    write_config(&path, &config).expect("write config");

    let resolved = resolve_config(Some(&path), &ConfigOverrides::default()).expect("resolve");
    assert_eq!(resolved.decimal_places, 4);
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("overlay.json");
    let mut value = serde_json::to_value(default_config()).expect("to value");
    value["route_field"] = serde_json::json!("typo");
    std::fs::write(&path, value.to_string()).expect("write");
    assert!(load_config(&path).is_err());
}
