//! Overlay configuration helpers.
//!
//! The config file names the control fields shared by every source feature
//! class and the run-level settings. CLI flags override individual values.
use crate::overlay::ControlFields;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const MAX_DECIMAL_PLACES: u32 = 10;

/// Pack-style JSON config for `lrs overlay` and `lrs validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlayConfig {
    pub schema_version: u32,
    pub route_id_field: String,
    pub from_measure_field: String,
    pub to_measure_field: String,
    pub from_date_field: String,
    pub to_date_field: String,
    pub decimal_places: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_filter: Option<String>,
    pub staging_base_name: String,
    pub output_prefix: String,
}

impl OverlayConfig {
    pub fn control_fields(&self) -> ControlFields {
        ControlFields {
            route_id: self.route_id_field.clone(),
            from_measure: self.from_measure_field.clone(),
            to_measure: self.to_measure_field.clone(),
            from_date: self.from_date_field.clone(),
            to_date: self.to_date_field.clone(),
        }
    }
}

/// CLI-provided values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub route_id_field: Option<String>,
    pub from_measure_field: Option<String>,
    pub to_measure_field: Option<String>,
    pub from_date_field: Option<String>,
    pub to_date_field: Option<String>,
    pub decimal_places: Option<u32>,
    pub sql_filter: Option<String>,
}

/// Build the default config written by `lrs init`.
pub fn default_config() -> OverlayConfig {
    let fields = ControlFields::default();
    OverlayConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        route_id_field: fields.route_id,
        from_measure_field: fields.from_measure,
        to_measure_field: fields.to_measure,
        from_date_field: fields.from_date,
        to_date_field: fields.to_date,
        decimal_places: 3,
        sql_filter: None,
        staging_base_name: "OVERLAY_STAGING".to_string(),
        output_prefix: "OVERLAY_OUTPUT".to_string(),
    }
}

pub fn load_config(path: &Path) -> Result<OverlayConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: OverlayConfig =
        serde_json::from_slice(&bytes).context("parse overlay config JSON")?;
    Ok(config)
}

pub fn write_config(path: &Path, config: &OverlayConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(config).context("serialize overlay config")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Load `path` when given, otherwise start from defaults, then apply overrides.
pub fn resolve_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<OverlayConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => default_config(),
    };
    apply_overrides(&mut config, overrides);
    validate_config(&config)?;
    Ok(config)
}

pub fn apply_overrides(config: &mut OverlayConfig, overrides: &ConfigOverrides) {
    let text_overrides = [
        (&mut config.route_id_field, &overrides.route_id_field),
        (&mut config.from_measure_field, &overrides.from_measure_field),
        (&mut config.to_measure_field, &overrides.to_measure_field),
        (&mut config.from_date_field, &overrides.from_date_field),
        (&mut config.to_date_field, &overrides.to_date_field),
    ];
    for (target, value) in text_overrides {
        if let Some(value) = value {
            *target = value.clone();
        }
    }
    if let Some(places) = overrides.decimal_places {
        config.decimal_places = places;
    }
    if let Some(filter) = &overrides.sql_filter {
        config.sql_filter = Some(filter.clone());
    }
}

/// Validate schema version, field names, and run settings.
pub fn validate_config(config: &OverlayConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported overlay config schema_version {}",
            config.schema_version
        ));
    }
    let named = [
        ("route_id_field", &config.route_id_field),
        ("from_measure_field", &config.from_measure_field),
        ("to_measure_field", &config.to_measure_field),
        ("from_date_field", &config.from_date_field),
        ("to_date_field", &config.to_date_field),
    ];
    let mut seen = HashSet::new();
    for (label, value) in named {
        if value.trim().is_empty() {
            return Err(anyhow!("{label} must be non-empty"));
        }
        if !seen.insert(value.to_ascii_uppercase()) {
            return Err(anyhow!("{label} repeats another control field ({value})"));
        }
    }
    if config.decimal_places > MAX_DECIMAL_PLACES {
        return Err(anyhow!(
            "decimal_places must be at most {MAX_DECIMAL_PLACES} (got {})",
            config.decimal_places
        ));
    }
    validate_name_part(&config.staging_base_name, "staging_base_name")?;
    validate_name_part(&config.output_prefix, "output_prefix")?;
    if let Some(filter) = config.sql_filter.as_deref() {
        if filter.trim().is_empty() {
            return Err(anyhow!("sql_filter must be omitted rather than empty"));
        }
    }
    Ok(())
}

fn validate_name_part(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{label} must be non-empty"));
    }
    if value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(anyhow!(
            "{label} must be a plain name without path separators (got {value:?})"
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
