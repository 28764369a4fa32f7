use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sheetpatch_model::{LocatorConfig, SectionLayout, SectionMarker};

use crate::XlsxError;

/// What to do when a requested section has no anchor in its worksheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSectionPolicy {
    /// Count the section's writes as not found and patch the rest.
    #[default]
    Skip,
    /// Fail the whole update before any backup or write.
    Abort,
}

/// Knobs for one update run. Every field has a default, so an empty JSON object is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub locator: LocatorConfig,
    pub markers: Vec<SectionMarker>,
    pub layouts: BTreeMap<String, SectionLayout>,
    pub missing_section: MissingSectionPolicy,
    /// Blank the previous period's data rows under each anchor before writing.
    pub clear_stale_rows: bool,
    /// Accept month labels such as `April 2025` for a tab named `Apr 25`.
    pub resolve_month_tabs: bool,
    /// A result smaller than the input by more than this fraction is flagged.
    pub shrink_warn_ratio: f64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        let markers = vec![SectionMarker::sub_labor(), SectionMarker::material()];
        let layouts = BTreeMap::from([
            ("5040".to_string(), SectionLayout::sub_labor()),
            ("5030".to_string(), SectionLayout::material()),
        ]);
        Self {
            locator: LocatorConfig::default(),
            markers,
            layouts,
            missing_section: MissingSectionPolicy::default(),
            clear_stale_rows: true,
            resolve_month_tabs: false,
            shrink_warn_ratio: 0.10,
        }
    }
}

impl UpdateConfig {
    pub fn from_json_str(json: &str) -> Result<Self, XlsxError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| XlsxError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, XlsxError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| XlsxError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), XlsxError> {
        if self.locator.max_rows == 0 || self.locator.max_cols == 0 {
            return Err(XlsxError::Config("locator window must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.shrink_warn_ratio) {
            return Err(XlsxError::Config(format!(
                "shrink_warn_ratio must be within 0..=1, got {}",
                self.shrink_warn_ratio
            )));
        }
        for marker in &self.markers {
            if marker.phrases().is_empty() {
                return Err(XlsxError::Config(format!(
                    "section {:?} has no usable marker text",
                    marker.id
                )));
            }
        }
        for (section, layout) in &self.layouts {
            if layout.job_col == 0 || layout.amount_col == 0 || layout.clear_cols.contains(&0) {
                return Err(XlsxError::Config(format!(
                    "section {section:?} layout uses column 0 (columns are 1-based)"
                )));
            }
        }
        Ok(())
    }

    /// The configured marker for `section`, or one whose code is the section id.
    pub fn marker(&self, section: &str) -> SectionMarker {
        self.markers
            .iter()
            .find(|m| m.id == section)
            .cloned()
            .unwrap_or_else(|| SectionMarker::new(section))
    }

    pub fn layout(&self, section: &str) -> Result<&SectionLayout, XlsxError> {
        self.layouts
            .get(section)
            .ok_or_else(|| XlsxError::Config(format!("no layout configured for section {section:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_object_is_the_default() {
        assert_eq!(UpdateConfig::from_json_str("{}").unwrap(), UpdateConfig::default());
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let config = UpdateConfig::from_json_str(
            r#"{
                "locator": { "max_rows": 40 },
                "missing_section": "abort",
                "markers": [{ "id": "6010", "code": "6010", "fallbacks": ["equipment"] }],
                "layouts": { "6010": { "amount_col": 4 } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.locator.max_rows, 40);
        assert_eq!(config.locator.max_cols, 10);
        assert_eq!(config.missing_section, MissingSectionPolicy::Abort);
        assert_eq!(config.marker("6010").fallbacks, vec!["equipment"]);
        assert_eq!(config.marker("7000").code, "7000");
        let layout = config.layout("6010").unwrap();
        assert_eq!((layout.job_col, layout.amount_col, layout.max_rows), (1, 4, 200));
        assert!(config.layout("5040").is_err());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert!(matches!(
            UpdateConfig::from_json_str(r#"{ "shrink_warn_ratio": 3.0 }"#),
            Err(XlsxError::Config(_))
        ));
        assert!(matches!(
            UpdateConfig::from_json_str(r#"{ "layouts": { "x": { "job_col": 0 } } }"#),
            Err(XlsxError::Config(_))
        ));
        assert!(matches!(
            UpdateConfig::from_json_str("not json"),
            Err(XlsxError::Config(_))
        ));
    }
}
