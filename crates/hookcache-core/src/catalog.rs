//! Page catalog: which widgets each page renders, which pages are critical,
//! and the warming tiers.
//!
//! Injected into the coordinator and warming engine so they work against any
//! page set. [`PageCatalog::builtin`] describes the workflow-platform pages.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Widget id used when a page has no catalog entry.
pub const DEFAULT_WIDGET: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCatalog {
    /// Page id -> widget ids.
    #[serde(default)]
    pub pages: BTreeMap<String, Vec<String>>,

    /// Pages re-marked after a full-site flush.
    #[serde(default)]
    pub critical_pages: Vec<String>,

    /// Warmed first by tier-based warming.
    #[serde(default)]
    pub tier_one: Vec<String>,

    /// Warmed after tier one.
    #[serde(default)]
    pub tier_two: Vec<String>,
}

impl PageCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in catalog of the workflow-platform result pages.
    pub fn builtin() -> Self {
        let page = |id: &str, widgets: &[&str]| {
            (
                id.to_string(),
                widgets.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
            )
        };

        Self {
            pages: BTreeMap::from([
                page(
                    "strategy-plans",
                    &["kpi-dashboard", "roadmap-timeline", "okr-tracker", "confidence-gauge"],
                ),
                page(
                    "optimizely-dxp-tools",
                    &["integration-health", "content-sync-status", "tool-inventory"],
                ),
                page(
                    "analytics-insights",
                    &["traffic-overview", "conversion-funnel", "audience-segments"],
                ),
                page(
                    "experience-optimization",
                    &["experiment-planner", "personalization-rules", "content-recommendations"],
                ),
            ]),
            critical_pages: vec!["strategy-plans".to_string(), "analytics-insights".to_string()],
            tier_one: vec!["strategy-plans".to_string(), "analytics-insights".to_string()],
            tier_two: vec![
                "optimizely-dxp-tools".to_string(),
                "experience-optimization".to_string(),
            ],
        }
    }

    /// Add or replace a page.
    pub fn with_page<I, S>(mut self, page_id: impl Into<String>, widgets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pages
            .insert(page_id.into(), widgets.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_critical_pages<I, S>(mut self, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_pages = pages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tiers<I, J, S>(mut self, tier_one: I, tier_two: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tier_one = tier_one.into_iter().map(Into::into).collect();
        self.tier_two = tier_two.into_iter().map(Into::into).collect();
        self
    }

    /// Widgets of a page; empty if the page is unknown.
    pub fn widgets(&self, page_id: &str) -> &[String] {
        self.pages.get(page_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_page(&self, page_id: &str) -> bool {
        self.pages.contains_key(page_id)
    }

    pub fn page_ids(&self) -> impl Iterator<Item = &str> {
        self.pages.keys().map(String::as_str)
    }

    pub fn is_critical(&self, page_id: &str) -> bool {
        self.critical_pages.iter().any(|p| p == page_id)
    }

    pub fn parse_yaml(yaml: &str) -> CoreResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| CoreError::config(format!("invalid page catalog: {}", e)))
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse_yaml(&content)
    }

    /// Every critical or tiered page must be a known page.
    pub fn validate(&self) -> CoreResult<()> {
        for page in self
            .critical_pages
            .iter()
            .chain(&self.tier_one)
            .chain(&self.tier_two)
        {
            if !self.contains_page(page) {
                return Err(CoreError::config(format!(
                    "catalog references unknown page: {}",
                    page
                )));
            }
        }
        for (page, widgets) in &self.pages {
            if widgets.iter().any(|w| w.trim().is_empty()) {
                return Err(CoreError::config(format!(
                    "page {} has an empty widget id",
                    page
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_consistent() {
        let catalog = PageCatalog::builtin();
        catalog.validate().unwrap();
        assert_eq!(catalog.widgets("strategy-plans").len(), 4);
        assert!(catalog.is_critical("strategy-plans"));
        assert!(!catalog.is_critical("optimizely-dxp-tools"));
    }

    #[test]
    fn test_unknown_page_has_no_widgets() {
        let catalog = PageCatalog::builtin();
        assert!(catalog.widgets("does-not-exist").is_empty());
    }

    #[test]
    fn test_builder() {
        let catalog = PageCatalog::new()
            .with_page("home", ["hero", "news"])
            .with_critical_pages(["home"])
            .with_tiers(["home"], Vec::<&str>::new());
        catalog.validate().unwrap();
        assert_eq!(catalog.widgets("home"), ["hero", "news"]);
        assert_eq!(catalog.page_ids().collect::<Vec<_>>(), vec!["home"]);
    }

    #[test]
    fn test_validate_rejects_unknown_tier_page() {
        let catalog = PageCatalog::new()
            .with_page("home", ["hero"])
            .with_tiers(["home", "missing"], Vec::<&str>::new());
        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
pages:
  docs: [toc, search]
  blog: [feed]
critical_pages: [docs]
tier_one: [docs]
tier_two: [blog]
"#;
        let catalog = PageCatalog::parse_yaml(yaml).unwrap();
        catalog.validate().unwrap();
        assert_eq!(catalog.widgets("docs"), ["toc", "search"]);
    }
}
