//! Suite and test-case definitions, loaded from YAML files.
//!
//! ```yaml
//! name: dashboard
//! base-url: "http://localhost:8080/"
//! viewport: 1440x900
//! setup:
//!   - override-config: { section: General, key: live_widget_refresh_after_seconds, value: 1000000 }
//!   - save
//!   - controller: { action: Dashboard.saveLayout, params: { dashboardId: 5 } }
//! cases:
//!   - name: loaded
//!     actions:
//!       - navigate: { url: "?module=Widgetize&action=index" }
//!   - name: rowevolution
//!     capture: { scope: { css: ".ui-dialog" } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::action::Action;
use crate::capture::{CaptureTarget, StabilityPolicy};
use crate::env::Viewport;
use crate::error::{HarnessError, Result};

/// One declarative step against the external test-environment controller.
/// Setup/teardown hooks are lists of these, executed strictly in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvStep {
    /// Invoke a controller action on the system under test.
    Controller {
        action: String,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        params: serde_json::Value,
    },
    /// Invoke a reporting/API action on the system under test.
    Api {
        action: String,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        params: serde_json::Value,
    },
    /// Stage a config override; takes effect on the next `save`.
    OverrideConfig {
        section: String,
        key: String,
        value: serde_json::Value,
    },
    /// Flush staged config overrides to the system under test.
    Save,
}

impl EnvStep {
    pub fn describe(&self) -> String {
        match self {
            EnvStep::Controller { action, .. } => format!("controller {}", action),
            EnvStep::Api { action, .. } => format!("api {}", action),
            EnvStep::OverrideConfig { section, key, .. } => {
                format!("override {}.{}", section, key)
            }
            EnvStep::Save => "save overrides".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestCase {
    pub name: String,
    /// Extra attempts after a retryable failure.
    #[serde(default)]
    pub retries: u32,
    /// Re-run this case's setup steps before each retry attempt.
    #[serde(default)]
    pub reset_per_attempt: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<EnvStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<EnvStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub capture: CaptureTarget,
    /// Per-case override of the aggregate diff threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Suite {
    pub name: String,
    /// Base for relative `navigate` URLs in this suite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(
        default,
        with = "viewport_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub viewport: Option<Viewport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<StabilityPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<EnvStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<EnvStep>,
    pub cases: Vec<TestCase>,
}

impl Suite {
    /// Resolves a case's navigation target against the suite base URL.
    /// Absolute URLs pass through untouched.
    pub fn resolve_url(&self, raw: &str) -> Result<String> {
        if Url::parse(raw).is_ok() {
            return Ok(raw.to_string());
        }
        let base = self.base_url.as_deref().ok_or_else(|| {
            HarnessError::Config(format!(
                "Relative URL '{}' requires a suite base-url",
                raw
            ))
        })?;
        let joined = Url::parse(base)?.join(raw)?;
        Ok(joined.to_string())
    }

    /// True when the suite or any case stages environment steps, which
    /// need a configured controller endpoint.
    pub fn has_env_steps(&self) -> bool {
        !self.setup.is_empty()
            || !self.teardown.is_empty()
            || self
                .cases
                .iter()
                .any(|case| !case.setup.is_empty() || !case.teardown.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::Config(
                "Suite name must not be empty".to_string(),
            ));
        }
        if self.cases.is_empty() {
            return Err(HarnessError::Config(format!(
                "Suite '{}' declares no cases",
                self.name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for case in &self.cases {
            if case.name.trim().is_empty() {
                return Err(HarnessError::Config(format!(
                    "Suite '{}' has a case with an empty name",
                    self.name
                )));
            }
            if !seen.insert(case.name.as_str()) {
                return Err(HarnessError::Config(format!(
                    "Duplicate case name '{}' would collide on one baseline key",
                    case.name
                )));
            }
            if let Some(max_distance) = case.max_distance {
                if !(0.0..=1.0).contains(&max_distance) {
                    return Err(HarnessError::Config(format!(
                        "Case '{}' max-distance {} is outside 0..=1",
                        case.name, max_distance
                    )));
                }
            }
        }
        if let Some(base) = &self.base_url {
            Url::parse(base)?;
        }
        Ok(())
    }
}

/// Reads and validates a suite file.
pub fn load_suite(path: &Path) -> Result<Suite> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            HarnessError::Config(format!("Suite file not found: {}", path.display()))
        } else {
            HarnessError::Io(e)
        }
    })?;
    let suite: Suite = serde_yaml::from_str(&raw).map_err(|e| {
        HarnessError::Config(format!("Suite file {} is invalid: {}", path.display(), e))
    })?;
    suite.validate()?;
    Ok(suite)
}

mod viewport_string {
    use super::Viewport;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        viewport: &Option<Viewport>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match viewport {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<Viewport>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| s.parse::<Viewport>().map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Locator;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DASHBOARD_SUITE: &str = r##"
name: dashboard
base-url: "http://localhost:8080/"
viewport: 1440x900
setup:
  - override-config: { section: General, key: live_widget_refresh_after_seconds, value: 1000000 }
  - save
  - controller: { action: Dashboard.saveLayout, params: { dashboardId: 5 } }
teardown:
  - controller: { action: Dashboard.removeExtraDashboards }
cases:
  - name: loaded
    actions:
      - navigate: { url: "?module=Widgetize&action=index", timeout: 10s }
  - name: widget_move
    actions:
      - click: { css: ".widgetTop" }
      - move-to: { css: "#dashboardWidgetsArea > .col", pause: 200ms }
  - name: rowevolution
    capture: { scope: { css: ".ui-dialog" } }
  - name: reset
    retries: 3
    reset-per-attempt: true
    actions:
      - click: { text: "Reset dashboard" }
"##;

    fn write_suite(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp suite file");
        file.write_all(contents.as_bytes()).expect("write suite");
        file
    }

    #[test]
    fn parses_dashboard_style_suite() {
        let file = write_suite(DASHBOARD_SUITE);
        let suite = load_suite(file.path()).expect("load suite");

        assert_eq!(suite.name, "dashboard");
        assert_eq!(suite.viewport, Some(Viewport { width: 1440, height: 900 }));
        assert_eq!(suite.setup.len(), 3);
        assert_eq!(suite.setup[1], EnvStep::Save);
        match &suite.setup[0] {
            EnvStep::OverrideConfig { section, key, value } => {
                assert_eq!(section, "General");
                assert_eq!(key, "live_widget_refresh_after_seconds");
                assert_eq!(value, &serde_json::json!(1000000));
            }
            other => panic!("expected override-config first, got: {:?}", other),
        }

        assert_eq!(suite.cases.len(), 4);
        let reset = &suite.cases[3];
        assert_eq!(reset.retries, 3);
        assert!(reset.reset_per_attempt);
        let rowevolution = &suite.cases[2];
        assert_eq!(
            rowevolution.capture.scope,
            Some(Locator::css(".ui-dialog"))
        );
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_suite(Path::new("/nonexistent/suite.yaml")).unwrap_err();
        let msg = err.to_string();
        assert!(
            msg.contains("Suite file not found"),
            "expected suite-not-found message, got: {msg}"
        );
    }

    #[test]
    fn invalid_yaml_names_the_file() {
        let file = write_suite("name: [unclosed");
        let err = load_suite(file.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("is invalid"), "got: {msg}");
    }

    #[test]
    fn duplicate_case_names_are_rejected() {
        let file = write_suite(
            r#"
name: dup
cases:
  - name: loaded
  - name: loaded
"#,
        );
        let err = load_suite(file.path()).unwrap_err();
        assert!(
            err.to_string().contains("Duplicate case name"),
            "got: {err}"
        );
    }

    #[test]
    fn empty_suite_is_rejected() {
        let file = write_suite("name: empty\ncases: []\n");
        let err = load_suite(file.path()).unwrap_err();
        assert!(err.to_string().contains("declares no cases"), "got: {err}");
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let file = write_suite(
            r#"
name: t
cases:
  - name: loaded
    max-distance: 1.5
"#,
        );
        let err = load_suite(file.path()).unwrap_err();
        assert!(err.to_string().contains("outside 0..=1"), "got: {err}");
    }

    #[test]
    fn resolve_url_joins_relative_against_base() {
        let file = write_suite(DASHBOARD_SUITE);
        let suite = load_suite(file.path()).expect("load");

        let resolved = suite
            .resolve_url("?module=Widgetize&action=index")
            .expect("resolve");
        assert_eq!(resolved, "http://localhost:8080/?module=Widgetize&action=index");

        let absolute = suite
            .resolve_url("https://example.com/page")
            .expect("absolute");
        assert_eq!(absolute, "https://example.com/page");
    }

    #[test]
    fn has_env_steps_checks_suite_and_case_hooks() {
        let file = write_suite(DASHBOARD_SUITE);
        let suite = load_suite(file.path()).expect("load");
        assert!(suite.has_env_steps());

        let file = write_suite(
            r#"
name: plain
cases:
  - name: loaded
"#,
        );
        let plain = load_suite(file.path()).expect("load");
        assert!(!plain.has_env_steps());

        let file = write_suite(
            r#"
name: case-hooks
cases:
  - name: loaded
    setup:
      - controller: { action: Dashboard.saveLayout }
"#,
        );
        let with_case_hooks = load_suite(file.path()).expect("load");
        assert!(with_case_hooks.has_env_steps());
    }

    #[test]
    fn resolve_url_without_base_fails_for_relative() {
        let suite = Suite {
            name: "nobase".to_string(),
            base_url: None,
            browser: None,
            viewport: None,
            stability: None,
            setup: vec![],
            teardown: vec![],
            cases: vec![],
        };
        let err = suite.resolve_url("?module=X").unwrap_err();
        assert!(err.to_string().contains("base-url"), "got: {err}");
    }
}
