//! The interaction vocabulary a test case scripts against a page.
//!
//! Suite files list actions as externally tagged YAML entries:
//!
//! ```yaml
//! actions:
//!   - navigate: { url: "?module=Widgetize&action=index", timeout: 10s }
//!   - click: { css: ".widgetTop" }
//!   - move-to: { css: "#dashboardWidgetsArea > .col", pause: 200ms }
//!   - type-text: { css: "#newDashboardName", text: "newdash2" }
//!   - evaluate: { script: "$('.widgetTop').trigger('mouseenter');" }
//! ```

use crate::locator::Locator;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Load a URL and wait for the navigation to commit.
    Navigate {
        url: String,
        #[serde(
            default,
            with = "humantime_serde",
            skip_serializing_if = "Option::is_none"
        )]
        timeout: Option<Duration>,
    },
    /// Click the first element the locator resolves to.
    Click {
        #[serde(flatten)]
        locator: Locator,
        #[serde(
            default,
            with = "humantime_serde",
            skip_serializing_if = "Option::is_none"
        )]
        timeout: Option<Duration>,
    },
    /// Move the pointer over the element, optionally pausing afterwards so
    /// hover UI can appear.
    MoveTo {
        #[serde(flatten)]
        locator: Locator,
        #[serde(
            default,
            with = "humantime_serde",
            skip_serializing_if = "Option::is_none"
        )]
        pause: Option<Duration>,
    },
    /// Focus the element and type text into it.
    TypeText {
        #[serde(flatten)]
        locator: Locator,
        text: String,
    },
    /// Run a script in the page, optionally pausing afterwards.
    Evaluate {
        script: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<serde_json::Value>,
        #[serde(
            default,
            with = "humantime_serde",
            skip_serializing_if = "Option::is_none"
        )]
        pause: Option<Duration>,
    },
}

impl Action {
    /// Short human-readable form for progress lines and timeout contexts.
    pub fn describe(&self) -> String {
        match self {
            Action::Navigate { url, .. } => format!("navigate to {}", url),
            Action::Click { locator, .. } => format!("click {}", locator),
            Action::MoveTo { locator, .. } => format!("move to {}", locator),
            Action::TypeText { locator, .. } => format!("type into {}", locator),
            Action::Evaluate { .. } => "evaluate script".to_string(),
        }
    }

    /// The locator this action targets, when it targets one.
    pub fn locator(&self) -> Option<&Locator> {
        match self {
            Action::Click { locator, .. }
            | Action::MoveTo { locator, .. }
            | Action::TypeText { locator, .. } => Some(locator),
            Action::Navigate { .. } | Action::Evaluate { .. } => None,
        }
    }
}
