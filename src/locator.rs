//! Element addressing for driver actions and capture scopes.
//!
//! A [`Locator`] keeps the harness independent of one DOM query dialect:
//! CSS selectors, visible-text matching, and ARIA roles are all first-class.
//! The serde form is externally tagged (`{css: ".widgetTop"}`), which reads
//! naturally in suite files and in the JSON plan handed to the driver
//! script.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locator {
    #[serde(rename = "css")]
    ByCss(String),
    #[serde(rename = "text")]
    ByText(String),
    #[serde(rename = "role")]
    ByRole(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::ByCss(selector.into())
    }

    pub fn text(needle: impl Into<String>) -> Self {
        Locator::ByText(needle.into())
    }

    pub fn role(role: impl Into<String>) -> Self {
        Locator::ByRole(role.into())
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::ByCss(v) | Locator::ByText(v) | Locator::ByRole(v) => v,
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::ByCss(v) => write!(f, "css={}", v),
            Locator::ByText(v) => write!(f, "text={}", v),
            Locator::ByRole(v) => write!(f, "role={}", v),
        }
    }
}
