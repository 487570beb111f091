use std::fmt;

use serde::Deserialize;

/// Locator for an element, as written in configuration:
/// `{ css: "div.card" }`, `{ xpath: ".//h2" }`, `{ id: "nearBy" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    Css(String),
    XPath(String),
    Id(String),
    Tag(String),
}

impl Selector {
    pub fn css(expr: &str) -> Self {
        Selector::Css(expr.to_string())
    }

    pub fn xpath(expr: &str) -> Self {
        Selector::XPath(expr.to_string())
    }

    pub fn id(expr: &str) -> Self {
        Selector::Id(expr.to_string())
    }

    pub fn expr(&self) -> &str {
        match self {
            Selector::Css(e) | Selector::XPath(e) | Selector::Id(e) | Selector::Tag(e) => e,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(e) => write!(f, "css={}", e),
            Selector::XPath(e) => write!(f, "xpath={}", e),
            Selector::Id(e) => write!(f, "id={}", e),
            Selector::Tag(e) => write!(f, "tag={}", e),
        }
    }
}
