//! Stored actions: named, multi-step event filters.

use serde::{Deserialize, Serialize};

use super::PropertyFilter;
use crate::interfaces::TeamId;

/// Event property holding the page URL.
pub const CURRENT_URL_PROPERTY: &str = "$current_url";

/// How an action step compares the page URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlMatching {
    Exact,
    #[default]
    Contains,
}

impl UrlMatching {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlMatching::Exact => "exact",
            UrlMatching::Contains => "contains",
        }
    }
}

/// One alternative of an action. Every present clause must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub event: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub url_matching: UrlMatching,
    #[serde(default)]
    pub properties: Vec<PropertyFilter>,
}

impl ActionStep {
    pub fn event(name: impl Into<String>) -> Self {
        Self {
            event: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>, matching: UrlMatching) -> Self {
        self.url = Some(url.into());
        self.url_matching = matching;
        self
    }

    pub fn with_property(mut self, filter: PropertyFilter) -> Self {
        self.properties.push(filter);
        self
    }
}

/// An action matches an event when any of its steps does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    pub team_id: TeamId,
    pub name: String,
    pub steps: Vec<ActionStep>,
}
