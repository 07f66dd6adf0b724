use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Client-observable state of a problem-solving session.
///
/// `Processing` requires a live connection and is never persisted; only
/// `Review` and `Solution` survive a reload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViewState {
    #[default]
    Input,
    Processing,
    Review,
    Solution,
}

impl ViewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Processing => "processing",
            Self::Review => "review",
            Self::Solution => "solution",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "input" => Some(Self::Input),
            "processing" => Some(Self::Processing),
            "review" => Some(Self::Review),
            "solution" => Some(Self::Solution),
            _ => None,
        }
    }

    pub fn is_persistable(&self) -> bool {
        matches!(self, Self::Input | Self::Review | Self::Solution)
    }
}
