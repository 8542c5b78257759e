use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the video variant is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResolutionPolicy {
    /// Highest available resolution.
    #[default]
    Max,
    /// Exactly this resolution label, e.g. "720p".
    Exact(String),
}

impl ResolutionPolicy {
    /// Whether a quality label satisfies an exact request.
    pub fn matches(&self, quality: &str) -> bool {
        match self {
            Self::Max => true,
            Self::Exact(label) => label.eq_ignore_ascii_case(quality.trim()),
        }
    }
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.is_empty() {
            return Err("resolution policy must not be empty".to_string());
        }
        if value.eq_ignore_ascii_case("max") {
            Ok(Self::Max)
        } else {
            Ok(Self::Exact(value.to_string()))
        }
    }
}

impl TryFrom<String> for ResolutionPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResolutionPolicy> for String {
    fn from(policy: ResolutionPolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => f.write_str("max"),
            Self::Exact(label) => f.write_str(label),
        }
    }
}
