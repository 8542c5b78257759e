use serde::{Deserialize, Serialize};
use std::fmt;

use super::stream_descriptor::StreamDescriptor;

/// Identifies a single video or a playlist (usually a URL).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Streams available for one video.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VideoCatalog {
    pub title: String,
    pub streams: Vec<StreamDescriptor>,
}

/// A playlist expanded into its ordered video locators.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Playlist {
    pub title: String,
    pub entries: Vec<Locator>,
}

impl Playlist {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
