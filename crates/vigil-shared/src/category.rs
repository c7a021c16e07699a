use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CategoryError;

/// Kind of incident a report describes. Closed set; each variant carries
/// the icon and title used when building push alerts.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Safety,
    Fun,
    Lost,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Safety, Category::Fun, Category::Lost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safety => "safety",
            Self::Fun => "fun",
            Self::Lost => "lost",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Safety => "\u{26a0}\u{fe0f}",
            Self::Fun => "\u{1f389}",
            Self::Lost => "\u{1f50d}",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Safety => "Safety Alert",
            Self::Fun => "Something Fun Nearby",
            Self::Lost => "Lost & Found",
        }
    }

    /// Strict lookup: case and surrounding whitespace are ignored, anything
    /// outside the enumerated set is an error.
    pub fn parse(value: &str) -> Result<Self, CategoryError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "safety" => Ok(Self::Safety),
            "fun" => Ok(Self::Fun),
            "lost" => Ok(Self::Lost),
            _ => Err(CategoryError::Invalid {
                value: value.to_string(),
            }),
        }
    }

    /// Lenient lookup used on submission: absent or unknown values fall back
    /// to [`Category::Safety`].
    pub fn normalize(value: Option<&str>) -> Self {
        value
            .and_then(|v| Self::parse(v).ok())
            .unwrap_or_default()
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Category::as_str).collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
