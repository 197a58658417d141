//! Product classification — free-text product labels into LTV categories.

use serde::{Deserialize, Serialize};

/// The fixed set of product categories that LTV is bucketed by.
/// `Unknown` contributes to the all-channel total only, never to a
/// category bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Pt,
    Classes,
    SixWeek,
    OnlineCoaching,
    Community,
    Corporate,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Pt => "pt",
            Category::Classes => "classes",
            Category::SixWeek => "six_week",
            Category::OnlineCoaching => "online_coaching",
            Category::Community => "community",
            Category::Corporate => "corporate",
            Category::Unknown => "unknown",
        }
    }

    pub fn from_key(key: &str) -> Category {
        match key {
            "pt" => Category::Pt,
            "classes" => Category::Classes,
            "six_week" => Category::SixWeek,
            "online_coaching" => Category::OnlineCoaching,
            "community" => Category::Community,
            "corporate" => Category::Corporate,
            _ => Category::Unknown,
        }
    }

    /// Every bucketed category, in stable order. Excludes Unknown.
    pub fn all() -> &'static [Category] {
        &[
            Category::Pt,
            Category::Classes,
            Category::SixWeek,
            Category::OnlineCoaching,
            Category::Community,
            Category::Corporate,
        ]
    }
}

/// Case-insensitive keyword lookup over the configured category map.
/// First category whose keyword appears in the label wins; labels that
/// hit nothing classify as Unknown.
pub fn classify(keywords: &[(Category, Vec<String>)], label: Option<&str>) -> Category {
    let Some(label) = label else {
        return Category::Unknown;
    };
    let normalized = label.to_lowercase();
    for (category, names) in keywords {
        if names.iter().any(|name| normalized.contains(name.as_str())) {
            return *category;
        }
    }
    Category::Unknown
}
