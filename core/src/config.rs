//! Engine configuration: category keyword map, paid-channel keywords,
//! batch sizing. Deserialized from JSON with a compiled-in default.

use crate::classify::Category;
use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Category key -> lowercase keywords. A product label containing any
    /// keyword classifies into that category.
    pub product_keywords: BTreeMap<String, Vec<String>>,

    /// A lead whose source or tags contain any of these (lowercased,
    /// substring) counts as paid acquisition.
    pub paid_channel_keywords: Vec<String>,

    /// Identities per committed batch in `recompute_all`.
    pub recompute_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut product_keywords = BTreeMap::new();
        product_keywords.insert(
            "pt".to_string(),
            vec!["personal training".into(), "pt session".into(), "pt block".into(), "1:1".into()],
        );
        product_keywords.insert(
            "classes".to_string(),
            vec!["class".into(), "bootcamp".into(), "small group".into()],
        );
        product_keywords.insert(
            "six_week".to_string(),
            vec!["6 week".into(), "six week".into(), "challenge".into()],
        );
        product_keywords.insert(
            "online_coaching".to_string(),
            vec!["online".into(), "coaching".into(), "app plan".into()],
        );
        product_keywords.insert(
            "community".to_string(),
            vec!["community".into(), "membership".into(), "open gym".into()],
        );
        product_keywords.insert(
            "corporate".to_string(),
            vec!["corporate".into(), "retreat".into(), "company wellness".into()],
        );

        Self {
            product_keywords,
            paid_channel_keywords: vec![
                "ads".into(),
                "facebook".into(),
                "instagram".into(),
                "meta".into(),
                "tiktok".into(),
                "ppc".into(),
                "paid".into(),
            ],
            recompute_chunk_size: 200,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The keyword map with category keys resolved, lowercased, in the
    /// map's stable iteration order.
    pub fn category_keywords(&self) -> Vec<(Category, Vec<String>)> {
        self.product_keywords
            .iter()
            .map(|(key, names)| {
                (
                    Category::from_key(key),
                    names.iter().map(|n| n.to_lowercase()).collect(),
                )
            })
            .collect()
    }

    /// Per-identity paid-channel test: source tag or any lead tag
    /// contains a paid keyword.
    pub fn is_paid_channel(&self, channel: Option<&str>, tags: &[String]) -> bool {
        let hit = |text: &str| {
            let lowered = text.to_lowercase();
            self.paid_channel_keywords
                .iter()
                .any(|kw| lowered.contains(kw.as_str()))
        };
        channel.map(hit).unwrap_or(false) || tags.iter().any(|t| hit(t))
    }
}
