//! Product-info ("catalog metadata") types, filtering and caching.

pub mod cache;
pub mod filter;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub use cache::{CacheOutcome, CacheStats, CatalogCache};

/// Numeric identifier of an app or package.
pub type ItemId = u32;

/// One catalog lookup, and the key it is cached under.
///
/// Identifiers are kept in sorted sets so request order and duplicates never
/// change the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProductQuery {
    pub apps: BTreeSet<ItemId>,
    pub packages: BTreeSet<ItemId>,
    /// Only change numbers, no documents.
    pub meta_data_only: bool,
    /// Request access tokens for items that need one.
    pub auto_access_tokens: bool,
}

impl ProductQuery {
    pub fn new<A, P>(apps: A, packages: P) -> Self
    where
        A: IntoIterator<Item = ItemId>,
        P: IntoIterator<Item = ItemId>,
    {
        Self {
            apps: apps.into_iter().collect(),
            packages: packages.into_iter().collect(),
            meta_data_only: false,
            auto_access_tokens: true,
        }
    }

    /// Query for apps only.
    pub fn apps<A: IntoIterator<Item = ItemId>>(apps: A) -> Self {
        Self::new(apps, [])
    }

    pub fn with_meta_data_only(mut self, meta_data_only: bool) -> Self {
        self.meta_data_only = meta_data_only;
        self
    }

    pub fn with_auto_access_tokens(mut self, auto_access_tokens: bool) -> Self {
        self.auto_access_tokens = auto_access_tokens;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty() && self.packages.is_empty()
    }
}

/// Backend answer to a [`ProductQuery`]: one document per known item.
///
/// Unknown identifiers are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    #[serde(default)]
    pub apps: BTreeMap<ItemId, Value>,
    #[serde(default)]
    pub packages: BTreeMap<ItemId, Value>,
}

impl ProductInfo {
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty() && self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_query_key_ignores_order_and_duplicates() {
        let a = ProductQuery::new([20, 10, 10], [5]);
        let b = ProductQuery::new([10, 20], [5, 5]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_flags_are_part_of_key() {
        let base = ProductQuery::apps([10]);
        assert_ne!(base.clone(), base.clone().with_meta_data_only(true));
        assert_ne!(base.clone(), base.with_auto_access_tokens(false));
    }

    #[test]
    fn test_product_info_serializes_string_keys() {
        let mut info = ProductInfo::default();
        info.apps.insert(440, serde_json::json!({"common": {"name": "TF2"}}));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["apps"]["440"]["common"]["name"], "TF2");
        let back: ProductInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }

    proptest! {
        #[test]
        fn prop_query_key_is_order_independent(
            mut ids in proptest::collection::vec(0u32..1000, 0..20)
        ) {
            let forward = ProductQuery::apps(ids.clone());
            ids.reverse();
            let backward = ProductQuery::apps(ids);
            prop_assert_eq!(forward, backward);
        }
    }
}
