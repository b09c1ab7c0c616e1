//! Reductions of backend product-info documents for clients that ask for
//! less than the full documents.

use super::{ItemId, ProductInfo};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The `common` section of an app document, if present.
pub fn common_section(document: &Value) -> Option<&Map<String, Value>> {
    document.get("common")?.as_object()
}

/// True when `common.type` is "game", ignoring case.
pub fn is_game(document: &Value) -> bool {
    common_section(document)
        .and_then(|common| common.get("type"))
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.eq_ignore_ascii_case("game"))
}

/// Display names of every game app that has one.
///
/// Non-game apps and apps lacking `common.name` are dropped.
pub fn game_names(info: &ProductInfo) -> BTreeMap<ItemId, String> {
    info.apps
        .iter()
        .filter(|(_, document)| is_game(document))
        .filter_map(|(id, document)| {
            let name = common_section(document)?.get("name")?.as_str()?;
            Some((*id, name.to_string()))
        })
        .collect()
}

/// The `common` section of every game app, keyed by app ID.
pub fn game_common_sections(info: &ProductInfo) -> BTreeMap<ItemId, Value> {
    info.apps
        .iter()
        .filter(|(_, document)| is_game(document))
        .filter_map(|(id, document)| {
            common_section(document).map(|common| (*id, Value::Object(common.clone())))
        })
        .collect()
}
