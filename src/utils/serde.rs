/*!
 * Serde utilities for common serialization/deserialization patterns.
 *
 * JSON-LD documents are loose about cardinality: a property such as `type`
 * may carry a single string or an array of strings. The helpers here
 * normalise those shapes so the rest of the crate can work with plain
 * vectors.
 */

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Deserialize a value that may be a single string, an array of strings, or absent.
///
/// # Examples
///
/// ```json
/// "type": "Announce"                                  // -> ["Announce"]
/// "type": ["Announce", "coar-notify:ReviewAction"]    // -> both tags, in order
/// "type": null                                        // -> []
/// ```
///
/// # Usage with serde
///
/// ```rust
/// use serde::Deserialize;
/// use ldn_core::utils::serde::deserialize_one_or_many;
///
/// #[derive(Deserialize)]
/// struct Activity {
///     #[serde(rename = "type", default, deserialize_with = "deserialize_one_or_many")]
///     kinds: Vec<String>,
/// }
///
/// let activity: Activity = serde_json::from_str(r#"{"type": "Offer"}"#).unwrap();
/// assert_eq!(activity.kinds, vec!["Offer".to_string()]);
/// ```
pub fn deserialize_one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<OneOrMany> = Option::deserialize(deserializer)?;
    Ok(match value {
        None => Vec::new(),
        Some(OneOrMany::One(tag)) => vec![tag],
        Some(OneOrMany::Many(tags)) => tags,
    })
}
