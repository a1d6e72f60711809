use actix_web::web;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use url::form_urlencoded;

use crate::helper::api_error::ApiError;

/// Parses URL-encoded form data from bytes, handling potential UTF-8 errors gracefully.
pub fn parse_form(form_bytes: &web::Bytes) -> Result<HashMap<String, String>, ApiError> {
    let body = std::str::from_utf8(form_bytes)
        .map_err(|_| ApiError::BadRequest("Invalid UTF-8 in request body.".to_string()))?;
    Ok(form_urlencoded::parse(body.as_bytes()).into_owned().collect())
}

/// Splits a `;`-delimited tag string, trimming and dropping empties.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

pub fn join_tags(tags: &[String]) -> String {
    tags.join(";")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrVec {
    String(String),
    Vec(Vec<String>),
}

impl StringOrVec {
    fn into_tags(self) -> Vec<String> {
        match self {
            StringOrVec::String(s) => split_tags(&s),
            StringOrVec::Vec(v) => v
                .into_iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
        }
    }
}

/// Tags arrive either as a list or as a `;`-separated string.
pub fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrVec>::deserialize(deserializer)?
        .map(StringOrVec::into_tags)
        .unwrap_or_default())
}

pub fn deserialize_optional_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrVec>::deserialize(deserializer)?.map(StringOrVec::into_tags))
}

/// Index projections keep tags as one `;`-joined string.
pub fn deserialize_tag_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let tags = deserialize_tags(deserializer)?;
    Ok(join_tags(&tags))
}

/// Ids are numbers, but older files store them as strings.
pub fn deserialize_lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_id(&Value::deserialize(deserializer)?).unwrap_or(0))
}

pub fn lenient_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Accepts strings and numbers (e.g. `"jahr": 2024`).
pub fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// `null` reads as the type's default, same as a missing key.
pub fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Tagged {
        #[serde(default, deserialize_with = "deserialize_tags")]
        tags: Vec<String>,
        #[serde(default, deserialize_with = "deserialize_lenient_id")]
        id: i64,
    }

    #[test]
    fn tags_accept_list_or_semicolon_string() {
        let a: Tagged = serde_json::from_str(r#"{"tags": "techno; live ;;mix"}"#).unwrap();
        assert_eq!(a.tags, vec!["techno", "live", "mix"]);
        let b: Tagged = serde_json::from_str(r#"{"tags": ["techno", " ", "live"]}"#).unwrap();
        assert_eq!(b.tags, vec!["techno", "live"]);
        let c: Tagged = serde_json::from_str(r#"{"tags": null}"#).unwrap();
        assert!(c.tags.is_empty());
    }

    #[test]
    fn ids_accept_numbers_and_numeric_strings() {
        let a: Tagged = serde_json::from_str(r#"{"id": 1617235200000}"#).unwrap();
        assert_eq!(a.id, 1617235200000);
        let b: Tagged = serde_json::from_str(r#"{"id": "42"}"#).unwrap();
        assert_eq!(b.id, 42);
        let c: Tagged = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(c.id, 0);
    }

    #[test]
    fn null_reads_as_default() {
        #[derive(Deserialize)]
        struct Nullable {
            #[serde(default, deserialize_with = "deserialize_null_default")]
            category: String,
        }
        let a: Nullable = serde_json::from_str(r#"{"category": null}"#).unwrap();
        assert_eq!(a.category, "");
        let b: Nullable = serde_json::from_str(r#"{"category": "Musik"}"#).unwrap();
        assert_eq!(b.category, "Musik");
        assert!(serde_json::from_str::<Nullable>(r#"{"category": 3}"#).is_err());
    }

    #[test]
    fn parse_form_decodes_pairs() {
        let body = web::Bytes::from_static(b"username=admin&password=a%26b+c");
        let parsed = parse_form(&body).unwrap();
        assert_eq!(parsed.get("username").map(String::as_str), Some("admin"));
        assert_eq!(parsed.get("password").map(String::as_str), Some("a&b c"));
    }
}
