use serde::{Deserialize, Deserializer, Serialize};

/// Response envelope emitted by the engine, one JSON object per line.
///
/// Only the fields declared here survive a decode/encode pass; anything else
/// the engine adds is dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AutocompleteResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub old_prefix: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<ResultEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_message: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResultEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub new_prefix: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub old_suffix: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub new_suffix: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub detail: String,
}

/// Engines may emit `null` for any field; it reads as the field's empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}
