use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// String-to-string parameter map handed to a task, either parsed from CLI
/// `--key=value` tokens or decoded from a queued entry's payload.
///
/// Reads are total: an absent key reads as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskParams(HashMap<String, String>);

impl TaskParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `--key=value` tokens. A token without `=` yields `key=""`;
    /// leading dashes are optional and tokens with an empty key are skipped.
    pub fn from_cli_args<S: AsRef<str>>(args: &[S]) -> Self {
        let mut params = Self::new();
        for arg in args {
            let token = arg.as_ref().trim_start_matches('-');
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key, value),
                None => (token, ""),
            };
            if key.is_empty() {
                continue;
            }
            params.set(key, value);
        }
        params
    }

    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        if payload.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(payload).map(Self)
    }
}

impl From<HashMap<String, String>> for TaskParams {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TaskParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
