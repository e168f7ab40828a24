use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// File name given to inputs submitted as a raw request body.
pub const UPLOADED_INPUT_NAME: &str = "event_log.csv";

/// Where the input of a job comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobInput {
    /// Fetched into the working directory when the job is processed.
    Remote { url: Url },
    /// Staged into the working directory at submission time.
    Uploaded { file_name: String },
}

impl JobInput {
    pub fn uploaded() -> Self {
        Self::Uploaded {
            file_name: UPLOADED_INPUT_NAME.to_string(),
        }
    }

    /// Name of the input file inside the job's working directory.
    pub fn file_name(&self) -> String {
        match self {
            Self::Remote { url } => url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .filter(|name| *name != "." && *name != "..")
                .map(|name| name.to_string())
                .unwrap_or_else(|| UPLOADED_INPUT_NAME.to_string()),
            Self::Uploaded { file_name } => file_name.clone(),
        }
    }
}

/// Logical column name (`case`, `activity`, ...) to the column used by the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping(pub BTreeMap<String, String>);

impl ColumnMapping {
    /// Logical columns the analysis understands.
    pub const KNOWN_COLUMNS: [&'static str; 5] =
        ["case", "activity", "resource", "start_timestamp", "end_timestamp"];

    /// Pick the known columns out of arbitrary key/value pairs, e.g. a query string.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let map = pairs
            .into_iter()
            .filter(|(key, _)| Self::KNOWN_COLUMNS.contains(key))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(|s| s.as_str())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }
}
