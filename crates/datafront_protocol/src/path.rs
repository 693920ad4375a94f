//! Resource paths identifying registered data sources.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from parsing a path string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path text was empty.
    #[error("path is empty")]
    Empty,
    /// A fragment between separators was empty.
    #[error("path contains an empty fragment: {text}")]
    EmptyFragment {
        /// The offending path text.
        text: String,
    },
}

/// An ordered list of string fragments naming one data source.
///
/// Paths are the registry keys of a DataFront: every table, query, singleton,
/// and action is attached under exactly one path. Two paths are equal when
/// their fragment sequences are equal. The textual form joins fragments with
/// `/` and is what action names carry on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePath(Vec<String>);

impl ResourcePath {
    /// Creates a path from fragments.
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fragments.into_iter().map(Into::into).collect())
    }

    /// Parses a `/`-joined path string.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        if text.is_empty() {
            return Err(PathError::Empty);
        }
        let fragments: Vec<String> = text.split('/').map(str::to_string).collect();
        if fragments.iter().any(String::is_empty) {
            return Err(PathError::EmptyFragment {
                text: text.to_string(),
            });
        }
        Ok(Self(fragments))
    }

    /// Returns the fragments in order.
    #[must_use]
    pub fn fragments(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of fragments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the path has no fragments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl From<&str> for ResourcePath {
    /// Converts a single fragment into a one-element path.
    ///
    /// Unlike [`ResourcePath::parse`], the text is not split on `/`.
    fn from(fragment: &str) -> Self {
        Self(vec![fragment.to_string()])
    }
}
