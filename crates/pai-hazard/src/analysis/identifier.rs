use serde::Serialize;
use std::fmt;

/// SQL identifier that passed the allow-list check.
///
/// Table and column names are the only values ever interpolated into query
/// text, and they can only get there through this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

/// Raised when a table or column name contains anything beyond `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid SQL identifier '{0}'")]
pub struct InvalidIdentifier(pub String);

impl Identifier {
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        let mut chars = raw.chars();
        let leading_ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);

        if leading_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidIdentifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form, preserving the catalog's exact spelling.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
