//! Hub access token.
//!
//! Tokens come from configuration (usually the `HF_TOKEN` environment
//! variable) or from an interactive prompt. Format checking is advisory:
//! only the hub can say whether a token is actually valid.

use std::fmt;

use thiserror::Error;

/// Prefix every hub user access token carries.
pub const TOKEN_PREFIX: &str = "hf_";

const MIN_LEN: usize = 30;
const MAX_LEN: usize = 200;

/// Environment variables consulted for a default token, in order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"];

/// Why a token string looks malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenFormatError {
    #[error("token is empty")]
    Empty,

    #[error("token should start with 'hf_'")]
    MissingPrefix,

    #[error("token length {0} is outside the expected range 30-200")]
    BadLength(usize),

    #[error("token contains whitespace")]
    Whitespace,
}

/// An access token for gated hub downloads.
#[derive(Clone, PartialEq, Eq)]
pub struct HfToken(String);

impl HfToken {
    /// Accept a token only if it passes [`HfToken::validate_format`].
    pub fn parse(raw: &str) -> Result<Self, TokenFormatError> {
        let trimmed = raw.trim();
        Self::validate_format(trimmed)?;
        Ok(Self(trimmed.to_string()))
    }

    /// Accept a token without format checks (explicit user override).
    ///
    /// Surrounding whitespace is still trimmed.
    pub fn new_unchecked(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    /// Check the prefix, length and character set of a token.
    pub fn validate_format(raw: &str) -> Result<(), TokenFormatError> {
        if raw.is_empty() {
            return Err(TokenFormatError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(TokenFormatError::Whitespace);
        }
        if !raw.starts_with(TOKEN_PREFIX) {
            return Err(TokenFormatError::MissingPrefix);
        }
        if !(MIN_LEN..=MAX_LEN).contains(&raw.len()) {
            return Err(TokenFormatError::BadLength(raw.len()));
        }
        Ok(())
    }

    /// First non-empty token among [`TOKEN_ENV_VARS`].
    pub fn from_env() -> Option<Self> {
        TOKEN_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.trim().is_empty())
            .map(Self::new_unchecked)
    }

    /// The raw token.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for HfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HfToken(<redacted>)")
    }
}
