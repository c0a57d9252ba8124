//! Human-typeable session codes.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Code alphabet. `0`, `O`, `1` and `I` are left out because they are easy
/// to mistype when read off a screen.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of characters in a session code.
pub const CODE_LEN: usize = 6;

/// Query parameter carrying the code in a join link.
const JOIN_PARAM: &str = "session";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    #[error("Session code must be {CODE_LEN} characters, got {0}")]
    WrongLength(usize),

    #[error("Session code contains an invalid character: {0:?}")]
    InvalidChar(char),

    #[error("Join link has no '{JOIN_PARAM}' parameter")]
    MissingParam,
}

/// A validated 6-character session code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Draws a fresh code from `rng`. Uniqueness is not checked here.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let code = (0..CODE_LEN)
            .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Draws a fresh code from the thread-local RNG.
    pub fn random() -> Self {
        Self::generate(&mut rand::rng())
    }

    /// Strict parse: exactly [`CODE_LEN`] characters from [`CODE_ALPHABET`].
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let len = input.chars().count();
        if len != CODE_LEN {
            return Err(CodeError::WrongLength(len));
        }
        if let Some(bad) = input
            .chars()
            .find(|c| !c.is_ascii() || !CODE_ALPHABET.contains(&(*c as u8)))
        {
            return Err(CodeError::InvalidChar(bad));
        }
        Ok(Self(input.to_string()))
    }

    /// Lenient parse for typed input: drops anything that is not ASCII
    /// alphanumeric and uppercases the rest before validating.
    pub fn normalize(input: &str) -> Result<Self, CodeError> {
        let cleaned: String = input
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self::parse(&cleaned)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shareable deep link, also used as the QR code payload.
    pub fn join_url(&self, base_url: &str) -> String {
        format!(
            "{}/activity-3?{JOIN_PARAM}={}",
            base_url.trim_end_matches('/'),
            self.0
        )
    }

    /// Reads the code back out of a link built by [`SessionCode::join_url`].
    pub fn from_join_url(url: &str) -> Result<Self, CodeError> {
        let query = url
            .split_once('?')
            .map(|(_, q)| q.split('#').next().unwrap_or_default())
            .ok_or(CodeError::MissingParam)?;
        let value = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == JOIN_PARAM)
            .map(|(_, value)| value)
            .ok_or(CodeError::MissingParam)?;
        Self::normalize(value)
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}
