use std::{fmt::Display, str::FromStr};

use rand::{seq::SliceRandom, Rng};
use serde::Serialize;
use thiserror::Error;

/// Symbols a join code is drawn from. Look-alikes (I, O, 0, 1) are left out.
pub const JOIN_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const JOIN_CODE_LENGTH: usize = 6;

/// The short code people type in to join a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JoinCode(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinCodeError {
    #[error("Join code must be 6 characters long")]
    Length,
    #[error("Join code contains invalid character {0:?}")]
    InvalidCharacter(char),
}

impl JoinCode {
    /// Generates a random code
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..JOIN_CODE_LENGTH)
            .filter_map(|_| JOIN_CODE_ALPHABET.choose(rng))
            .map(|&b| b as char)
            .collect();

        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for JoinCode {
    type Err = JoinCodeError;

    /// Parses user input, ignoring case and surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();

        if normalized.chars().count() != JOIN_CODE_LENGTH {
            return Err(JoinCodeError::Length);
        }

        if let Some(invalid) = normalized
            .chars()
            .find(|c| !c.is_ascii() || !JOIN_CODE_ALPHABET.contains(&(*c as u8)))
        {
            return Err(JoinCodeError::InvalidCharacter(invalid));
        }

        Ok(Self(normalized))
    }
}

impl Display for JoinCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
