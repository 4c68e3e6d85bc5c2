use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Market segment a symbol trades on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// Shanghai Stock Exchange (codes 6xxxxx)
    Sh,
    /// Shenzhen Stock Exchange (codes 0xxxxx, 3xxxxx)
    Sz,
    /// Beijing Stock Exchange (codes 4xxxxx, 8xxxxx, 92xxxx)
    Bj,
}

impl Venue {
    /// Derive the venue from a bare six-digit code
    pub fn from_code(code: &str) -> Self {
        if code.starts_with('6') {
            Venue::Sh
        } else if code.starts_with('4') || code.starts_with('8') || code.starts_with("92") {
            Venue::Bj
        } else {
            Venue::Sz
        }
    }

    /// Market id used by the Eastmoney `secid` parameter
    pub fn market_id(&self) -> u8 {
        match self {
            Venue::Sh => 1,
            Venue::Sz | Venue::Bj => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Sh => "sh",
            Venue::Sz => "sz",
            Venue::Bj => "bj",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "sh" => Ok(Venue::Sh),
            "sz" => Ok(Venue::Sz),
            "bj" => Ok(Venue::Bj),
            _ => Err(format!("Invalid venue: '{}'. Valid values: sh, sz, bj", s)),
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tradable symbol from the current universe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub code: String,
    pub name: String,
    pub venue: Venue,
}

/// Normalize user input into a bare six-digit code
///
/// Accepts `600000`, `sh600000`, `SZ000001` and surrounding whitespace.
/// Anything else is rejected before any fetch happens.
pub fn normalize_code(input: &str) -> Result<String, AppError> {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    let bare = ["sh", "sz", "bj"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower);

    if bare.len() == 6 && bare.chars().all(|c| c.is_ascii_digit()) {
        Ok(bare.to_string())
    } else {
        Err(AppError::UnknownSymbol(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_from_code() {
        assert_eq!(Venue::from_code("600519"), Venue::Sh);
        assert_eq!(Venue::from_code("000001"), Venue::Sz);
        assert_eq!(Venue::from_code("300750"), Venue::Sz);
        assert_eq!(Venue::from_code("430047"), Venue::Bj);
        assert_eq!(Venue::from_code("830799"), Venue::Bj);
        assert_eq!(Venue::from_code("920002"), Venue::Bj);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("600000").unwrap(), "600000");
        assert_eq!(normalize_code(" sh600000 ").unwrap(), "600000");
        assert_eq!(normalize_code("SZ000001").unwrap(), "000001");
        assert!(matches!(normalize_code("60000"), Err(AppError::UnknownSymbol(_))));
        assert!(matches!(normalize_code("hk00700"), Err(AppError::UnknownSymbol(_))));
        assert!(matches!(normalize_code("ABCDEF"), Err(AppError::UnknownSymbol(_))));
    }
}
