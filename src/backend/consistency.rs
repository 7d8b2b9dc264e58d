//! Group consistency requirements.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How many members of a group must accept a write for it to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Consistency {
    /// Every member must accept.
    #[default]
    All,
    /// One acceptance is enough.
    Any,
    /// At least N members must accept.
    Quorum(usize),
}

impl Consistency {
    /// Acceptances needed for a group of `total` members, `live` of which are not down.
    ///
    /// Down members are excluded from the quorum denominator, so a
    /// `quorum-N` group needs `min(N, live)` acceptances, never fewer than one.
    pub fn required(&self, total: usize, live: usize) -> usize {
        match self {
            Consistency::All => total,
            Consistency::Any => total.min(1),
            Consistency::Quorum(n) => (*n).min(live).max(1).min(total),
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consistency::All => f.write_str("all"),
            Consistency::Any => f.write_str("any"),
            Consistency::Quorum(n) => write!(f, "quorum-{}", n),
        }
    }
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Consistency::All),
            "any" => Ok(Consistency::Any),
            other => {
                let n = other
                    .strip_prefix("quorum-")
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| {
                        format!("invalid consistency '{}', expected all, any or quorum-N", s)
                    })?;
                if n == 0 {
                    return Err("quorum must be at least 1".to_string());
                }
                Ok(Consistency::Quorum(n))
            }
        }
    }
}

impl TryFrom<String> for Consistency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Consistency> for String {
    fn from(value: Consistency) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("all".parse::<Consistency>().unwrap(), Consistency::All);
        assert_eq!("ANY".parse::<Consistency>().unwrap(), Consistency::Any);
        assert_eq!("quorum-2".parse::<Consistency>().unwrap(), Consistency::Quorum(2));
        assert!("quorum-0".parse::<Consistency>().is_err());
        assert!("quorum-x".parse::<Consistency>().is_err());
        assert!("majority".parse::<Consistency>().is_err());
        assert_eq!(Consistency::Quorum(3).to_string(), "quorum-3");
    }

    #[test]
    fn test_required_acks() {
        assert_eq!(Consistency::All.required(3, 1), 3);
        assert_eq!(Consistency::Any.required(3, 0), 1);
        assert_eq!(Consistency::Quorum(2).required(3, 3), 2);
        // One member down: the denominator shrinks but never below one.
        assert_eq!(Consistency::Quorum(3).required(3, 2), 2);
        assert_eq!(Consistency::Quorum(2).required(3, 0), 1);
    }
}
