use serde::{Deserialize, Serialize};
use std::fmt;

/// In-game hours since the campaign began (`hour + day * 24`).
pub type GameTime = u64;

pub const HOURS_PER_DAY: GameTime = 24;

/// Day index containing `time`.
pub fn day_of(time: GameTime) -> u64 {
    time / HOURS_PER_DAY
}

/// Hour of day (0-23) for `time`.
pub fn hour_of(time: GameTime) -> u8 {
    (time % HOURS_PER_DAY) as u8
}

/// Value stored in a story flag. Content files write these as plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FlagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FlagValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Int(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Text(value.to_string())
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Int(n) => write!(f, "{}", n),
            FlagValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Comparison used by gold and reputation requirements.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<=")]
    Lte,
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = "!=")]
    Neq,
}

impl CompareOp {
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Gte => lhs >= rhs,
            CompareOp::Lte => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Neq => lhs != rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_and_hour_split() {
        assert_eq!(day_of(0), 0);
        assert_eq!(day_of(47), 1);
        assert_eq!(hour_of(47), 23);
        assert_eq!(hour_of(48), 0);
    }

    #[test]
    fn flag_values_parse_from_json_scalars() {
        let v: FlagValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, FlagValue::Bool(true));
        let v: FlagValue = serde_json::from_str("12").unwrap();
        assert_eq!(v, FlagValue::Int(12));
        let v: FlagValue = serde_json::from_str("\"smuggler\"").unwrap();
        assert_eq!(v, FlagValue::from("smuggler"));
    }

    #[test]
    fn compare_ops_accept_symbol_aliases() {
        let op: CompareOp = serde_json::from_str("\">=\"").unwrap();
        assert_eq!(op, CompareOp::Gte);
        assert!(op.holds(5, 5));
        assert!(CompareOp::Neq.holds(1, 2));
        assert!(!CompareOp::Lte.holds(3, 2));
    }
}
