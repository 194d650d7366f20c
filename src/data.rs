//! Cell values flowing from raw CSV text into the staging table.
//!
//! Every cell starts life as [`Value::Text`] (or `None` when it matches one of
//! the [`NULL_TOKENS`]); the validator then coerces the numeric canonical
//! fields into [`Value::Integer`] or [`Value::Float`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source tokens that are read as a missing value: the TSE `#NULO#` marker
/// plus the usual spreadsheet and dataframe spellings of NA.
pub const NULL_TOKENS: &[&str] = &[
    "",
    "#NULO#",
    "#N/A",
    "#N/A N/A",
    "#NA",
    "-1.#IND",
    "-1.#QNAN",
    "-NaN",
    "-nan",
    "1.#IND",
    "1.#QNAN",
    "<NA>",
    "N/A",
    "NA",
    "NULL",
    "NaN",
    "None",
    "n/a",
    "nan",
    "null",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
        }
    }

    /// Coerces the value to a number; anything that is not numeric becomes `None`.
    /// Integral numbers always come back as [`Value::Integer`].
    pub fn into_numeric(self) -> Option<Value> {
        match self {
            Value::Text(s) => parse_numeric(&s),
            Value::Integer(_) => Some(self),
            Value::Float(f) => match float_to_integer(f) {
                Some(integral) => Some(Value::Integer(integral)),
                None if f.is_finite() => Some(self),
                None => None,
            },
        }
    }

    /// Integer view of the value. Floats only qualify when they carry no fraction.
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => float_to_integer(*f),
            Value::Text(s) => match parse_numeric(s)? {
                Value::Integer(i) => Some(i),
                Value::Float(f) => float_to_integer(f),
                Value::Text(_) => None,
            },
        }
    }

    pub fn is_positive(&self) -> bool {
        match self {
            Value::Integer(i) => *i > 0,
            Value::Float(f) => *f > 0.0,
            Value::Text(_) => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn is_null_token(value: &str) -> bool {
    NULL_TOKENS.contains(&value)
}

/// Reads a raw cell, mapping null tokens to `None`.
pub fn parse_cell(value: &str) -> Option<Value> {
    if is_null_token(value) {
        None
    } else {
        Some(Value::Text(value.to_string()))
    }
}

pub fn parse_numeric(value: &str) -> Option<Value> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Some(Value::Integer(parsed));
    }
    let parsed = trimmed.parse::<f64>().ok().filter(|parsed| parsed.is_finite())?;
    Some(match float_to_integer(parsed) {
        Some(integral) => Value::Integer(integral),
        None => Value::Float(parsed),
    })
}

fn float_to_integer(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}
