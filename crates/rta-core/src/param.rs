//! RPC parameters: string-encoded values tagged with their kind.
//!
//! Receivers re-parse `value` according to `kind`. Handlers validate the
//! argument count with [`take`] and each argument's kind with the typed
//! accessors; both failures map to a `FAILED` response with a fixed
//! diagnostic string via [`ParamError::into_response`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::response::Response;

/// Diagnostic payload for a call with the wrong number of arguments.
pub const INCORRECT_PARAM_COUNT: &str = "Incorrect number of parameters";

/// Diagnostic payload for an argument of the wrong kind or an unparsable value.
pub const BAD_VALUE_TYPE: &str = "Bad type of the value";

/// Kind tag carried alongside every parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Nil,
    Int,
    Double,
    Bool,
    String,
}

/// One RPC argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub value: String,
    pub kind: ParamKind,
}

impl Parameter {
    pub fn new(value: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            value: value.into(),
            kind,
        }
    }

    pub fn nil() -> Self {
        Self::new("", ParamKind::Nil)
    }

    pub fn int(value: i64) -> Self {
        Self::new(value.to_string(), ParamKind::Int)
    }

    pub fn double(value: f64) -> Self {
        Self::new(value.to_string(), ParamKind::Double)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(value.to_string(), ParamKind::Bool)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(value, ParamKind::String)
    }

    fn expect_kind(&self, expected: ParamKind) -> Result<(), ParamError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(ParamError::BadType {
                expected,
                actual: self.kind,
                value: self.value.clone(),
            })
        }
    }

    fn parse_as<T: FromStr>(&self, expected: ParamKind) -> Result<T, ParamError> {
        self.expect_kind(expected)?;
        self.value.trim().parse().map_err(|_| ParamError::BadType {
            expected,
            actual: self.kind,
            value: self.value.clone(),
        })
    }

    pub fn as_str(&self) -> Result<&str, ParamError> {
        self.expect_kind(ParamKind::String)?;
        Ok(&self.value)
    }

    pub fn into_string(self) -> Result<String, ParamError> {
        self.expect_kind(ParamKind::String)?;
        Ok(self.value)
    }

    pub fn as_int(&self) -> Result<i64, ParamError> {
        self.parse_as(ParamKind::Int)
    }

    pub fn as_double(&self) -> Result<f64, ParamError> {
        self.parse_as(ParamKind::Double)
    }

    pub fn as_bool(&self) -> Result<bool, ParamError> {
        self.parse_as(ParamKind::Bool)
    }
}

/// Argument validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("expected {expected} parameters, got {actual}")]
    IncorrectCount { expected: String, actual: usize },

    #[error("expected {expected:?} parameter, got {actual:?} ({value:?})")]
    BadType {
        expected: ParamKind,
        actual: ParamKind,
        value: String,
    },
}

impl ParamError {
    /// The fixed diagnostic sent back to the caller.
    pub fn diagnostic(&self) -> &'static str {
        match self {
            ParamError::IncorrectCount { .. } => INCORRECT_PARAM_COUNT,
            ParamError::BadType { .. } => BAD_VALUE_TYPE,
        }
    }

    pub fn into_response(self) -> Response {
        Response::failed(self.diagnostic())
    }
}

/// Takes exactly `N` parameters, failing on any other count.
pub fn take<const N: usize>(params: Vec<Parameter>) -> Result<[Parameter; N], ParamError> {
    let actual = params.len();
    params.try_into().map_err(|_| ParamError::IncorrectCount {
        expected: N.to_string(),
        actual,
    })
}

/// Takes `N` required parameters followed by at most one optional parameter.
pub fn take_with_optional<const N: usize>(
    mut params: Vec<Parameter>,
) -> Result<([Parameter; N], Option<Parameter>), ParamError> {
    let actual = params.len();
    let optional = match actual {
        n if n == N => None,
        n if n == N + 1 => params.pop(),
        _ => {
            return Err(ParamError::IncorrectCount {
                expected: format!("{N} or {}", N + 1),
                actual,
            })
        }
    };
    Ok((take::<N>(params)?, optional))
}
