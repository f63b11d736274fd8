use std::fmt;
use serde::{Deserialize, Serialize};

use super::severity::Severity;

/// A source location a diagnostic can be anchored to. Populated by the
/// excluded front-end via [`crate::traits::SourceLocationProvider`]; the
/// core itself never computes one from raw source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// One of up to six printf-style substitution parameters (spec.md #7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiagnosticParam {
    Str(String),
    Int(i64),
}

impl fmt::Display for DiagnosticParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticParam::Str(s) => write!(f, "{s}"),
            DiagnosticParam::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for DiagnosticParam {
    fn from(v: &str) -> Self {
        DiagnosticParam::Str(v.to_string())
    }
}

impl From<String> for DiagnosticParam {
    fn from(v: String) -> Self {
        DiagnosticParam::Str(v)
    }
}

impl From<i64> for DiagnosticParam {
    fn from(v: i64) -> Self {
        DiagnosticParam::Int(v)
    }
}

/// A single diagnostic message, matching spec.md #7's field list: severity,
/// a stable numeric code, a class, a message, and up to six substitution
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: u32,
    pub severity: Severity,
    pub class: String,
    pub message: String,
    pub params: Vec<DiagnosticParam>,
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn new(code: u32, severity: Severity, class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            class: class.into(),
            message: message.into(),
            params: Vec::new(),
            location: None,
        }
    }

    pub fn error(code: u32, class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, class, message)
    }

    pub fn warning(code: u32, class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, class, message)
    }

    pub fn with_param(mut self, param: impl Into<DiagnosticParam>) -> Self {
        debug_assert!(self.params.len() < 6, "spec.md #7 allows at most six substitution parameters");
        self.params.push(param.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:05}] {} ({}): {}", self.code, self.severity, self.class, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " at {}:{}:{}", loc.file, loc.line, loc.column)?;
        }
        Ok(())
    }
}
