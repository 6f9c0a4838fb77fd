//! Oracle response protocol
//!
//! ## Grammar
//!
//! ````text
//! ACTION: CODE_GENERATION
//! CODE:
//! ```<language>
//! <code>
//! ```
//! EXPLANATION: <text to end of response>
//!
//! ACTION: <DATA_ANALYSIS|FORECAST|GENERAL>
//! EXPLANATION: <one line>
//! ````
//!
//! Repair responses carry `ERROR ANALYSIS:`, `PROPOSED FIXES:`, a fenced
//! code block and `EXPLANATION:`. Missing pieces come back as empty strings
//! or `None`; only a missing action is an error.

use std::fmt;
use thiserror::Error;

pub const CODE_GENERATION_MARKER: &str = "ACTION: CODE_GENERATION";
pub const ACTION_MARKER: &str = "ACTION:";
pub const EXPLANATION_MARKER: &str = "EXPLANATION:";
pub const ERROR_ANALYSIS_MARKER: &str = "ERROR ANALYSIS:";
pub const PROPOSED_FIXES_MARKER: &str = "PROPOSED FIXES:";
pub const CODE_MARKER: &str = "CODE:";

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Couldn't determine appropriate action")]
    NoActionDetermined,
}

impl From<ProtocolError> for fc_core::Error {
    fn from(err: ProtocolError) -> Self {
        fc_core::Error::parse_failure(err.to_string())
    }
}

/// Action requested by the oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CodeGeneration,
    DataAnalysis,
    Forecast,
    General,
    /// Token outside the protocol, kept upper-cased
    Other(String),
}

impl Action {
    pub fn from_token(token: &str) -> Self {
        let token = token.trim().to_uppercase();
        match token.as_str() {
            "CODE_GENERATION" => Action::CodeGeneration,
            "DATA_ANALYSIS" => Action::DataAnalysis,
            "FORECAST" => Action::Forecast,
            "GENERAL" => Action::General,
            _ => Action::Other(token),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::CodeGeneration => "CODE_GENERATION",
            Action::DataAnalysis => "DATA_ANALYSIS",
            Action::Forecast => "FORECAST",
            Action::General => "GENERAL",
            Action::Other(token) => token,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub action: Action,
    pub code: Option<String>,
    pub explanation: Option<String>,
}

/// Sections of a repair response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepairSections {
    pub error_analysis: String,
    pub proposed_fixes: String,
    pub code: Option<String>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResponseParser {
    language: String,
    opening_fence: String,
}

impl ResponseParser {
    pub fn new(language: impl Into<String>) -> Self {
        let language = language.into();
        Self {
            opening_fence: format!("{}{}\n", FENCE, language),
            language,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn parse_response(&self, text: &str) -> Result<ParsedResponse, ProtocolError> {
        if text.contains(CODE_GENERATION_MARKER) {
            return Ok(ParsedResponse {
                action: Action::CodeGeneration,
                code: self.extract_code(text).map(|(code, _)| code),
                explanation: text
                    .split_once(EXPLANATION_MARKER)
                    .map(|(_, rest)| rest.trim().to_string()),
            });
        }

        let mut action = None;
        let mut explanation = None;
        for line in text.lines().map(str::trim_start) {
            if action.is_none() {
                if let Some(token) = line.strip_prefix(ACTION_MARKER) {
                    if !token.trim().is_empty() {
                        action = Some(Action::from_token(token));
                    }
                    continue;
                }
            }
            if explanation.is_none() {
                if let Some(rest) = line.strip_prefix(EXPLANATION_MARKER) {
                    explanation = Some(rest.trim().to_string());
                }
            }
        }

        let action = action.ok_or(ProtocolError::NoActionDetermined)?;
        Ok(ParsedResponse {
            action,
            code: None,
            explanation,
        })
    }

    /// Code between the first opening fence and its closing fence, trimmed,
    /// with the byte offset just past the closing fence
    pub fn extract_code(&self, text: &str) -> Option<(String, usize)> {
        let start = text.find(&self.opening_fence)? + self.opening_fence.len();
        let end = start + text[start..].find(FENCE)?;
        let code = text[start..end].trim();
        if code.is_empty() {
            None
        } else {
            Some((code.to_string(), end + FENCE.len()))
        }
    }

    pub fn parse_repair(&self, text: &str) -> RepairSections {
        let error_analysis = section(
            text,
            ERROR_ANALYSIS_MARKER,
            &[PROPOSED_FIXES_MARKER, CODE_MARKER, EXPLANATION_MARKER],
        );
        let proposed_fixes = section(text, PROPOSED_FIXES_MARKER, &[CODE_MARKER, EXPLANATION_MARKER]);

        let (code, explanation) = match self.extract_code(text) {
            Some((code, after)) => {
                let explanation = text[after..]
                    .split_once(EXPLANATION_MARKER)
                    .map(|(_, rest)| rest.trim().to_string());
                (Some(code), explanation)
            }
            None => (None, None),
        };

        RepairSections {
            error_analysis,
            proposed_fixes,
            code,
            explanation,
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new("python")
    }
}

/// Text after `marker` up to the nearest following terminator, trimmed
fn section(text: &str, marker: &str, terminators: &[&str]) -> String {
    let Some((_, rest)) = text.split_once(marker) else {
        return String::new();
    };
    let end = terminators
        .iter()
        .filter_map(|t| rest.find(t))
        .min()
        .unwrap_or(rest.len());
    rest[..end].trim().to_string()
}
