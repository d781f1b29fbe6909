//! Machine-readable status protocol.
//!
//! One record per line on the machine sink:
//!
//! ```text
//! STATUS|{"eta_seconds":4,"current_step":2,...}
//! STATUS|COMPLETE
//! ```
//!
//! The terminal `COMPLETE` record carries no payload and does not say whether
//! the work succeeded.

use crate::errors::ProtocolError;
use crate::progress::StatusSnapshot;

pub const STATUS_PREFIX: &str = "STATUS|";
pub const COMPLETE_PAYLOAD: &str = "COMPLETE";

/// A decoded machine-readable line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    /// Periodic status record
    Status(StatusSnapshot),
    /// Terminal marker, emitted once after the reporter has stopped
    Complete,
}

impl StatusLine {
    /// Encode as a single line, without the trailing newline.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            StatusLine::Status(snapshot) => Ok(format!(
                "{}{}",
                STATUS_PREFIX,
                serde_json::to_string(snapshot)?
            )),
            StatusLine::Complete => Ok(format!("{}{}", STATUS_PREFIX, COMPLETE_PAYLOAD)),
        }
    }

    /// Decode one line. Trailing `\r`/`\n` are ignored.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let payload = line
            .strip_prefix(STATUS_PREFIX)
            .ok_or_else(|| ProtocolError::MissingPrefix {
                line: line.to_string(),
            })?;

        if payload == COMPLETE_PAYLOAD {
            return Ok(StatusLine::Complete);
        }

        serde_json::from_str(payload)
            .map(StatusLine::Status)
            .map_err(ProtocolError::InvalidPayload)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StatusLine::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StatusSnapshot {
        StatusSnapshot {
            eta_seconds: 12,
            current_step: 3,
            total_steps: 6,
            tokens_used: 300,
            tokens_expected: 600,
            elapsed_seconds: 12,
            progress_percent: 50,
            current_description: "Generating code".to_string(),
        }
    }

    #[test]
    fn test_encode_complete() {
        assert_eq!(StatusLine::Complete.encode().unwrap(), "STATUS|COMPLETE");
    }

    #[test]
    fn test_encode_status_has_prefix_and_keys() {
        let line = StatusLine::Status(sample()).encode().unwrap();
        assert!(line.starts_with("STATUS|{"));
        for key in [
            "eta_seconds",
            "current_step",
            "total_steps",
            "tokens_used",
            "tokens_expected",
            "elapsed_seconds",
            "progress_percent",
            "current_description",
        ] {
            assert!(line.contains(&format!("\"{}\":", key)), "missing {}", key);
        }
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_parse_status_line() {
        let line = r#"STATUS|{"eta_seconds": 12, "current_step": 3, "total_steps": 6, "tokens_used": 300, "tokens_expected": 600, "elapsed_seconds": 12, "progress_percent": 50, "current_description": "Generating code"}"#;
        assert_eq!(StatusLine::parse(line).unwrap(), StatusLine::Status(sample()));
    }

    #[test]
    fn test_parse_complete_with_newline() {
        let parsed = StatusLine::parse("STATUS|COMPLETE\r\n").unwrap();
        assert!(parsed.is_complete());
    }

    #[test]
    fn test_parse_rejects_other_lines() {
        let err = StatusLine::parse("ETA_UPDATE:{\"type\":\"system\"}").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingPrefix { .. }));

        let err = StatusLine::parse("Result: done").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingPrefix { .. }));
    }

    #[test]
    fn test_parse_rejects_bad_payload() {
        let err = StatusLine::parse("STATUS|{\"eta_seconds\":").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload(_)));

        let err = StatusLine::parse("STATUS|DONE").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload(_)));
    }
}
