//! Chat command parsing: `!send <target> <body>`.
//!
//! A chat line is split on whitespace into at most three fields. The first two
//! boundaries split; everything after the second boundary is the body, kept
//! verbatim (inner whitespace included).

use crate::dispatch::DispatchError;

/// The only recognized command verb.
pub const SEND_VERB: &str = "!send";

/// A parsed `!send` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCommand {
    /// Destination connection id.
    pub target: String,
    /// Literal text to deliver; empty when the line has only two fields.
    pub body: String,
}

/// Split `line` into at most three fields, one whitespace character per boundary.
pub fn split_fields(line: &str) -> Vec<&str> {
    line.splitn(3, char::is_whitespace).collect()
}

/// Parse a chat line into a [`SendCommand`].
///
/// Returns `UnsupportedCommand` when the first field is not exactly `!send`
/// (an empty line included), and `MalformedInput` when `!send` has no target.
pub fn parse(line: &str) -> Result<SendCommand, DispatchError> {
    let fields = split_fields(line);
    let verb = fields.first().copied().unwrap_or("");
    if verb != SEND_VERB {
        return Err(DispatchError::UnsupportedCommand(verb.to_string()));
    }
    let target = match fields.get(1) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => {
            return Err(DispatchError::MalformedInput(
                "!send requires a target connection id".to_string(),
            ))
        }
    };
    let body = fields.get(2).copied().unwrap_or("").to_string();
    Ok(SendCommand { target, body })
}
