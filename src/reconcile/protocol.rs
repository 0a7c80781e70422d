//! Line protocol spoken with the managing process.
//!
//! Outbound: `PROGRESS <0.00-1.00>`, `STATUS_MSG <text>`, `FINISH`.
//! Inbound: `EXIT_REQUEST`, `STOP_REQUEST`, `HANDSHAKE`.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Message sent to the managing process.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    /// Fraction of candidates settled, `0.0..=1.0`.
    Progress(f64),
    Status(String),
    Finish,
}

impl fmt::Display for ProgressMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressMessage::Progress(fraction) => {
                write!(f, "PROGRESS {:.2}", fraction.clamp(0.0, 1.0))
            }
            ProgressMessage::Status(text) => write!(f, "STATUS_MSG {text}"),
            ProgressMessage::Finish => f.write_str("FINISH"),
        }
    }
}

/// Message received from the managing process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    ExitRequest,
    StopRequest,
    Handshake,
}

impl FromStr for ControlMessage {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim() {
            "EXIT_REQUEST" => Ok(ControlMessage::ExitRequest),
            "STOP_REQUEST" => Ok(ControlMessage::StopRequest),
            "HANDSHAKE" => Ok(ControlMessage::Handshake),
            other => Err(Error::protocol(format!("unknown control message: {other}"))),
        }
    }
}
