//! WebSocket protocol messages for the Ceres server.
//!
//! Defines the message types exchanged between client and server.

use ceres_core::{ExecutionStatus, RequestId};
use serde::{Deserialize, Serialize};

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Compile and run a C submission.
    Execute {
        /// C source text.
        code: String,
    },

    /// Abort the running submission.
    Interrupt,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Transcript text.
    Stream { text: String },

    /// Clear transient display; with `wait`, once new output arrives.
    ClearOutput { wait: bool },

    /// The program is blocked on input.
    DisplayInput {
        /// Id the answer must carry.
        request_id: RequestId,
        /// Relay endpoint accepting the answer.
        relay_url: Option<String>,
        /// Rendered input widget.
        html: String,
    },

    /// A submission finished.
    ExecuteReply {
        status: ExecutionStatus,
        /// Counter of submissions accepted by this server.
        execution_count: u64,
        /// Exit code of the program, if it exited normally.
        exit_code: Option<i32>,
    },

    /// Request-level error.
    Error { message: String },
}
