//! Wire protocol between the orchestrator and the compute worker.
//!
//! The worker is an external process speaking newline-delimited JSON: one
//! [`WorkerRequest`] per line on stdin, one [`WorkerReply`] per line on
//! stdout. Replies tagged with a `cell_id` belong to that cell's execution;
//! `Result` and `Error` terminate an execution.

use serde::{Deserialize, Serialize};

/// Orchestrator → worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Run a cell's source.
    Execute { cell_id: String, source: String },
    /// Install a package from the runtime's package source.
    Install { package: String },
    /// Abandon the current execution.
    Interrupt,
    /// Terminate cleanly.
    Shutdown,
}

/// Worker → orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    /// The worker finished booting and accepts requests.
    Ready,
    /// Text on stdout.
    Stdout { cell_id: String, text: String },
    /// Text on stderr.
    Stderr { cell_id: String, text: String },
    /// A rich display payload.
    DisplayData {
        cell_id: String,
        mime: String,
        /// Payload, base64 text for binary mimes.
        data: String,
    },
    /// Terminal: the value of the last expression (`None` for statements).
    Result {
        cell_id: String,
        value: Option<String>,
    },
    /// Terminal: the execution raised.
    Error {
        cell_id: String,
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    /// Outcome of an [`WorkerRequest::Install`].
    Installed {
        package: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl WorkerReply {
    /// The cell this reply belongs to, if any.
    pub fn cell_id(&self) -> Option<&str> {
        match self {
            WorkerReply::Stdout { cell_id, .. }
            | WorkerReply::Stderr { cell_id, .. }
            | WorkerReply::DisplayData { cell_id, .. }
            | WorkerReply::Result { cell_id, .. }
            | WorkerReply::Error { cell_id, .. } => Some(cell_id),
            WorkerReply::Ready | WorkerReply::Installed { .. } => None,
        }
    }

    /// Whether this reply terminates its cell's execution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerReply::Result { .. } | WorkerReply::Error { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req = WorkerRequest::Execute { cell_id: "c1".into(), source: "x = 1".into() };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"execute""#));
        let back: WorkerRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn test_reply_roundtrip() {
        let replies = vec![
            WorkerReply::Ready,
            WorkerReply::Stdout { cell_id: "c".into(), text: "hi\n".into() },
            WorkerReply::Error {
                cell_id: "c".into(),
                ename: "ValueError".into(),
                evalue: "boom".into(),
                traceback: vec!["tb".into()],
            },
            WorkerReply::Installed { package: "numpy".into(), ok: true, message: None },
        ];
        for reply in replies {
            let json = serde_json::to_string(&reply).unwrap();
            let back: WorkerReply = serde_json::from_str(&json).unwrap();
            assert_eq!(reply, back);
        }
    }

    #[test]
    fn test_terminal_classification() {
        assert!(WorkerReply::Result { cell_id: "c".into(), value: None }.is_terminal());
        assert!(WorkerReply::Error {
            cell_id: "c".into(),
            ename: "E".into(),
            evalue: String::new(),
            traceback: vec![],
        }
        .is_terminal());
        assert!(!WorkerReply::Stdout { cell_id: "c".into(), text: String::new() }.is_terminal());
        assert!(!WorkerReply::Ready.is_terminal());
    }

    #[test]
    fn test_cell_id_accessor() {
        assert_eq!(
            WorkerReply::Stdout { cell_id: "c9".into(), text: String::new() }.cell_id(),
            Some("c9")
        );
        assert_eq!(WorkerReply::Ready.cell_id(), None);
    }
}
