//! The audit trail: per-plugin ring buffers of policy decisions.
//!
//! Every capability grant/denial and every network dispatch or rejection is
//! appended here. The buffer is bounded per plugin; old events fall off the
//! front. The host UI reads the tail for display.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Severity of an audit event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

/// One recorded policy decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub level: AuditLevel,
    /// Machine-readable action, e.g. `network-request`, `network-blocked`.
    pub action: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
    /// Unix millis.
    pub at: u64,
}

impl AuditEvent {
    pub fn new(
        level: AuditLevel,
        action: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            level,
            action: action.into(),
            message: message.into(),
            data,
            at: lattice_types::now_millis(),
        }
    }
}

/// Default events retained per plugin.
pub const AUDIT_CAPACITY: usize = 256;

/// Per-plugin audit ring buffers.
pub struct AuditTrail {
    buffers: RwLock<HashMap<String, VecDeque<AuditEvent>>>,
    capacity: usize,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::with_capacity(AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffers: RwLock::new(HashMap::new()), capacity: capacity.max(1) }
    }

    /// Append an event to a plugin's buffer.
    pub fn record(&self, plugin: &str, event: AuditEvent) {
        let mut buffers = self.buffers.write();
        let buffer = buffers.entry(plugin.to_string()).or_default();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event);
    }

    /// The most recent `n` events for a plugin, oldest first.
    pub fn tail(&self, plugin: &str, n: usize) -> Vec<AuditEvent> {
        let buffers = self.buffers.read();
        match buffers.get(plugin) {
            Some(buffer) => buffer.iter().rev().take(n).rev().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Drop a plugin's buffer (unload).
    pub fn forget(&self, plugin: &str) {
        self.buffers.write().remove(plugin);
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
