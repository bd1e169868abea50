//! # lattice-plugins
//!
//! The plugin sandbox host. Each plugin runs in its own OS-thread isolate
//! (a locked-down rhai engine) with no handle to the host's memory or file
//! system; every capability flows through an id-correlated RPC bridge that
//! the host gates against the plugin's manifest. Commands and panels live
//! in process-wide registries invalidated on deactivate; every policy
//! decision lands in a per-plugin audit ring buffer.

pub mod audit;
pub mod error;
pub mod host;
pub mod manifest;
pub mod netgate;
pub mod registry;
pub mod rpc;
pub mod sandbox;

pub use audit::{AUDIT_CAPACITY, AuditEvent, AuditLevel, AuditTrail};
pub use error::PluginError;
pub use host::{PluginHost, PluginState};
pub use manifest::{
    CommandDecl, PanelDecl, PanelSchema, Permission, PluginManifest, parse_manifest,
};
pub use netgate::{NetworkDispatcher, StubDispatcher, check_allowlist, host_matches, url_host};
pub use registry::{CommandEntry, PanelEntry, Registries};
pub use rpc::{HostNotification, HostRequest, RpcRequest, RpcResponse};
pub use sandbox::{BridgeRequest, BridgeSender, PluginSandbox};
