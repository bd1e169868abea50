//! # lattice-workspace
//!
//! Authoritative workspace state for the Lattice workbench: the pane layout
//! tree with its tab operations, the tab-keyed content cache, the debounced
//! save scheduler, the vault event bus, and the `Workspace` reactor that
//! owns them all. Layout mutations are copy-on-write snapshots; everything
//! in memory is synchronous and totally ordered, only file I/O awaits.

pub mod bus;
pub mod cache;
pub mod fs;
pub mod layout;
pub mod saver;
pub mod workspace;

pub use bus::{BusMessage, EventBus, HasSubject, Subscription, matches_pattern};
pub use cache::{ContentCache, LoadState};
pub use fs::{Content, FsAdapter, FsError, LocalFs, MemoryFs};
pub use layout::{
    LayoutError, LayoutNode, LayoutTree, LayoutUpdate, Orientation, Pane, Split, normalize_sizes,
};
pub use saver::{SAVE_DEBOUNCE, SaveScheduler, SaveStatus};
pub use workspace::Workspace;
