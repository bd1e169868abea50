//! Applying execution messages to the notebook document model.
//!
//! The view subscribes to an execution and forwards each message here; the
//! cell's previous outputs are cleared when the run starts, outputs append
//! in FIFO order, and the execution count lands with completion.

use lattice_types::Notebook;

use crate::orchestrator::ExecMessage;

/// Fold one execution message into the notebook. Unknown cell ids are
/// ignored (the cell may have been deleted mid-run).
pub fn apply_message(notebook: &mut Notebook, message: &ExecMessage) {
    match message {
        ExecMessage::Started { cell_id } => {
            if let Some(cell) = notebook.cell_mut(cell_id) {
                cell.outputs.clear();
            }
        }
        ExecMessage::Output { cell_id, output } => {
            if let Some(cell) = notebook.cell_mut(cell_id) {
                cell.outputs.push(output.clone());
            }
        }
        ExecMessage::Completed { cell_id, execution_count, .. } => {
            if let Some(cell) = notebook.cell_mut(cell_id) {
                cell.execution_count = Some(*execution_count);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
