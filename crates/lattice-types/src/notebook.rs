//! Notebook document model and nbformat (de)serialization.
//!
//! The on-disk format is Jupyter nbformat 4 JSON: top-level
//! `{nbformat, nbformat_minor, metadata, cells}`, each cell
//! `{cell_type, source, metadata}` plus `{outputs, execution_count}` for
//! code cells. `source` (and stream/error text) may arrive as a string or
//! an array of lines; in memory both are a single `String`, and on write we
//! emit arrays where every non-final entry ends in `\n`. Round-trips are
//! preserving up to that whitespace normalization.
//!
//! Parsing is hand-rolled over `serde_json::Value` rather than derive —
//! code cells must serialize `execution_count: null` explicitly, and
//! unknown metadata must pass through untouched.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::EnumString;

/// Metadata bag preserved verbatim across round-trips.
pub type Metadata = Map<String, Value>;

/// A MIME-type → payload bundle from display or result outputs.
pub type MimeBundle = BTreeMap<String, Value>;

/// Errors from reading a notebook file.
#[derive(Debug, thiserror::Error)]
pub enum NotebookFormatError {
    #[error("malformed notebook JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("notebook root is not a JSON object")]
    NotAnObject,
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("unknown cell_type '{0}'")]
    UnknownCellType(String),
    #[error("unknown output_type '{0}'")]
    UnknownOutputType(String),
    #[error("field '{field}' has unexpected type")]
    WrongType { field: &'static str },
    #[error("execution_count must be null or a positive integer, got {0}")]
    BadExecutionCount(i64),
}

/// What a cell is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum CellKind {
    /// Executable code, carries outputs and an execution count.
    #[default]
    Code,
    /// Markdown prose.
    Markdown,
    /// Raw passthrough text.
    Raw,
}

impl CellKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellKind::Code => "code",
            CellKind::Markdown => "markdown",
            CellKind::Raw => "raw",
        }
    }
}

/// Output stream name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl StreamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamName::Stdout => "stdout",
            StreamName::Stderr => "stderr",
        }
    }
}

/// A single cell output.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    /// Text written to stdout or stderr.
    Stream { name: StreamName, text: String },
    /// Rich display payload (images, HTML, ...).
    DisplayData { data: MimeBundle, metadata: Metadata },
    /// The value of the last expression.
    ExecuteResult {
        data: MimeBundle,
        metadata: Metadata,
        execution_count: Option<u32>,
    },
    /// A raised exception.
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

impl Output {
    /// Convenience constructor for a stdout stream output.
    pub fn stdout(text: impl Into<String>) -> Self {
        Output::Stream { name: StreamName::Stdout, text: text.into() }
    }

    /// Convenience constructor for a stderr stream output.
    pub fn stderr(text: impl Into<String>) -> Self {
        Output::Stream { name: StreamName::Stderr, text: text.into() }
    }

    /// Whether this output terminates an execution (result or error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Output::ExecuteResult { .. } | Output::Error { .. })
    }
}

/// A notebook cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// Stable cell id (nbformat ≥ 4.5); generated when the file lacks one.
    pub id: String,
    pub kind: CellKind,
    pub source: String,
    /// Outputs; only ever non-empty for code cells.
    pub outputs: Vec<Output>,
    /// Null before the first run, else positive.
    pub execution_count: Option<u32>,
    pub metadata: Metadata,
}

impl Cell {
    /// A fresh code cell.
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: CellKind::Code,
            source: source.into(),
            outputs: Vec::new(),
            execution_count: None,
            metadata: Metadata::new(),
        }
    }

    /// A fresh markdown cell.
    pub fn markdown(source: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: CellKind::Markdown,
            source: source.into(),
            outputs: Vec::new(),
            execution_count: None,
            metadata: Metadata::new(),
        }
    }
}

/// A notebook document.
#[derive(Clone, Debug, PartialEq)]
pub struct Notebook {
    pub nbformat: u32,
    pub nbformat_minor: u32,
    pub metadata: Metadata,
    pub cells: Vec<Cell>,
}

impl Notebook {
    /// An empty nbformat 4.5 notebook.
    pub fn new() -> Self {
        Self {
            nbformat: 4,
            nbformat_minor: 5,
            metadata: Metadata::new(),
            cells: Vec::new(),
        }
    }

    /// Find a cell by id.
    pub fn cell(&self, id: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == id)
    }

    /// Find a cell by id, mutably.
    pub fn cell_mut(&mut self, id: &str) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.id == id)
    }
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new()
    }
}

// ── Parsing ─────────────────────────────────────────────────────────────────

/// Parse nbformat JSON text into a [`Notebook`].
pub fn parse_notebook(text: &str) -> Result<Notebook, NotebookFormatError> {
    let root: Value = serde_json::from_str(text)?;
    let obj = root.as_object().ok_or(NotebookFormatError::NotAnObject)?;

    let nbformat = require_u32(obj, "nbformat")?;
    let nbformat_minor = require_u32(obj, "nbformat_minor")?;
    let metadata = obj
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let raw_cells = obj
        .get("cells")
        .ok_or(NotebookFormatError::MissingField("cells"))?
        .as_array()
        .ok_or(NotebookFormatError::WrongType { field: "cells" })?;

    let mut cells = Vec::with_capacity(raw_cells.len());
    for raw in raw_cells {
        cells.push(parse_cell(raw)?);
    }

    Ok(Notebook { nbformat, nbformat_minor, metadata, cells })
}

fn parse_cell(raw: &Value) -> Result<Cell, NotebookFormatError> {
    let obj = raw.as_object().ok_or(NotebookFormatError::WrongType { field: "cells[]" })?;
    let kind_str = obj
        .get("cell_type")
        .and_then(Value::as_str)
        .ok_or(NotebookFormatError::MissingField("cell_type"))?;
    let kind = CellKind::from_str(kind_str)
        .map_err(|_| NotebookFormatError::UnknownCellType(kind_str.to_string()))?;

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let source = obj
        .get("source")
        .map(join_lines)
        .transpose()?
        .unwrap_or_default();

    let metadata = obj
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut outputs = Vec::new();
    let mut execution_count = None;
    if kind == CellKind::Code {
        if let Some(raw_outputs) = obj.get("outputs").and_then(Value::as_array) {
            for o in raw_outputs {
                outputs.push(parse_output(o)?);
            }
        }
        execution_count = match obj.get("execution_count") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => {
                let i = n.as_i64().unwrap_or(-1);
                if i <= 0 {
                    return Err(NotebookFormatError::BadExecutionCount(i));
                }
                Some(i as u32)
            }
            Some(_) => return Err(NotebookFormatError::WrongType { field: "execution_count" }),
        };
    }

    Ok(Cell { id, kind, source, outputs, execution_count, metadata })
}

fn parse_output(raw: &Value) -> Result<Output, NotebookFormatError> {
    let obj = raw.as_object().ok_or(NotebookFormatError::WrongType { field: "outputs[]" })?;
    let ty = obj
        .get("output_type")
        .and_then(Value::as_str)
        .ok_or(NotebookFormatError::MissingField("output_type"))?;

    match ty {
        "stream" => {
            let name_str = obj
                .get("name")
                .and_then(Value::as_str)
                .ok_or(NotebookFormatError::MissingField("name"))?;
            let name = StreamName::from_str(name_str)
                .map_err(|_| NotebookFormatError::WrongType { field: "name" })?;
            let text = obj.get("text").map(join_lines).transpose()?.unwrap_or_default();
            Ok(Output::Stream { name, text })
        }
        "display_data" => Ok(Output::DisplayData {
            data: mime_bundle(obj),
            metadata: obj.get("metadata").and_then(Value::as_object).cloned().unwrap_or_default(),
        }),
        "execute_result" => {
            let execution_count = match obj.get("execution_count") {
                None | Some(Value::Null) => None,
                Some(Value::Number(n)) => n.as_u64().map(|v| v as u32),
                Some(_) => return Err(NotebookFormatError::WrongType { field: "execution_count" }),
            };
            Ok(Output::ExecuteResult {
                data: mime_bundle(obj),
                metadata: obj.get("metadata").and_then(Value::as_object).cloned().unwrap_or_default(),
                execution_count,
            })
        }
        "error" => Ok(Output::Error {
            ename: obj.get("ename").and_then(Value::as_str).unwrap_or_default().to_string(),
            evalue: obj.get("evalue").and_then(Value::as_str).unwrap_or_default().to_string(),
            traceback: obj
                .get("traceback")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
        }),
        other => Err(NotebookFormatError::UnknownOutputType(other.to_string())),
    }
}

fn mime_bundle(obj: &Map<String, Value>) -> MimeBundle {
    obj.get("data")
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn require_u32(obj: &Map<String, Value>, field: &'static str) -> Result<u32, NotebookFormatError> {
    obj.get(field)
        .ok_or(NotebookFormatError::MissingField(field))?
        .as_u64()
        .map(|v| v as u32)
        .ok_or(NotebookFormatError::WrongType { field })
}

/// Join a string-or-array-of-lines JSON value into one string.
fn join_lines(v: &Value) -> Result<String, NotebookFormatError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) => {
            let mut out = String::new();
            for item in items {
                out.push_str(
                    item.as_str()
                        .ok_or(NotebookFormatError::WrongType { field: "source" })?,
                );
            }
            Ok(out)
        }
        Value::Null => Ok(String::new()),
        _ => Err(NotebookFormatError::WrongType { field: "source" }),
    }
}

// ── Serialization ───────────────────────────────────────────────────────────

/// Serialize a [`Notebook`] to nbformat JSON text.
pub fn serialize_notebook(nb: &Notebook) -> String {
    let cells: Vec<Value> = nb.cells.iter().map(cell_to_value).collect();
    let root = json!({
        "nbformat": nb.nbformat,
        "nbformat_minor": nb.nbformat_minor,
        "metadata": Value::Object(nb.metadata.clone()),
        "cells": cells,
    });
    // json! never produces a non-serializable value
    serde_json::to_string_pretty(&root).unwrap_or_default()
}

fn cell_to_value(cell: &Cell) -> Value {
    let mut obj = Map::new();
    obj.insert("cell_type".into(), cell.kind.as_str().into());
    obj.insert("id".into(), cell.id.as_str().into());
    obj.insert("metadata".into(), Value::Object(cell.metadata.clone()));
    obj.insert("source".into(), split_lines(&cell.source));
    if cell.kind == CellKind::Code {
        obj.insert(
            "execution_count".into(),
            cell.execution_count.map_or(Value::Null, |n| n.into()),
        );
        obj.insert(
            "outputs".into(),
            Value::Array(cell.outputs.iter().map(output_to_value).collect()),
        );
    }
    Value::Object(obj)
}

fn output_to_value(out: &Output) -> Value {
    match out {
        Output::Stream { name, text } => json!({
            "output_type": "stream",
            "name": name.as_str(),
            "text": split_lines(text),
        }),
        Output::DisplayData { data, metadata } => json!({
            "output_type": "display_data",
            "data": data,
            "metadata": Value::Object(metadata.clone()),
        }),
        Output::ExecuteResult { data, metadata, execution_count } => json!({
            "output_type": "execute_result",
            "data": data,
            "metadata": Value::Object(metadata.clone()),
            "execution_count": execution_count.map_or(Value::Null, |n| n.into()),
        }),
        Output::Error { ename, evalue, traceback } => json!({
            "output_type": "error",
            "ename": ename,
            "evalue": evalue,
            "traceback": traceback,
        }),
    }
}

/// Split text into nbformat line arrays: every non-final entry ends in `\n`.
fn split_lines(text: &str) -> Value {
    if text.is_empty() {
        return Value::Array(Vec::new());
    }
    Value::Array(
        text.split_inclusive('\n')
            .map(|line| Value::String(line.to_string()))
            .collect(),
    )
}

// ============================================================================
// Tests
// ============================================================================
