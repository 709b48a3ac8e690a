use thiserror::Error;

use crate::plugin::Lifecycle;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not open input {path:?}: {reason}")]
    OpenInput { path: String, reason: String },
    #[error("Could not find {kind} {name:?} in {path:?}")]
    MissingObject {
        kind: &'static str,
        name: String,
        path: String,
    },
    #[error("Branch {branch:?} could not be read as {expected}: {reason}")]
    BranchType {
        branch: String,
        expected: &'static str,
        reason: String,
    },
    #[error("Could not write {object:?} to {path:?}: {reason}")]
    Write {
        object: String,
        path: String,
        reason: String,
    },
    #[error("{object:?} already exists in directory {dir:?}")]
    ObjectExists { dir: String, object: String },
    #[error("Plugin {plugin:?} cannot {action} while {state:?}")]
    Lifecycle {
        plugin: String,
        action: &'static str,
        state: Lifecycle,
    },
    #[error("Cannot fill a row of width {row_width} into {tuple:?} with {n_leaves} leaves")]
    RowWidth {
        tuple: String,
        n_leaves: usize,
        row_width: usize,
    },
    #[error("Fit {name:?} failed: {reason}")]
    Fit { name: String, reason: String },
    #[error("Plotting {name:?} failed: {reason}")]
    Plot { name: String, reason: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Could not parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
