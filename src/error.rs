use camino::Utf8PathBuf;
use thiserror::Error;

use crate::task::TaskKey;

pub use anyhow::Error as UserlandError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Context field '{0}' is required")]
    MissingField(&'static str),

    #[error(
        "Update policy is ambiguous: both the external update service and automatic upgrades are requested"
    )]
    AmbiguousUpdatePolicy,

    #[error("Invalid sysctl parameter '{0}', expected 'key = value'")]
    InvalidSysctl(String),

    #[error("Couldn't read context file '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid node context JSON.\n{0}")]
    Parse(#[from] serde_json::Error),
}

/// Two tasks claimed the same key with different content.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Task '{key}' is already defined with different content")]
pub struct ConflictError {
    pub key: TaskKey,
}

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Task '{key}' can't be rendered: {reason}")]
    Malformed { key: TaskKey, reason: String },

    #[error("Block {block}: {source}")]
    Block {
        block: usize,
        source: serde_json::Error,
    },

    #[error("Block {block} duplicates task '{key}'")]
    Duplicate { block: usize, key: TaskKey },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("Task '{task}' depends on '{dependency}', which is not in the graph")]
    Missing { task: TaskKey, dependency: TaskKey },

    #[error("Dependency cycle detected at task '{0}'")]
    Cycle(TaskKey),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("Builder '{0}':\n{1}")]
    Builder(String, Box<BuildError>),

    #[error("An error occurred in builder code.\n{0}")]
    Userland(#[from] UserlandError),
}

impl BuildError {
    /// The innermost error, with every runner wrapping peeled off.
    pub fn root(&self) -> &BuildError {
        match self {
            BuildError::Builder(_, inner) => inner.root(),
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum GoldenError {
    #[error("Error while loading scenario context:\n{0}")]
    Context(#[from] ConfigError),

    #[error("Error while building the task graph:\n{0}")]
    Build(#[from] BuildError),

    #[error("Error while serializing the task graph:\n{0}")]
    Serialization(#[from] SerializationError),

    #[error("Couldn't access fixture '{path}': {source}{hint}")]
    Fixture {
        path: Utf8PathBuf,
        source: std::io::Error,
        hint: &'static str,
    },

    #[error("Fixture '{path}' does not match the generated output:\n{diff}")]
    Mismatch { path: Utf8PathBuf, diff: String },
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("Refusing to apply a malformed graph:\n{0}")]
    Invalid(#[from] SerializationError),

    #[error("Task '{0}':\n{1}")]
    Task(TaskKey, UserlandError),
}
