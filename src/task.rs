//! Declarative units of desired node state.
//!
//! A [`Task`] describes *what* the node should look like (a file with some
//! contents, a package installed, a unit enabled), never *how* to get there.
//! Every task is identified by a [`TaskKey`] made of its kind and name; the
//! key is what the [`TaskGraph`](crate::TaskGraph) deduplicates on.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SerializationError;

/// Unit suffixes systemd recognizes for the units we manage.
const UNIT_SUFFIXES: &[&str] = &[
    ".service", ".timer", ".socket", ".target", ".mount", ".path",
];

/// The kind part of a [`TaskKey`].
///
/// Variants are declared in the lexicographic order of their rendered names,
/// so the derived `Ord` agrees with the string ordering of keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskKind {
    File,
    Package,
    Service,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::File => "File",
            TaskKind::Package => "Package",
            TaskKind::Service => "Service",
        }
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "File" => Ok(TaskKind::File),
            "Package" => Ok(TaskKind::Package),
            "Service" => Ok(TaskKind::Service),
            other => Err(format!("unknown task kind '{other}'")),
        }
    }
}

/// Stable identity of a task, rendered as `Kind/name`.
///
/// For files the name is the absolute path, so keys look like
/// `File//etc/apt/apt.conf.d/20auto-upgrades`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey {
    kind: TaskKind,
    name: String,
}

impl TaskKey {
    pub fn new(kind: TaskKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self::new(TaskKind::File, path)
    }

    pub fn package(name: impl Into<String>) -> Self {
        Self::new(TaskKind::Package, name)
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::new(TaskKind::Service, name)
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for TaskKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.name)
    }
}

impl FromStr for TaskKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('/')
            .ok_or_else(|| format!("task key '{s}' is missing a kind"))?;

        if name.is_empty() {
            return Err(format!("task key '{s}' has an empty name"));
        }

        Ok(TaskKey::new(kind.parse()?, name))
    }
}

impl Serialize for TaskKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A file that must exist with exactly the given contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTask {
    pub path: Utf8PathBuf,
    pub contents: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<TaskKey>,
}

impl FileTask {
    pub fn new(path: impl Into<Utf8PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            mode: None,
            owner: None,
            depends_on: BTreeSet::new(),
        }
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn depends_on(mut self, key: TaskKey) -> Self {
        self.depends_on.insert(key);
        self
    }
}

/// A managed systemd unit.
///
/// `definition` is the unit file body; `None` means the unit is shipped by a
/// package and only its state is managed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUnitTask {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    pub enabled: bool,
    pub running: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<TaskKey>,
}

impl ServiceUnitTask {
    /// A unit that is enabled and running once converged.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: None,
            enabled: true,
            running: true,
            depends_on: BTreeSet::new(),
        }
    }

    pub fn definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn running(mut self, running: bool) -> Self {
        self.running = running;
        self
    }

    pub fn depends_on(mut self, key: TaskKey) -> Self {
        self.depends_on.insert(key);
        self
    }
}

/// A package installed through the distribution's package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageTask {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<TaskKey>,
}

impl PackageTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            depends_on: BTreeSet::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn depends_on(mut self, key: TaskKey) -> Self {
        self.depends_on.insert(key);
        self
    }
}

/// A single declarative unit of desired node state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    File(FileTask),
    Package(PackageTask),
    Service(ServiceUnitTask),
}

impl Task {
    pub fn key(&self) -> TaskKey {
        match self {
            Task::File(file) => TaskKey::file(normalized(&file.path).as_str()),
            Task::Package(package) => TaskKey::package(&package.name),
            Task::Service(service) => TaskKey::service(&service.name),
        }
    }

    /// Keys of the tasks that must converge before this one.
    pub fn dependencies(&self) -> &BTreeSet<TaskKey> {
        match self {
            Task::File(file) => &file.depends_on,
            Task::Package(package) => &package.depends_on,
            Task::Service(service) => &service.depends_on,
        }
    }

    /// Checks that the task can be rendered canonically.
    pub fn validate(&self) -> Result<(), SerializationError> {
        let malformed = |reason: String| SerializationError::Malformed {
            key: self.key(),
            reason,
        };

        match self {
            Task::File(file) => {
                if !file.path.is_absolute() {
                    return Err(malformed(format!("path '{}' is not absolute", file.path)));
                }
                if normalized(&file.path).as_str() != file.path.as_str()
                    || file.path.components().any(|c| c == Utf8Component::ParentDir)
                {
                    return Err(malformed(format!("path '{}' is not normalized", file.path)));
                }
                if let Some(mode) = &file.mode {
                    let octal = (3..=4).contains(&mode.len())
                        && mode.chars().all(|c| ('0'..='7').contains(&c));
                    if !octal {
                        return Err(malformed(format!("mode '{mode}' is not an octal mode")));
                    }
                }
                if let Some(owner) = &file.owner {
                    check_word("owner", owner).map_err(malformed)?;
                }
            }
            Task::Package(package) => {
                check_word("package name", &package.name).map_err(malformed)?;
                if let Some(version) = &package.version {
                    check_word("package version", version).map_err(malformed)?;
                }
            }
            Task::Service(service) => {
                check_word("unit name", &service.name).map_err(malformed)?;
                if !UNIT_SUFFIXES.iter().any(|s| service.name.ends_with(s)) {
                    return Err(malformed(format!(
                        "unit name '{}' has no unit suffix",
                        service.name
                    )));
                }
            }
        }

        if self.dependencies().contains(&self.key()) {
            return Err(malformed("task depends on itself".into()));
        }

        Ok(())
    }
}

/// Collapses repeated separators, `.` segments and trailing slashes, so every
/// spelling of a path maps to one key.
fn normalized(path: &Utf8Path) -> Utf8PathBuf {
    path.components().collect()
}

fn check_word(what: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        Err(format!("{what} is empty"))
    } else if value.chars().any(char::is_whitespace) {
        Err(format!("{what} '{value}' contains whitespace"))
    } else {
        Ok(())
    }
}

impl From<FileTask> for Task {
    fn from(task: FileTask) -> Self {
        Task::File(task)
    }
}

impl From<PackageTask> for Task {
    fn from(task: PackageTask) -> Self {
        Task::Package(task)
    }
}

impl From<ServiceUnitTask> for Task {
    fn from(task: ServiceUnitTask) -> Self {
        Task::Service(task)
    }
}
