//! The accumulator every builder writes into.
//!
//! A [`TaskGraph`] holds at most one [`Task`] per [`TaskKey`]. Builders are
//! written independently of each other, so the same task may legitimately be
//! emitted twice; that is accepted as long as both copies are identical.
//! Anything else is an authoring bug and is reported as a [`ConflictError`].
//!
//! ## Canonical form
//!
//! The serialized form is what golden fixtures pin down, so it has to be
//! byte-stable:
//!
//! * tasks are rendered in key order (the backing map is a `BTreeMap`),
//! * every task is a pretty-printed JSON object with the `"type"` tag first
//!   and fields in declaration order,
//! * blocks are separated by a line containing exactly `---`.
//!
//! JSON strings never span lines, so the separator can't occur inside a block
//! and the format parses back with [`TaskGraph::parse`].

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Display, Formatter};

use petgraph::Graph;
use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;

use crate::error::{ApplyError, ConflictError, DependencyError, SerializationError};
use crate::executor::Executor;
use crate::task::{Task, TaskKey};

const SEPARATOR: &str = "---";

/// A 32-byte BLAKE3 fingerprint of a serialized graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Digest([u8; 32]);

impl<T> From<T> for Digest
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Digest(value.into())
    }
}

impl Digest {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Deduplicating, dependency-aware accumulator of tasks for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskKey, Task>,
}

impl TaskGraph {
    /// Creates a new, empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task to the graph.
    ///
    /// Inserting a task identical to the one already stored under the same key
    /// is a no-op. Inserting a different one fails and leaves the graph as it
    /// was.
    pub fn add(&mut self, task: impl Into<Task>) -> Result<(), ConflictError> {
        let task = task.into();
        let key = task.key();

        match self.tasks.get(&key) {
            Some(existing) if *existing == task => {
                tracing::debug!("task {} already present, skipping", key);
                Ok(())
            }
            Some(_) => Err(ConflictError { key }),
            None => {
                tracing::debug!("adding task {}", key);
                self.tasks.insert(key, task);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &TaskKey) -> Option<&Task> {
        self.tasks.get(key)
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterates over the tasks in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.tasks.keys()
    }

    /// Renders the graph in its canonical form.
    pub fn serialize(&self) -> Result<String, SerializationError> {
        let mut buffer = String::new();

        for (i, task) in self.tasks.values().enumerate() {
            task.validate()?;

            if i > 0 {
                buffer.push_str(SEPARATOR);
                buffer.push('\n');
            }

            buffer.push_str(&serde_json::to_string_pretty(task)?);
            buffer.push('\n');
        }

        Ok(buffer)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        self.serialize().map(String::into_bytes)
    }

    /// Parses the canonical form back into a graph.
    pub fn parse(input: &str) -> Result<Self, SerializationError> {
        let mut graph = TaskGraph::new();
        let mut block = String::new();
        let mut index = 0;

        let lines = input.lines().chain(std::iter::once(SEPARATOR));
        for line in lines {
            if line != SEPARATOR {
                block.push_str(line);
                block.push('\n');
                continue;
            }

            if !block.trim().is_empty() {
                let task: Task = serde_json::from_str(&block)
                    .map_err(|source| SerializationError::Block { block: index, source })?;
                let key = task.key();

                if graph.contains(&key) {
                    return Err(SerializationError::Duplicate { block: index, key });
                }
                graph.tasks.insert(key, task);
            }

            block.clear();
            index += 1;
        }

        Ok(graph)
    }

    /// BLAKE3 fingerprint of the canonical form.
    pub fn digest(&self) -> Result<Digest, SerializationError> {
        Ok(Digest::hash(self.serialize()?))
    }

    /// Returns the tasks ordered so that every task comes after the tasks it
    /// depends on. The order is stable for a given graph.
    pub fn execution_order(&self) -> Result<Vec<&Task>, DependencyError> {
        let mut graph: Graph<&Task, ()> = Graph::with_capacity(self.tasks.len(), 0);
        let mut indices: HashMap<&TaskKey, NodeIndex> = HashMap::new();

        for (key, task) in &self.tasks {
            indices.insert(key, graph.add_node(task));
        }

        for (key, task) in &self.tasks {
            for dependency in task.dependencies() {
                let source =
                    *indices
                        .get(dependency)
                        .ok_or_else(|| DependencyError::Missing {
                            task: key.clone(),
                            dependency: dependency.clone(),
                        })?;

                graph.add_edge(source, indices[key], ());
            }
        }

        let sorted = toposort(&graph, None)
            .map_err(|cycle| DependencyError::Cycle(graph[cycle.node_id()].key()))?;

        Ok(sorted.into_iter().map(|index| graph[index]).collect())
    }

    /// Consumes the graph, applying every task through `executor` in
    /// dependency order. Stops at the first failure.
    ///
    /// Every task is validated before the first one is applied, so a malformed
    /// graph never reaches the executor.
    pub fn hand_off<E>(self, executor: &mut E) -> Result<(), ApplyError>
    where
        E: Executor + ?Sized,
    {
        for task in self.tasks.values() {
            task.validate()?;
        }

        for task in self.execution_order()? {
            tracing::debug!("applying task {}", task.key());
            executor
                .apply(task)
                .map_err(|err| ApplyError::Task(task.key(), err))?;
        }

        Ok(())
    }
}

impl IntoIterator for TaskGraph {
    type Item = Task;
    type IntoIter = std::collections::btree_map::IntoValues<TaskKey, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{FileTask, PackageTask, ServiceUnitTask};

    fn sample() -> TaskGraph {
        let mut graph = TaskGraph::new();
        graph
            .add(
                ServiceUnitTask::new("kubelet.service")
                    .depends_on(TaskKey::file("/etc/kubernetes/kubelet.conf"))
                    .depends_on(TaskKey::package("conntrack")),
            )
            .unwrap();
        graph.add(PackageTask::new("conntrack")).unwrap();
        graph
            .add(FileTask::new("/etc/kubernetes/kubelet.conf", "a: b\n").mode("0600"))
            .unwrap();
        graph
    }

    #[test]
    fn test_add_identical_duplicate_is_noop() {
        let mut graph = sample();
        let before = graph.serialize().unwrap();

        graph.add(PackageTask::new("conntrack")).unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.serialize().unwrap(), before);
    }

    #[test]
    fn test_add_conflict_leaves_graph_unchanged() {
        let mut graph = sample();
        let before = graph.clone();

        let err = graph
            .add(PackageTask::new("conntrack").version("1.4.8"))
            .unwrap_err();

        assert_eq!(err.key, TaskKey::package("conntrack"));
        assert_eq!(graph, before);
        assert_eq!(
            graph.get(&TaskKey::package("conntrack")),
            Some(&Task::Package(PackageTask::new("conntrack")))
        );
    }

    #[test]
    fn test_add_detects_conflicts_across_path_spellings() {
        let mut graph = TaskGraph::new();
        graph.add(FileTask::new("/etc/hosts", "a")).unwrap();

        for path in ["/etc//hosts", "/etc/./hosts", "/etc/hosts/"] {
            let err = graph.add(FileTask::new(path, "b")).unwrap_err();
            assert_eq!(err.key, TaskKey::file("/etc/hosts"));
        }

        assert_eq!(graph.len(), 1);
        assert!(graph.serialize().unwrap().contains("\"path\": \"/etc/hosts\""));
    }

    #[test]
    fn test_serialize_sorted_by_key() {
        let graph = sample();
        let keys: Vec<_> = graph.keys().map(ToString::to_string).collect();

        assert_eq!(
            keys,
            [
                "File//etc/kubernetes/kubelet.conf",
                "Package/conntrack",
                "Service/kubelet.service",
            ]
        );

        let text = graph.serialize().unwrap();
        let file = text.find("\"type\": \"file\"").unwrap();
        let package = text.find("\"type\": \"package\"").unwrap();
        let service = text.find("\"type\": \"service\"").unwrap();
        assert!(file < package && package < service);
        assert_eq!(text.matches("\n---\n").count(), 2);
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_serialize_independent_of_insertion_order() {
        let mut reversed = TaskGraph::new();
        let tasks: Vec<Task> = sample().into_iter().collect();
        for task in tasks.into_iter().rev() {
            reversed.add(task).unwrap();
        }

        assert_eq!(reversed.serialize().unwrap(), sample().serialize().unwrap());
        assert_eq!(reversed.digest().unwrap(), sample().digest().unwrap());
    }

    #[test]
    fn test_serialize_empty() {
        assert_eq!(TaskGraph::new().serialize().unwrap(), "");
        assert!(TaskGraph::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_serialize_rejects_malformed_task() {
        let mut graph = TaskGraph::new();
        graph.add(FileTask::new("relative/path", "")).unwrap();

        assert!(matches!(
            graph.serialize(),
            Err(SerializationError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_round_trip() {
        let graph = sample();
        let text = graph.serialize().unwrap();

        assert_eq!(TaskGraph::parse(&text).unwrap(), graph);
    }

    #[test]
    fn test_parse_rejects_duplicate_block() {
        let block = "{\n  \"type\": \"package\",\n  \"name\": \"curl\"\n}\n";
        let text = format!("{block}---\n{block}");

        assert!(matches!(
            TaskGraph::parse(&text),
            Err(SerializationError::Duplicate { block: 1, .. })
        ));
        assert!(matches!(
            TaskGraph::parse("{ nope"),
            Err(SerializationError::Block { block: 0, .. })
        ));
    }

    #[test]
    fn test_digest_hex() {
        let hex = sample().digest().unwrap().to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(sample().digest().unwrap(), TaskGraph::new().digest().unwrap());
    }

    #[test]
    fn test_execution_order_respects_dependencies() {
        let graph = sample();
        let order: Vec<_> = graph
            .execution_order()
            .unwrap()
            .into_iter()
            .map(Task::key)
            .collect();

        let position = |key: &TaskKey| order.iter().position(|k| k == key).unwrap();
        let service = position(&TaskKey::service("kubelet.service"));

        assert!(position(&TaskKey::package("conntrack")) < service);
        assert!(position(&TaskKey::file("/etc/kubernetes/kubelet.conf")) < service);
    }

    #[test]
    fn test_execution_order_missing_dependency() {
        let mut graph = TaskGraph::new();
        graph
            .add(ServiceUnitTask::new("a.service").depends_on(TaskKey::package("ghost")))
            .unwrap();

        assert_eq!(
            graph.execution_order().unwrap_err(),
            DependencyError::Missing {
                task: TaskKey::service("a.service"),
                dependency: TaskKey::package("ghost"),
            }
        );
    }

    #[test]
    fn test_execution_order_cycle() {
        let mut graph = TaskGraph::new();
        graph
            .add(PackageTask::new("a").depends_on(TaskKey::package("b")))
            .unwrap();
        graph
            .add(PackageTask::new("b").depends_on(TaskKey::package("a")))
            .unwrap();

        assert!(matches!(
            graph.execution_order(),
            Err(DependencyError::Cycle(_))
        ));
    }
}
