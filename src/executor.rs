//! The seam between planning and doing.
//!
//! Converging a live machine is someone else's job. A finished
//! [`TaskGraph`](crate::TaskGraph) is handed to an [`Executor`] through
//! [`TaskGraph::hand_off`](crate::TaskGraph::hand_off), one task at a time, in
//! dependency order.

use crate::task::Task;

/// Applies a single task to whatever backend the implementor drives.
pub trait Executor {
    fn apply(&mut self, task: &Task) -> anyhow::Result<()>;
}

impl<F> Executor for F
where
    F: FnMut(&Task) -> anyhow::Result<()>,
{
    fn apply(&mut self, task: &Task) -> anyhow::Result<()> {
        self(task)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use crate::error::{ApplyError, DependencyError, SerializationError};
    use crate::task::{FileTask, PackageTask, ServiceUnitTask, Task, TaskKey};
    use crate::TaskGraph;

    fn graph() -> TaskGraph {
        let mut graph = TaskGraph::new();
        graph
            .add(
                ServiceUnitTask::new("containerd.service")
                    .depends_on(TaskKey::package("containerd"))
                    .depends_on(TaskKey::file("/etc/containerd/config.toml")),
            )
            .unwrap();
        graph
            .add(
                FileTask::new("/etc/containerd/config.toml", "version = 2\n")
                    .depends_on(TaskKey::package("containerd")),
            )
            .unwrap();
        graph.add(PackageTask::new("containerd")).unwrap();
        graph
    }

    #[test]
    fn test_hand_off_in_dependency_order() {
        let mut applied = Vec::new();

        graph()
            .hand_off(&mut |task: &Task| -> anyhow::Result<()> {
                applied.push(task.key().to_string());
                Ok(())
            })
            .unwrap();

        assert_eq!(
            applied,
            [
                "Package/containerd",
                "File//etc/containerd/config.toml",
                "Service/containerd.service",
            ]
        );
    }

    #[test]
    fn test_hand_off_stops_at_first_failure() {
        let mut applied = 0;

        let err = graph()
            .hand_off(&mut |task: &Task| -> anyhow::Result<()> {
                if let Task::File(_) = task {
                    bail!("disk full");
                }
                applied += 1;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, ApplyError::Task(ref key, _) if *key == TaskKey::file("/etc/containerd/config.toml")));
        assert_eq!(applied, 1);
    }

    #[test]
    fn test_hand_off_rejects_incomplete_graph() {
        let mut graph = TaskGraph::new();
        graph
            .add(ServiceUnitTask::new("kubelet.service").depends_on(TaskKey::package("kubelet")))
            .unwrap();

        let err = graph.hand_off(&mut |_: &Task| -> anyhow::Result<()> { Ok(()) }).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::Dependency(DependencyError::Missing { .. })
        ));
    }

    #[test]
    fn test_hand_off_rejects_malformed_task() {
        let mut graph = graph();
        graph.add(FileTask::new("etc/motd", "hello\n")).unwrap();

        let mut applied = 0;
        let err = graph
            .hand_off(&mut |_: &Task| -> anyhow::Result<()> {
                applied += 1;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(
            err,
            ApplyError::Invalid(SerializationError::Malformed { .. })
        ));
        assert_eq!(applied, 0);
    }
}
