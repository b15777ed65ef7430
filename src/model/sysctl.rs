use std::borrow::Cow;

use crate::builder::Builder;
use crate::context::NodeConfigContext;
use crate::error::{BuildError, ConfigError};
use crate::graph::TaskGraph;
use crate::task::{FileTask, ServiceUnitTask, TaskKey};

const SYSCTL_PATH: &str = "/etc/sysctl.d/99-k8s-general.conf";

/// Settings for every node, bastions included.
const GENERAL: &[&str] = &[
    "fs.inotify.max_user_instances = 8192",
    "fs.inotify.max_user_watches = 524288",
    "kernel.pid_max = 4194304",
    "net.core.somaxconn = 32768",
];

/// Settings for nodes that route pod traffic.
const CLUSTER_MEMBER: &[&str] = &[
    "net.ipv4.ip_forward = 1",
    "vm.overcommit_memory = 1",
];

/// Writes the kernel parameters for the node and reloads them.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysctlBuilder;

impl Builder for SysctlBuilder {
    fn name(&self) -> Cow<'static, str> {
        "sysctl".into()
    }

    fn build(&self, context: &NodeConfigContext, graph: &mut TaskGraph) -> Result<(), BuildError> {
        let mut lines = vec!["# Kubernetes Settings"];
        lines.extend(GENERAL);

        if context.role().is_cluster_member() {
            lines.extend(CLUSTER_MEMBER);
        }

        let custom = context.sysctl_parameters();
        if !custom.is_empty() {
            lines.push("");
            lines.push("# Custom sysctl parameters");

            for parameter in custom {
                if !is_valid_parameter(parameter) {
                    return Err(ConfigError::InvalidSysctl(parameter.clone()).into());
                }
                lines.push(parameter);
            }
        }

        let mut contents = lines.join("\n");
        contents.push('\n');

        tracing::info!("Writing kernel parameters to {}", SYSCTL_PATH);

        graph.add(FileTask::new(SYSCTL_PATH, contents).mode("0644"))?;
        graph.add(
            ServiceUnitTask::new("systemd-sysctl.service").depends_on(TaskKey::file(SYSCTL_PATH)),
        )?;

        Ok(())
    }
}

/// A single `key = value` line with a dotted key free of whitespace.
fn is_valid_parameter(parameter: &str) -> bool {
    if parameter.contains(['\n', '\r']) {
        return false;
    }

    match parameter.split_once('=') {
        Some((key, _)) => {
            let key = key.trim();
            !key.is_empty() && !key.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Distribution, Role};
    use crate::task::Task;

    fn contents(graph: &TaskGraph) -> &str {
        match graph.get(&TaskKey::file(SYSCTL_PATH)) {
            Some(Task::File(file)) => &file.contents,
            _ => panic!("missing {SYSCTL_PATH}"),
        }
    }

    #[test]
    fn test_bastion_skips_forwarding() {
        let context = NodeConfigContext::builder("a", Role::Bastion, Distribution::Debian12)
            .build()
            .unwrap();
        let mut graph = TaskGraph::new();
        SysctlBuilder.build(&context, &mut graph).unwrap();

        assert!(!contents(&graph).contains("ip_forward"));
        assert!(contents(&graph).contains("kernel.pid_max = 4194304\n"));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_custom_parameters_appended() {
        let context = NodeConfigContext::builder("a", Role::Node, Distribution::Debian12)
            .sysctl_parameter("vm.swappiness = 10")
            .build()
            .unwrap();
        let mut graph = TaskGraph::new();
        SysctlBuilder.build(&context, &mut graph).unwrap();

        assert!(contents(&graph).ends_with("\n\n# Custom sysctl parameters\nvm.swappiness = 10\n"));
    }

    #[test]
    fn test_invalid_parameter() {
        for parameter in [
            "vm.swappiness",
            " = 10",
            "vm.swappiness = 10\nkernel.panic",
            "vm.swappiness = 10\r\nkernel.panic = 1",
            "vm swappiness = 10",
        ] {
            let context = NodeConfigContext::builder("a", Role::Node, Distribution::Debian12)
                .sysctl_parameter(parameter)
                .build()
                .unwrap();
            let mut graph = TaskGraph::new();

            let err = SysctlBuilder.build(&context, &mut graph).unwrap_err();
            assert!(
                matches!(err, BuildError::Config(ConfigError::InvalidSysctl(ref p)) if p == parameter),
                "{parameter:?} should be rejected"
            );
            assert!(graph.is_empty());
        }
    }
}
