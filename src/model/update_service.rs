//! Node update policy.
//!
//! A node either delegates update orchestration to an external service, runs
//! its own automatic-upgrade agent, or does neither. The first two are
//! mutually exclusive; asking for both is a configuration error rather than a
//! silent pick.

use std::borrow::Cow;

use crate::builder::Builder;
use crate::context::{Family, NodeConfigContext};
use crate::error::{BuildError, ConfigError};
use crate::graph::TaskGraph;
use crate::model::UnitManifest;
use crate::task::{FileTask, PackageTask, ServiceUnitTask, TaskKey};

/// Unit that hands update orchestration over to the external service.
pub(crate) const EXTERNAL_UNIT: &str = "update-service.service";

/// The in-node automatic-upgrade agent of a distribution family.
struct UpdateAgent {
    package: Option<&'static str>,
    config_path: &'static str,
    config: &'static str,
    unit: &'static str,
    /// Units masked when an external service takes over.
    masked: &'static [&'static str],
}

const DEBIAN_AGENT: UpdateAgent = UpdateAgent {
    package: Some("unattended-upgrades"),
    config_path: "/etc/apt/apt.conf.d/20auto-upgrades",
    config: concat!(
        "APT::Periodic::Update-Package-Lists \"1\";\n",
        "APT::Periodic::Unattended-Upgrade \"1\";\n",
        "APT::Periodic::AutocleanInterval \"7\";\n",
    ),
    unit: "unattended-upgrades.service",
    masked: &["apt-daily-upgrade.timer", "unattended-upgrades.service"],
};

const RHEL_AGENT: UpdateAgent = UpdateAgent {
    package: Some("dnf-automatic"),
    config_path: "/etc/dnf/automatic.conf",
    config: concat!(
        "[commands]\n",
        "upgrade_type = default\n",
        "download_updates = yes\n",
        "apply_updates = yes\n",
    ),
    unit: "dnf-automatic.timer",
    masked: &["dnf-automatic.timer"],
};

const FLATCAR_AGENT: UpdateAgent = UpdateAgent {
    package: None,
    config_path: "/etc/flatcar/update.conf",
    config: "REBOOT_STRATEGY=reboot\n",
    unit: "update-engine.service",
    masked: &["locksmithd.service"],
};

fn agent(family: Family) -> &'static UpdateAgent {
    match family {
        Family::Debian => &DEBIAN_AGENT,
        Family::Rhel => &RHEL_AGENT,
        Family::Flatcar => &FLATCAR_AGENT,
    }
}

/// Configures how the node receives operating system updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpdateServiceBuilder;

impl UpdateServiceBuilder {
    fn build_external(&self, context: &NodeConfigContext, graph: &mut TaskGraph) -> Result<(), BuildError> {
        let hook = EXTERNAL_UNIT.trim_end_matches(".service");
        if context.has_hook(hook) || context.has_hook(EXTERNAL_UNIT) {
            tracing::info!("Detected hook for '{}'; skipping creation", hook);
            return Ok(());
        }

        let agent = agent(context.distribution().family());
        let masked = agent.masked.join(" ");

        tracing::info!(
            "Detected OS {}; building {} to disable the update scheduler",
            context.distribution(),
            EXTERNAL_UNIT
        );

        let mut manifest = UnitManifest::new();
        manifest
            .set("Unit", "Description", "Disable OS Update Scheduler")
            .set("Unit", "Before", &masked)
            .set("Service", "Type", "oneshot")
            .set("Service", "ExecStart", format!("/usr/bin/systemctl mask --now {masked}"));

        graph.add(ServiceUnitTask::new(EXTERNAL_UNIT).definition(manifest.render()))?;

        Ok(())
    }

    fn build_automatic(&self, context: &NodeConfigContext, graph: &mut TaskGraph) -> Result<(), BuildError> {
        let agent = agent(context.distribution().family());

        tracing::info!(
            "Detected OS {}; enabling automatic upgrades through {}",
            context.distribution(),
            agent.unit
        );

        let config_key = TaskKey::file(agent.config_path);
        let mut service = ServiceUnitTask::new(agent.unit).depends_on(config_key);

        if let Some(package) = agent.package {
            graph.add(PackageTask::new(package))?;
            service = service.depends_on(TaskKey::package(package));
        }

        graph.add(FileTask::new(agent.config_path, agent.config).mode("0644"))?;
        graph.add(service)?;

        Ok(())
    }
}

impl Builder for UpdateServiceBuilder {
    fn name(&self) -> Cow<'static, str> {
        "updateservice".into()
    }

    fn build(&self, context: &NodeConfigContext, graph: &mut TaskGraph) -> Result<(), BuildError> {
        match (
            context.use_external_update_service(),
            context.automatic_upgrades_enabled(),
        ) {
            (true, true) => Err(ConfigError::AmbiguousUpdatePolicy.into()),
            (true, false) => self.build_external(context, graph),
            (false, true) => self.build_automatic(context, graph),
            (false, false) => {
                tracing::info!("No update policy requested; skipping");
                Ok(())
            }
        }
    }
}
