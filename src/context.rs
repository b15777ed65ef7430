//! The resolved, read-only view of a node that every builder consumes.

use std::fmt::{Display, Formatter};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The role of the node within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ControlPlane,
    ApiServer,
    Node,
    Bastion,
}

impl Role {
    /// Whether the node runs cluster workloads or control plane components.
    pub fn is_cluster_member(self) -> bool {
        !matches!(self, Role::Bastion)
    }
}

/// Distribution families that share an update toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Debian,
    Rhel,
    Flatcar,
}

/// The operating system image the node boots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    #[serde(rename = "debian11")]
    Debian11,
    #[serde(rename = "debian12")]
    Debian12,
    #[serde(rename = "ubuntu2004")]
    Ubuntu2004,
    #[serde(rename = "ubuntu2204")]
    Ubuntu2204,
    #[serde(rename = "ubuntu2404")]
    Ubuntu2404,
    #[serde(rename = "rhel8")]
    Rhel8,
    #[serde(rename = "rhel9")]
    Rhel9,
    #[serde(rename = "rocky9")]
    Rocky9,
    #[serde(rename = "amazonlinux2023")]
    AmazonLinux2023,
    #[serde(rename = "flatcar")]
    Flatcar,
}

impl Distribution {
    pub fn family(self) -> Family {
        use Distribution::*;

        match self {
            Debian11 | Debian12 | Ubuntu2004 | Ubuntu2204 | Ubuntu2404 => Family::Debian,
            Rhel8 | Rhel9 | Rocky9 | AmazonLinux2023 => Family::Rhel,
            Flatcar => Family::Flatcar,
        }
    }

    pub fn version(self) -> &'static str {
        use Distribution::*;

        match self {
            Debian11 => "11",
            Debian12 => "12",
            Ubuntu2004 => "20.04",
            Ubuntu2204 => "22.04",
            Ubuntu2404 => "24.04",
            Rhel8 => "8",
            Rhel9 | Rocky9 => "9",
            AmazonLinux2023 => "2023",
            Flatcar => "stable",
        }
    }
}

impl Display for Distribution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use Distribution::*;

        let name = match self {
            Debian11 | Debian12 => "Debian",
            Ubuntu2004 | Ubuntu2204 | Ubuntu2404 => "Ubuntu",
            Rhel8 | Rhel9 => "RHEL",
            Rocky9 => "Rocky Linux",
            AmazonLinux2023 => "Amazon Linux",
            Flatcar => "Flatcar",
        };

        write!(f, "{} {}", name, self.version())
    }
}

/// Everything a builder is allowed to know about the node.
///
/// The context is resolved upstream and never changes afterwards, so the
/// fields are only reachable through getters. Build one in code with
/// [`NodeConfigContext::builder`], or load one with
/// [`NodeConfigContext::from_json`] / [`NodeConfigContext::from_path`]; both
/// paths run the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfigContext {
    cluster_name: String,
    role: Role,
    distribution: Distribution,
    #[serde(default)]
    use_external_update_service: bool,
    #[serde(default)]
    automatic_upgrades_enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    hooks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sysctl_parameters: Vec<String>,
}

impl NodeConfigContext {
    pub fn builder(
        cluster_name: impl Into<String>,
        role: Role,
        distribution: Distribution,
    ) -> ContextBuilder {
        ContextBuilder {
            context: NodeConfigContext {
                cluster_name: cluster_name.into(),
                role,
                distribution,
                use_external_update_service: false,
                automatic_upgrades_enabled: false,
                hooks: Vec::new(),
                sysctl_parameters: Vec::new(),
            },
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let context: NodeConfigContext = serde_json::from_str(json)?;
        context.validate()?;
        Ok(context)
    }

    pub fn from_path(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_name.trim().is_empty() {
            return Err(ConfigError::MissingField("cluster_name"));
        }

        Ok(())
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn distribution(&self) -> Distribution {
        self.distribution
    }

    pub fn use_external_update_service(&self) -> bool {
        self.use_external_update_service
    }

    pub fn automatic_upgrades_enabled(&self) -> bool {
        self.automatic_upgrades_enabled
    }

    /// Names of the unit hooks supplied by the user.
    pub fn hooks(&self) -> &[String] {
        &self.hooks
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.hooks.iter().any(|hook| hook == name)
    }

    /// Extra kernel parameters, one `key = value` per entry.
    pub fn sysctl_parameters(&self) -> &[String] {
        &self.sysctl_parameters
    }
}

/// Accumulates optional settings before producing a validated context.
pub struct ContextBuilder {
    context: NodeConfigContext,
}

impl ContextBuilder {
    pub fn use_external_update_service(mut self, value: bool) -> Self {
        self.context.use_external_update_service = value;
        self
    }

    pub fn automatic_upgrades_enabled(mut self, value: bool) -> Self {
        self.context.automatic_upgrades_enabled = value;
        self
    }

    pub fn hook(mut self, name: impl Into<String>) -> Self {
        self.context.hooks.push(name.into());
        self
    }

    pub fn sysctl_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.context.sysctl_parameters.push(parameter.into());
        self
    }

    pub fn build(self) -> Result<NodeConfigContext, ConfigError> {
        self.context.validate()?;
        Ok(self.context)
    }
}
