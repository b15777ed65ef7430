//! Builders for the individual node configuration concerns.

mod sysctl;
mod systemd;
mod update_service;

pub use sysctl::SysctlBuilder;
pub use systemd::UnitManifest;
pub use update_service::UpdateServiceBuilder;

use crate::builder::BuilderRunner;

/// The builders every node runs, in a fixed order.
pub fn node_builders() -> BuilderRunner {
    BuilderRunner::new()
        .add(SysctlBuilder)
        .add(UpdateServiceBuilder)
}
