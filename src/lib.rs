#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod builder;
mod context;
mod error;
mod executor;
pub mod golden;
mod graph;
pub mod model;
mod task;

pub use crate::builder::{Builder, BuilderRunner, FnBuilder, builder_fn};
pub use crate::context::{ContextBuilder, Distribution, Family, NodeConfigContext, Role};
pub use crate::error::*;
pub use crate::executor::Executor;
pub use crate::graph::{Digest, TaskGraph};
pub use crate::task::{FileTask, PackageTask, ServiceUnitTask, Task, TaskKey, TaskKind};

/// Installs a `tracing` subscriber that writes to stderr.
///
/// The filter is read from `RUST_LOG` and defaults to `info`.
#[cfg(feature = "logging")]
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}
