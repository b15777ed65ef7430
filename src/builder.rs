//! The builder contract and the runner that composes builders.
//!
//! A [`Builder`] owns one configuration concern. It reads the
//! [`NodeConfigContext`], writes tasks into the [`TaskGraph`] it is handed, and
//! does nothing else: no I/O, no state carried between calls. Two builders
//! touching disjoint keys commute, so the order of a [`BuilderRunner`] only
//! matters when builders deliberately share a task.

use std::any::type_name;
use std::borrow::Cow;

use crate::context::NodeConfigContext;
use crate::error::BuildError;
use crate::graph::TaskGraph;

pub trait Builder: Send + Sync {
    /// Name used in logs and in errors surfaced by the runner.
    fn name(&self) -> Cow<'static, str> {
        type_name::<Self>().into()
    }

    fn build(&self, context: &NodeConfigContext, graph: &mut TaskGraph) -> Result<(), BuildError>;
}

/// Runs an ordered list of builders against one context and one graph.
///
/// The first failing builder stops the run and its error is wrapped with the
/// builder's name. Tasks added before the failure stay in the graph; callers
/// are expected to throw the graph away.
#[derive(Default)]
pub struct BuilderRunner {
    builders: Vec<Box<dyn Builder>>,
}

impl BuilderRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, builder: impl Builder + 'static) -> Self {
        self.builders.push(Box::new(builder));
        self
    }

    pub fn push(&mut self, builder: Box<dyn Builder>) {
        self.builders.push(builder);
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Runs every builder into a fresh graph.
    pub fn run(&self, context: &NodeConfigContext) -> Result<TaskGraph, BuildError> {
        let mut graph = TaskGraph::new();
        self.build(context, &mut graph)?;
        Ok(graph)
    }
}

impl Builder for BuilderRunner {
    fn name(&self) -> Cow<'static, str> {
        let names: Vec<_> = self.builders.iter().map(|b| b.name()).collect();
        format!("runner[{}]", names.join(", ")).into()
    }

    fn build(&self, context: &NodeConfigContext, graph: &mut TaskGraph) -> Result<(), BuildError> {
        for builder in &self.builders {
            let name = builder.name();
            let _span = tracing::info_span!("builder", name = %name).entered();

            let before = graph.len();
            builder
                .build(context, graph)
                .map_err(|err| BuildError::Builder(name.to_string(), Box::new(err)))?;

            tracing::debug!("{} added {} tasks", name, graph.len() - before);
        }

        Ok(())
    }
}

impl std::fmt::Debug for BuilderRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.builders.iter().map(|b| b.name()))
            .finish()
    }
}

/// Wraps a named closure as a [`Builder`].
pub struct FnBuilder<F> {
    name: Cow<'static, str>,
    callback: F,
}

impl<F> Builder for FnBuilder<F>
where
    F: Fn(&NodeConfigContext, &mut TaskGraph) -> Result<(), BuildError> + Send + Sync,
{
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn build(&self, context: &NodeConfigContext, graph: &mut TaskGraph) -> Result<(), BuildError> {
        (self.callback)(context, graph)
    }
}

pub fn builder_fn<F>(name: impl Into<Cow<'static, str>>, callback: F) -> FnBuilder<F>
where
    F: Fn(&NodeConfigContext, &mut TaskGraph) -> Result<(), BuildError> + Send + Sync,
{
    FnBuilder {
        name: name.into(),
        callback,
    }
}
