//! Golden fixture verification.
//!
//! A scenario is a directory holding a `context.json` with the node context
//! and one `tasks-<key>.golden` file per builder (or runner) under test. The
//! verifier runs the builder against that context, serializes the resulting
//! graph and compares the whole buffer with the stored fixture.
//!
//! Comparison is strict on purpose: reordered fields, an extra task or a
//! changed newline all fail, so every change to generated configuration shows
//! up as a fixture update in review.
//!
//! To rewrite the fixtures after an intended change, run the tests with
//! `NODEPLAN_UPDATE_GOLDEN=1` and review the resulting diff.

mod diff;

use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};

pub use diff::{Change, diff_lines, render as render_diff};

use crate::builder::Builder;
use crate::context::NodeConfigContext;
use crate::error::GoldenError;
use crate::graph::TaskGraph;

/// Environment variable that switches the verifier into record mode.
pub const UPDATE_ENV: &str = "NODEPLAN_UPDATE_GOLDEN";

const CONTEXT_FILE: &str = "context.json";
const MISSING_HINT: &str = "\nRun the tests with NODEPLAN_UPDATE_GOLDEN=1 to record it.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoldenMode {
    /// Compare generated output with the stored fixtures.
    Compare,
    /// Overwrite the stored fixtures with generated output.
    Record,
}

impl GoldenMode {
    pub fn from_env() -> Self {
        match std::env::var(UPDATE_ENV).as_deref() {
            Ok("1") | Ok("true") => GoldenMode::Record,
            _ => GoldenMode::Compare,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The generated output equals the fixture.
    Matched,
    /// The fixture was written or rewritten.
    Recorded,
}

#[derive(Debug, Clone)]
pub struct GoldenVerifier {
    root: Utf8PathBuf,
    mode: GoldenMode,
}

impl GoldenVerifier {
    /// Scenarios are resolved relative to `root`.
    pub fn new(root: impl Into<Utf8PathBuf>, mode: GoldenMode) -> Self {
        Self {
            root: root.into(),
            mode,
        }
    }

    /// Like [`GoldenVerifier::new`], with the mode taken from
    /// [`UPDATE_ENV`].
    pub fn from_env(root: impl Into<Utf8PathBuf>) -> Self {
        Self::new(root, GoldenMode::from_env())
    }

    pub fn mode(&self) -> GoldenMode {
        self.mode
    }

    pub fn fixture_path(&self, scenario: &str, key: &str) -> Utf8PathBuf {
        self.root.join(scenario).join(format!("tasks-{key}.golden"))
    }

    pub fn load_context(&self, scenario: &str) -> Result<NodeConfigContext, GoldenError> {
        Ok(NodeConfigContext::from_path(
            self.root.join(scenario).join(CONTEXT_FILE),
        )?)
    }

    /// Runs `builder` against the scenario context and checks (or records)
    /// the fixture named after `key`.
    pub fn verify<B>(&self, scenario: &str, key: &str, builder: &B) -> Result<Outcome, GoldenError>
    where
        B: Builder + ?Sized,
    {
        let context = self.load_context(scenario)?;

        let mut graph = TaskGraph::new();
        builder.build(&context, &mut graph)?;
        let actual = graph.serialize()?;

        let path = self.fixture_path(scenario, key);
        tracing::debug!("scenario {} produced {} tasks", scenario, graph.len());

        match self.mode {
            GoldenMode::Compare => {
                let expected = read_fixture(&path)?;

                if expected == actual {
                    Ok(Outcome::Matched)
                } else {
                    Err(GoldenError::Mismatch {
                        diff: diff::render(&expected, &actual),
                        path,
                    })
                }
            }
            GoldenMode::Record => {
                if matches!(read_fixture(&path), Ok(expected) if expected == actual) {
                    return Ok(Outcome::Matched);
                }

                write_fixture(&path, &actual)?;
                tracing::info!("recorded fixture {}", path);
                Ok(Outcome::Recorded)
            }
        }
    }

    /// Test helper around [`GoldenVerifier::verify`] that panics with a
    /// readable report on failure.
    pub fn assert<B>(&self, scenario: &str, key: &str, builder: &B)
    where
        B: Builder + ?Sized,
    {
        if let Err(err) = self.verify(scenario, key, builder) {
            panic!("golden scenario '{scenario}' ({key}) failed:\n{err}");
        }
    }
}

fn read_fixture(path: &Utf8Path) -> Result<String, GoldenError> {
    fs::read_to_string(path).map_err(|source| GoldenError::Fixture {
        path: path.to_path_buf(),
        hint: if source.kind() == ErrorKind::NotFound {
            MISSING_HINT
        } else {
            ""
        },
        source,
    })
}

fn write_fixture(path: &Utf8Path, contents: &str) -> Result<(), GoldenError> {
    let fixture_error = |source: std::io::Error| GoldenError::Fixture {
        path: path.to_path_buf(),
        source,
        hint: "",
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(fixture_error)?;
    }

    fs::write(path, contents).map_err(fixture_error)
}
