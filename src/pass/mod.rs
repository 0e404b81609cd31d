//! Pass trait, driver, and pipeline
//!
//! A pass pairs one declarative pattern with one rewrite callback. The
//! driver owns all iteration: it sweeps the graph in the pass's declared
//! traversal order, anchors the pattern at every live output port, and
//! invokes the callback only on full matches. Callbacks decide — commit a
//! replacement, or reject and leave the graph untouched — and the driver
//! keeps sweeping from a fresh snapshot when a fixpoint pass committed.
//!
//! A [`Pipeline`] runs passes strictly in registration order, each pass
//! completing over the whole graph before the next starts.

use tracing::{debug, warn};

use crate::error::{RewriteError, RewriteResult};
use crate::graph::{Graph, Value};
use crate::pattern::{Binding, Matcher, PatternTree};
use crate::rewrite::PassContext;

/// Fixpoint sweep cap; a pass still committing after this many sweeps is
/// oscillating rather than converging
const MAX_FIXPOINT_SWEEPS: usize = 100;

/// What a rewrite callback did with a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The callback committed a structural or metadata change
    Committed,
    /// A guard rejected the match; the graph is untouched
    Rejected,
}

/// Sweep order of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Producers before consumers
    Topological,
    /// Consumers before producers; natural for sinking/fusion toward outputs
    ReverseTopological,
}

/// A pattern-directed rewrite
///
/// Implementations hold configuration only; all per-run state lives in the
/// [`Binding`] and [`PassContext`] arguments, so one pass value can run over
/// any number of graphs.
pub trait Pass {
    /// Stable name used in stats, logs, and error context
    fn name(&self) -> &str;

    /// The pattern the driver anchors at every candidate output port
    fn pattern(&self) -> PatternTree;

    /// Sweep order
    fn traversal(&self) -> Traversal {
        Traversal::Topological
    }

    /// Whether the driver re-sweeps until no commit happens
    fn fixpoint(&self) -> bool {
        false
    }

    /// Inspect a full match, run guards, and either commit or reject
    ///
    /// Must leave the graph untouched when returning [`Outcome::Rejected`].
    /// Errors abort the pipeline.
    fn rewrite(
        &self,
        graph: &mut Graph,
        binding: &Binding,
        cx: &PassContext,
    ) -> RewriteResult<Outcome>;
}

/// Per-pass run statistics
#[derive(Debug, Clone, Default)]
pub struct PassStats {
    /// Pass name
    pub name: String,
    /// Number of sweeps over the graph (1 unless fixpoint)
    pub sweeps: usize,
    /// Full matches handed to the callback
    pub matches: usize,
    /// Matches the callback committed
    pub commits: usize,
}

/// Aggregated pipeline run statistics
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// One entry per executed pass, in registration order
    pub passes: Vec<PassStats>,
}

impl PipelineStats {
    /// Total commits across all passes
    pub fn total_commits(&self) -> usize {
        self.passes.iter().map(|p| p.commits).sum()
    }
}

/// Run one pass to completion over a graph
pub fn run_pass(
    graph: &mut Graph,
    pass: &dyn Pass,
    cx: &PassContext,
) -> RewriteResult<PassStats> {
    let mut stats = PassStats {
        name: pass.name().to_string(),
        ..PassStats::default()
    };

    loop {
        stats.sweeps += 1;
        let committed = sweep(graph, pass, cx, &mut stats)?;

        if cx.stop_requested() || !pass.fixpoint() || committed == 0 {
            break;
        }
        if stats.sweeps >= MAX_FIXPOINT_SWEEPS {
            warn!(pass = pass.name(), sweeps = stats.sweeps, "fixpoint sweep cap reached");
            break;
        }
    }

    debug!(
        pass = pass.name(),
        sweeps = stats.sweeps,
        matches = stats.matches,
        commits = stats.commits,
        "pass finished"
    );
    Ok(stats)
}

/// One sweep: every live output port in traversal order gets one match
/// attempt against a fresh graph snapshot
fn sweep(
    graph: &mut Graph,
    pass: &dyn Pass,
    cx: &PassContext,
    stats: &mut PassStats,
) -> RewriteResult<usize> {
    let tree = pass.pattern();

    let mut order = graph.topo_order();
    if pass.traversal() == Traversal::ReverseTopological {
        order.reverse();
    }

    let mut committed = 0;
    for id in order {
        // Earlier commits in this sweep may have detached the candidate.
        if !graph.is_live(id) || cx.should_skip(graph, id) {
            continue;
        }

        let ports = match graph.node(id) {
            Some(node) => node.outputs().len(),
            None => continue,
        };

        for port in 0..ports {
            let anchor = Value::new(id, port);
            let binding = match Matcher::new(graph, &tree).match_at(anchor) {
                Some(b) => b,
                None => continue,
            };
            stats.matches += 1;

            let root_label = graph
                .node(binding.root_node())
                .map(|n| n.name().to_string())
                .unwrap_or_else(|| binding.root_node().to_string());
            let outcome = pass.rewrite(graph, &binding, cx).map_err(|source| {
                RewriteError::Pass {
                    pass: pass.name().to_string(),
                    root: root_label,
                    source: Box::new(source),
                }
            })?;

            if outcome == Outcome::Committed {
                committed += 1;
                stats.commits += 1;
                debug!(pass = pass.name(), anchor = %id, "committed");
            }
            if cx.stop_requested() {
                return Ok(committed);
            }
            if outcome == Outcome::Committed {
                // The anchor may be gone; move to the next candidate node.
                break;
            }
        }
    }

    Ok(committed)
}

/// An ordered sequence of passes
///
/// Passes run strictly in registration order; there is no scheduling,
/// dependency resolution, or reordering.
#[derive(Default)]
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass
    pub fn add(mut self, pass: impl Pass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Number of registered passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Whether no pass is registered
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass over the graph with a fresh context
    pub fn run(&self, graph: &mut Graph) -> RewriteResult<PipelineStats> {
        self.run_with_context(graph, &PassContext::new())
    }

    /// Run every pass over the graph with an explicit context
    ///
    /// A stop request takes effect after the current callback returns: the
    /// remainder of the pipeline is skipped and commits made so far stay.
    pub fn run_with_context(
        &self,
        graph: &mut Graph,
        cx: &PassContext,
    ) -> RewriteResult<PipelineStats> {
        let mut stats = PipelineStats::default();
        for pass in &self.passes {
            if cx.stop_requested() {
                break;
            }
            stats.passes.push(run_pass(graph, pass.as_ref(), cx)?);
        }
        Ok(stats)
    }
}
