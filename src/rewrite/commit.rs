//! Commit of a matched replacement
//!
//! [`commit_replacement`] is the single structural-effect path of the
//! engine: every check that can fail runs before the first rewiring, so an
//! error here leaves the graph untouched, and once rewiring starts the
//! commit runs to completion.

use crate::error::{RewriteError, RewriteResult};
use crate::graph::{AttrValue, Graph, NodeId, Value};
use crate::ops::OpKind;
use crate::pattern::Binding;

/// Replace the matched root with `replacement` and detach the orphaned
/// matched interior
///
/// The replacement node must already be in the graph (typically freshly
/// built from the binding's captured inputs) and must expose the same
/// number of output ports as the root; consumers are rewired positionally,
/// port `i` to port `i`. After rewiring, matched nodes whose outputs lost
/// their last consumer are detached, cascading upstream through the matched
/// set; nodes with surviving consumers outside the match, parameters, and
/// result feeders are preserved.
///
/// Provenance is recorded on the replacement: runtime info of the matched
/// nodes is unioned (root wins on key collisions) and a `"fused_names"`
/// list accumulates the names of every node folded away, root first. An
/// unnamed replacement inherits the root's name.
pub fn commit_replacement(
    graph: &mut Graph,
    binding: &Binding,
    replacement: NodeId,
) -> RewriteResult<()> {
    let root = binding.root_node();

    let root_outputs = graph
        .node(root)
        .ok_or_else(|| RewriteError::DanglingValue(root.to_string()))?
        .outputs()
        .len();
    let (repl_outputs, repl_named) = {
        let node = graph
            .node(replacement)
            .ok_or_else(|| RewriteError::DanglingValue(replacement.to_string()))?;
        (node.outputs().len(), !node.name().is_empty())
    };

    if repl_outputs != root_outputs {
        return Err(RewriteError::InvariantViolation {
            root: root_name(graph, root),
            detail: format!(
                "replacement has {repl_outputs} output ports, root has {root_outputs}"
            ),
        });
    }

    // Rewiring the root's consumers onto a replacement that itself depends
    // on the root would close a cycle.
    if replacement == root || graph.reaches_upstream(replacement, root) {
        return Err(RewriteError::InvariantViolation {
            root: root_name(graph, root),
            detail: "replacement depends on the match root".to_string(),
        });
    }

    record_provenance(graph, binding, replacement, repl_named);

    for port in 0..root_outputs {
        graph.replace_value_uses(Value::new(root, port), Value::new(replacement, port));
    }

    detach_orphans(graph, &binding.matched_nodes(), replacement);

    graph.validate()
}

fn root_name(graph: &Graph, root: NodeId) -> String {
    graph
        .node(root)
        .map(|n| n.name().to_string())
        .unwrap_or_else(|| root.to_string())
}

/// Union matched runtime info onto the replacement and accumulate the
/// `"fused_names"` provenance list
fn record_provenance(graph: &mut Graph, binding: &Binding, replacement: NodeId, named: bool) {
    let matched = binding.matched_nodes();

    let mut fused: Vec<String> = Vec::new();
    let mut push_name = |name: &str| {
        if !name.is_empty() && !fused.iter().any(|n| n == name) {
            fused.push(name.to_string());
        }
    };

    // Leaves-to-root insertion order so the root's entries win collisions.
    let mut rt_union: Vec<(String, AttrValue)> = Vec::new();
    for &id in &matched {
        if id == replacement {
            continue;
        }
        let node = match graph.node(id) {
            Some(n) => n,
            None => continue,
        };
        push_name(node.name());
        if let Some(AttrValue::Strs(prior)) = node.rt_info_get("fused_names") {
            for name in prior {
                push_name(name);
            }
        }
    }
    for &id in matched.iter().rev() {
        if id == replacement {
            continue;
        }
        if let Some(node) = graph.node(id) {
            for (key, value) in node.rt_info() {
                if key.as_str() != "fused_names" {
                    rt_union.push((key.to_string(), value.clone()));
                }
            }
        }
    }

    let inherited = root_name(graph, binding.root_node());
    if let Some(repl) = graph.node_mut(replacement) {
        if !named {
            repl.name = inherited;
        }
        for (key, value) in rt_union {
            repl.set_rt_info(key, value);
        }
        if let Some(AttrValue::Strs(prior)) = repl.rt_info_get("fused_names").cloned() {
            for name in prior {
                if !fused.iter().any(|n| n == &name) {
                    fused.push(name);
                }
            }
        }
        repl.set_rt_info("fused_names", AttrValue::Strs(fused));
    }
}

/// Detach matched nodes whose outputs lost their last consumer, cascading
/// upstream until a pass over the matched set removes nothing
fn detach_orphans(graph: &mut Graph, matched: &[NodeId], replacement: NodeId) {
    loop {
        let mut removed_any = false;
        for &id in matched {
            if id == replacement || !graph.is_live(id) || graph.feeds_result(id) {
                continue;
            }
            let node = match graph.node(id) {
                Some(n) => n,
                None => continue,
            };
            // Graph inputs survive even when fully disconnected.
            if *node.kind() == OpKind::Parameter {
                continue;
            }
            let dead = (0..node.outputs().len())
                .all(|port| graph.consumer_count(Value::new(id, port)) == 0);
            if dead && graph.remove_node(id).is_ok() {
                removed_any = true;
            }
        }
        if !removed_any {
            break;
        }
    }
}
