//! Lazy-bundle cycle detection
//!
//! Packing a bundle introduces a boundary: its internal modules load together.
//! A cycle between the bundle's external dependencies and its own internal
//! modules would deadlock lazy loading, so it must be detected and reported
//! with the full node sequence.
//!
//! The check runs on a collapsed view of the graph: all internal nodes are
//! folded into a single virtual bundle node, which catches cycles through the
//! bundle boundary without spurious self-cycles among siblings. The collapsed
//! view is a new map; the canonical graph is never mutated. The walk is an
//! explicit-stack depth-first traversal; a node re-encountered within the
//! active path records one cycle and terminates that branch.

use std::collections::{BTreeMap, BTreeSet};

use super::bundles::LazyBundle;
use super::DependencyGraphBuilder;

/// Cycles detected for one bundle. Each sequence is prefixed with the internal
/// module(s) whose edge to the external dependency closes the cycle, so the
/// diagnostic names the responsible module, not just "a cycle exists".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub bundle: String,
    pub cycles: Vec<Vec<String>>,
}

impl CycleReport {
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}

/// Detect cycles between a bundle's external dependencies and its internal
/// modules.
pub fn detect_bundle_cycles(graph: &DependencyGraphBuilder, bundle: &LazyBundle) -> CycleReport {
    let collapsed = collapse(graph, bundle);

    let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
    let mut cycles = Vec::new();

    for external in &bundle.external {
        for cycle in walk_from(&collapsed, external) {
            if !cycle.contains(&bundle.name) {
                continue;
            }
            let key = canonical_rotation(&cycle);
            if !seen.insert(key) {
                continue;
            }
            cycles.push(attribute(graph, bundle, &cycle));
        }
    }

    CycleReport {
        bundle: bundle.name.clone(),
        cycles,
    }
}

/// Build a forward-edge view with every internal node folded into the virtual
/// bundle node. Edges between siblings collapse to self-edges and are dropped.
fn collapse(
    graph: &DependencyGraphBuilder,
    bundle: &LazyBundle,
) -> BTreeMap<String, BTreeSet<String>> {
    let fold = |name: &str| -> String {
        if bundle.modules.contains(name) {
            bundle.name.clone()
        } else {
            name.to_string()
        }
    };

    let mut view: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in graph.node_names() {
        let src = fold(name);
        let entry = view.entry(src.clone()).or_default();
        if let Some(deps) = graph.deps_of(name) {
            for dep in deps {
                let dst = fold(dep);
                if dst != src {
                    entry.insert(dst);
                }
            }
        }
    }
    view
}

/// Depth-first walk from `start` collecting each first repetition per branch
/// as a completed cycle. Uses an explicit frame stack, never call-stack
/// recursion.
fn walk_from(view: &BTreeMap<String, BTreeSet<String>>, start: &str) -> Vec<Vec<String>> {
    struct Frame {
        node: String,
        neighbors: Vec<String>,
        next: usize,
    }

    let neighbors_of = |node: &str| -> Vec<String> {
        view.get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    };

    let mut cycles = Vec::new();
    let mut done: BTreeSet<String> = BTreeSet::new();
    let mut path: Vec<String> = vec![start.to_string()];
    let mut stack = vec![Frame {
        node: start.to_string(),
        neighbors: neighbors_of(start),
        next: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        if frame.next >= frame.neighbors.len() {
            done.insert(frame.node.clone());
            stack.pop();
            path.pop();
            continue;
        }
        let neighbor = frame.neighbors[frame.next].clone();
        frame.next += 1;

        if let Some(pos) = path.iter().position(|n| n == &neighbor) {
            // Completed cycle; the branch terminates here.
            cycles.push(path[pos..].to_vec());
            continue;
        }
        if done.contains(&neighbor) {
            continue;
        }
        path.push(neighbor.clone());
        stack.push(Frame {
            neighbors: neighbors_of(&neighbor),
            node: neighbor,
            next: 0,
        });
    }

    cycles
}

/// Stable key for deduplicating the same cycle found from different starts.
fn canonical_rotation(cycle: &[String]) -> Vec<String> {
    let len = cycle.len();
    (0..len)
        .map(|shift| {
            (0..len)
                .map(|i| cycle[(shift + i) % len].clone())
                .collect::<Vec<_>>()
        })
        .min()
        .unwrap_or_default()
}

/// Replace the virtual bundle node with the internal module(s) whose edge
/// closes the cycle, and rotate the sequence to start there.
fn attribute(
    graph: &DependencyGraphBuilder,
    bundle: &LazyBundle,
    cycle: &[String],
) -> Vec<String> {
    let len = cycle.len();
    let idx = cycle
        .iter()
        .position(|n| n == &bundle.name)
        .unwrap_or_default();
    let next = &cycle[(idx + 1) % len];

    let mut closers: Vec<String> = bundle
        .modules
        .iter()
        .filter(|m| graph.deps_of(m).is_some_and(|deps| deps.contains(next)))
        .cloned()
        .collect();
    if closers.is_empty() {
        closers.push(bundle.name.clone());
    }

    let mut sequence = closers.clone();
    for step in 1..len {
        let node = &cycle[(idx + step) % len];
        sequence.push(node.clone());
    }
    sequence.push(closers[0].clone());
    sequence
}
