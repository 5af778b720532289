//! Dependency graph builder
//!
//! Nodes are resource addresses. An edge from `a` to `b` means `a` depends on
//! `b`, either explicitly through `depends_on` or implicitly through a
//! `${b.attr}` reference. Edges order operations; they never imply ownership.

use crate::address::ResourceAddress;
use crate::config::Configuration;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;

/// Directed acyclic graph of resource dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// node -> the nodes it depends on
    dependencies: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>>,
    /// node -> the nodes that depend on it
    dependents: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>>,
}

impl DependencyGraph {
    /// Build the graph for a configuration, rejecting dangling edges and cycles
    pub fn build(config: &Configuration) -> Result<Self> {
        let mut graph = Self::default();
        for address in config.resources.keys() {
            graph.add_node(address.clone());
        }

        for resource in config.resources.values() {
            for dep in resource.dependencies()? {
                if !config.resources.contains_key(&dep) {
                    return Err(Error::UnknownReference {
                        location: resource.address.to_string(),
                        target: format!("resource {dep}"),
                    });
                }
                graph.add_edge(&resource.address, &dep);
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(Error::Cycle(cycle));
        }
        Ok(graph)
    }

    pub fn add_node(&mut self, address: ResourceAddress) {
        self.dependencies.entry(address.clone()).or_default();
        self.dependents.entry(address).or_default();
    }

    /// Record that `from` depends on `to`
    pub fn add_edge(&mut self, from: &ResourceAddress, to: &ResourceAddress) {
        self.add_node(from.clone());
        self.add_node(to.clone());
        if let Some(deps) = self.dependencies.get_mut(from) {
            deps.insert(to.clone());
        }
        if let Some(dependents) = self.dependents.get_mut(to) {
            dependents.insert(from.clone());
        }
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.dependencies.contains_key(address)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ResourceAddress> {
        self.dependencies.keys()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Direct dependencies of a node
    pub fn dependencies(&self, address: &ResourceAddress) -> impl Iterator<Item = &ResourceAddress> {
        self.dependencies.get(address).into_iter().flatten()
    }

    /// Direct dependents of a node
    pub fn dependents(&self, address: &ResourceAddress) -> impl Iterator<Item = &ResourceAddress> {
        self.dependents.get(address).into_iter().flatten()
    }

    /// Every node reachable by following dependency edges
    pub fn transitive_dependencies(&self, address: &ResourceAddress) -> BTreeSet<ResourceAddress> {
        reachable(address, &self.dependencies)
    }

    /// Every node that reaches this node by following dependency edges
    pub fn transitive_dependents(&self, address: &ResourceAddress) -> BTreeSet<ResourceAddress> {
        reachable(address, &self.dependents)
    }

    /// Dependencies-first order (Kahn's algorithm, ties broken by address)
    pub fn topological_order(&self) -> Result<Vec<ResourceAddress>> {
        let mut remaining: BTreeMap<&ResourceAddress, usize> = self
            .dependencies
            .iter()
            .map(|(node, deps)| (node, deps.len()))
            .collect();
        let mut ready: BTreeSet<&ResourceAddress> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(node) = ready.pop_first() {
            order.push(node.clone());
            for dependent in self.dependents(node) {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() != self.len() {
            return Err(Error::Cycle(self.find_cycle().unwrap_or_default()));
        }
        Ok(order)
    }

    /// Find one cycle, returned as a closed path (`a -> b -> a`)
    pub fn find_cycle(&self) -> Option<Vec<ResourceAddress>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            node: &'a ResourceAddress,
            graph: &'a DependencyGraph,
            marks: &mut BTreeMap<&'a ResourceAddress, Mark>,
            stack: &mut Vec<&'a ResourceAddress>,
        ) -> Option<Vec<ResourceAddress>> {
            match marks.get(node) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                    let mut cycle: Vec<ResourceAddress> =
                        stack[start..].iter().map(|n| (*n).clone()).collect();
                    cycle.push(node.clone());
                    return Some(cycle);
                }
                None => {}
            }

            marks.insert(node, Mark::Visiting);
            stack.push(node);
            for dep in graph.dependencies(node) {
                if let Some(cycle) = visit(dep, graph, marks, stack) {
                    return Some(cycle);
                }
            }
            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        let mut stack = Vec::new();
        self.nodes()
            .find_map(|node| visit(node, self, &mut marks, &mut stack))
    }

    /// Render as Graphviz DOT, edges pointing from dependent to dependency
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph {\n  rankdir = \"RL\";\n");
        for node in self.nodes() {
            let _ = writeln!(out, "  \"{node}\";");
        }
        for (node, deps) in &self.dependencies {
            for dep in deps {
                let _ = writeln!(out, "  \"{node}\" -> \"{dep}\";");
            }
        }
        out.push_str("}\n");
        out
    }
}

fn reachable(
    start: &ResourceAddress,
    edges: &BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>>,
) -> BTreeSet<ResourceAddress> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&ResourceAddress> = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        for next in edges.get(node).into_iter().flatten() {
            if seen.insert(next.clone()) {
                queue.push_back(next);
            }
        }
    }
    seen.remove(start);
    seen
}
