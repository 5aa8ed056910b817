//! Dependency graph
//!
//! Stores one node per registered service, rejects cycles at insertion time,
//! and computes a start order in which every dependency precedes its
//! dependents. Services with no ordering constraint between them share a
//! level and are ordered by priority inside it.

use crate::error::{Result, ServiceError};
use crate::state::ServicePriority;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

/// A service as seen by the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNode {
    pub name: String,
    pub priority: ServicePriority,
    pub dependencies: Vec<String>,
}

impl ServiceNode {
    pub fn new(
        name: impl Into<String>,
        priority: ServicePriority,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Thread-safe dependency graph.
///
/// One reader/writer lock guards the node table: inserts are exclusive,
/// every query is shared.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: RwLock<BTreeMap<String, ServiceNode>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node.
    ///
    /// Fails with `ServiceAlreadyExists` for a known name and with
    /// `CyclicDependency` if any declared dependency reaches back to the new
    /// node. The graph is untouched on failure.
    pub fn add_node(&self, node: ServiceNode) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);

        if nodes.contains_key(&node.name) {
            return Err(ServiceError::already_exists(&node.name));
        }

        check_reachability(&nodes, &node)?;

        tracing::debug!(
            service = %node.name,
            priority = %node.priority,
            dependencies = ?node.dependencies,
            "Added node to dependency graph"
        );
        nodes.insert(node.name.clone(), node);
        Ok(())
    }

    /// Compute the start order.
    ///
    /// Runs an independent cycle check (three-colour DFS) and fails with
    /// `MissingDependency` when a dependency has no node.
    pub fn start_order(&self) -> Result<Vec<String>> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);

        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(nodes.len());
        let mut post_order: Vec<&ServiceNode> = Vec::with_capacity(nodes.len());

        for name in nodes.keys() {
            visit(&nodes, name, &mut marks, &mut post_order)?;
        }

        let position: HashMap<&str, usize> = post_order
            .iter()
            .enumerate()
            .map(|(index, node)| (node.name.as_str(), index))
            .collect();

        // level = one past the furthest dependency in the post-order
        let mut levels: BTreeMap<usize, Vec<&ServiceNode>> = BTreeMap::new();
        for &node in &post_order {
            let level = node
                .dependencies
                .iter()
                .filter_map(|dep| position.get(dep.as_str()))
                .map(|index| index + 1)
                .max()
                .unwrap_or(0);
            levels.entry(level).or_default().push(node);
        }

        let mut order = Vec::with_capacity(post_order.len());
        for (_, mut level) in levels {
            level.sort_by_key(|node| node.priority);
            order.extend(level.into_iter().map(|node| node.name.clone()));
        }
        Ok(order)
    }

    /// Reverse of [`start_order`](Self::start_order)
    pub fn stop_order(&self) -> Result<Vec<String>> {
        let mut order = self.start_order()?;
        order.reverse();
        Ok(order)
    }

    /// Declared dependencies of `name`, if the node exists
    pub fn dependencies(&self, name: &str) -> Option<Vec<String>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|node| node.dependencies.clone())
    }

    /// Copy of the node named `name`
    pub fn node(&self, name: &str) -> Option<ServiceNode> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Walk everything reachable from `node`'s dependencies; reaching `node`
/// itself means the insert would close a cycle.
fn check_reachability(nodes: &BTreeMap<String, ServiceNode>, node: &ServiceNode) -> Result<()> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = node.dependencies.iter().map(String::as_str).collect();

    while let Some(current) = stack.pop() {
        if current == node.name {
            return Err(ServiceError::CyclicDependency {
                service: node.name.clone(),
            });
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(existing) = nodes.get(current) {
            stack.extend(existing.dependencies.iter().map(String::as_str));
        }
    }
    Ok(())
}

fn visit<'a>(
    nodes: &'a BTreeMap<String, ServiceNode>,
    name: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    post_order: &mut Vec<&'a ServiceNode>,
) -> Result<()> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InProgress) => {
            return Err(ServiceError::CyclicDependency {
                service: name.to_string(),
            });
        }
        None => {}
    }

    let Some(node) = nodes.get(name) else {
        return Ok(());
    };

    marks.insert(name, Mark::InProgress);
    for dep in &node.dependencies {
        if !nodes.contains_key(dep) {
            return Err(ServiceError::MissingDependency {
                service: node.name.clone(),
                dependency: dep.clone(),
            });
        }
        visit(nodes, dep, marks, post_order)?;
    }
    marks.insert(name, Mark::Done);
    post_order.push(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn node(name: &str, priority: i32, deps: &[&str]) -> ServiceNode {
        ServiceNode::new(name, ServicePriority(priority), deps.iter().copied())
    }

    fn assert_respects_edges(graph: &DependencyGraph, order: &[String]) {
        let index: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        for name in order {
            for dep in graph.dependencies(name).unwrap() {
                assert!(
                    index[dep.as_str()] < index[name.as_str()],
                    "{dep} must precede {name} in {order:?}"
                );
            }
        }
    }

    #[test]
    fn test_linear_chain() {
        let graph = DependencyGraph::new();
        graph.add_node(node("s1", 50, &[])).unwrap();
        graph.add_node(node("s2", 50, &["s1"])).unwrap();
        graph.add_node(node("s3", 50, &["s2"])).unwrap();

        assert_eq!(graph.start_order().unwrap(), vec!["s1", "s2", "s3"]);
        assert_eq!(graph.stop_order().unwrap(), vec!["s3", "s2", "s1"]);
    }

    #[test]
    fn test_priority_breaks_ties_within_level() {
        let graph = DependencyGraph::new();
        graph.add_node(node("s_lowest", 100, &[])).unwrap();
        graph.add_node(node("s_highest", 0, &[])).unwrap();
        graph.add_node(node("s_normal", 50, &[])).unwrap();

        assert_eq!(
            graph.start_order().unwrap(),
            vec!["s_highest", "s_normal", "s_lowest"]
        );
    }

    #[test]
    fn test_priority_never_overrides_dependency() {
        let graph = DependencyGraph::new();
        graph.add_node(node("base", 100, &[])).unwrap();
        graph.add_node(node("eager", 0, &["base"])).unwrap();

        assert_eq!(graph.start_order().unwrap(), vec!["base", "eager"]);
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let graph = DependencyGraph::new();
        graph.add_node(node("a", 50, &["b"])).unwrap();

        let err = graph.add_node(node("b", 50, &["a"])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DependencyFailed);
        assert!(matches!(err, ServiceError::CyclicDependency { .. }));
        assert_eq!(graph.len(), 1);
        assert!(graph.contains("a"));
        assert!(!graph.contains("b"));
    }

    #[test]
    fn test_transitive_cycle_rejected() {
        let graph = DependencyGraph::new();
        graph.add_node(node("a", 50, &["c"])).unwrap();
        graph.add_node(node("b", 50, &["a"])).unwrap();

        let err = graph.add_node(node("c", 50, &["b"])).unwrap_err();
        assert!(matches!(err, ServiceError::CyclicDependency { .. }));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let graph = DependencyGraph::new();
        let err = graph.add_node(node("loop", 50, &["loop"])).unwrap_err();
        assert!(matches!(err, ServiceError::CyclicDependency { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_duplicate_rejected() {
        let graph = DependencyGraph::new();
        graph.add_node(node("a", 50, &[])).unwrap();
        let err = graph.add_node(node("a", 10, &[])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServiceAlreadyExists);
        assert_eq!(graph.node("a").unwrap().priority, ServicePriority(50));
    }

    #[test]
    fn test_missing_dependency_reported_at_order_time() {
        let graph = DependencyGraph::new();
        graph.add_node(node("api", 50, &["db"])).unwrap();

        let err = graph.start_order().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::MissingDependency { ref service, ref dependency }
                if service == "api" && dependency == "db"
        ));
    }

    #[test]
    fn test_diamond_respects_every_edge() {
        let graph = DependencyGraph::new();
        graph.add_node(node("config", 10, &[])).unwrap();
        graph.add_node(node("db", 20, &["config"])).unwrap();
        graph.add_node(node("cache", 0, &["config"])).unwrap();
        graph.add_node(node("api", 0, &["db", "cache"])).unwrap();
        graph.add_node(node("metrics", 100, &[])).unwrap();
        graph.add_node(node("web", 0, &["api", "metrics"])).unwrap();

        let order = graph.start_order().unwrap();
        assert_eq!(order.len(), 6);
        assert_eq!(order.first().map(String::as_str), Some("config"));
        assert_eq!(order.last().map(String::as_str), Some("web"));
        assert_respects_edges(&graph, &order);
    }

    #[test]
    fn test_wide_graph_respects_every_edge() {
        let graph = DependencyGraph::new();
        for i in 0..30 {
            let deps: Vec<String> = (0..i)
                .filter(|j| (i * 7 + j) % 5 == 0)
                .map(|j| format!("svc{j:02}"))
                .collect();
            graph
                .add_node(ServiceNode::new(
                    format!("svc{i:02}"),
                    ServicePriority(i * 37 % 100),
                    deps,
                ))
                .unwrap();
        }

        let order = graph.start_order().unwrap();
        assert_eq!(order.len(), 30);
        assert_respects_edges(&graph, &order);
        assert_eq!(order, graph.start_order().unwrap());
    }

    #[test]
    fn test_lookups_report_absence() {
        let graph = DependencyGraph::new();
        assert!(graph.dependencies("nope").is_none());
        assert!(graph.node("nope").is_none());
        assert!(graph.start_order().unwrap().is_empty());
    }
}
