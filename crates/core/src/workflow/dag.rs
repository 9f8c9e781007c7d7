use crate::error::DagError;
use crate::types::Task;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

/// A task annotated with its position in the dependency graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Same as the task name
    pub id: String,
    pub task: Arc<Task>,
    /// Names this node waits on, as declared (may include unresolved names)
    pub dependencies: BTreeSet<String>,
    /// Names of nodes that declared a dependency on this one
    pub dependents: BTreeSet<String>,
    /// Longest distance from a root; 0 for nodes without resolved dependencies
    pub level: usize,
}

/// A dependency on a name that is not part of the submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDependency {
    pub node: String,
    pub dependency: String,
}

impl std::fmt::Display for UnresolvedDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Task {} depends on unknown task {}",
            self.node, self.dependency
        )
    }
}

/// Validated, leveled DAG representation of a task list
#[derive(Debug, Clone, Default)]
pub struct WorkflowDag {
    nodes: Vec<Node>,
    positions: HashMap<String, usize>,
    unresolved: Vec<UnresolvedDependency>,
}

impl WorkflowDag {
    /// Build a DAG from a flat task list.
    ///
    /// Dependencies on names absent from `tasks` are kept on the node but
    /// never contribute to its level; they are reported via [`Self::unresolved`].
    pub fn build(tasks: &[Task]) -> Result<Self, DagError> {
        let mut graph: DiGraph<String, ()> = DiGraph::with_capacity(tasks.len(), 0);
        let mut positions = HashMap::with_capacity(tasks.len());
        let mut nodes = Vec::with_capacity(tasks.len());

        // Add all tasks as nodes; graph indices match positions in `nodes`
        for task in tasks {
            if positions.contains_key(&task.name) {
                return Err(DagError::DuplicateTask(task.name.clone()));
            }
            if task.depends_on.iter().any(|dep| dep == &task.name) {
                return Err(DagError::CircularDependency {
                    nodes: vec![task.name.clone()],
                });
            }

            let index = graph.add_node(task.name.clone());
            positions.insert(task.name.clone(), index.index());
            nodes.push(Node {
                id: task.name.clone(),
                task: Arc::new(task.clone()),
                dependencies: task.depends_on.iter().cloned().collect(),
                dependents: BTreeSet::new(),
                level: 0,
            });
        }

        // Invert dependencies into dependents; edge direction is dep -> node
        let mut unresolved = Vec::new();
        for position in 0..nodes.len() {
            let id = nodes[position].id.clone();
            let dependencies: Vec<String> = nodes[position].dependencies.iter().cloned().collect();

            for dep in dependencies {
                match positions.get(&dep) {
                    Some(&dep_position) => {
                        graph.add_edge(NodeIndex::new(dep_position), NodeIndex::new(position), ());
                        nodes[dep_position].dependents.insert(id.clone());
                    }
                    None => {
                        let missing = UnresolvedDependency {
                            node: id.clone(),
                            dependency: dep,
                        };
                        tracing::warn!("{}; treating it as satisfied", missing);
                        unresolved.push(missing);
                    }
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| DagError::CircularDependency {
            nodes: cycle_members(&graph, cycle.node_id()),
        })?;

        // Dependencies always precede their dependents in topological order
        for index in order {
            let level = graph
                .neighbors_directed(index, Direction::Incoming)
                .map(|dep| nodes[dep.index()].level + 1)
                .max()
                .unwrap_or(0);
            nodes[index.index()].level = level;
        }

        tracing::debug!(
            "Built DAG with {} nodes across {} levels",
            nodes.len(),
            nodes.iter().map(|n| n.level + 1).max().unwrap_or(0)
        );

        Ok(Self {
            nodes,
            positions,
            unresolved,
        })
    }

    /// Nodes in submission order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.positions.get(id).map(|&position| &self.nodes[position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct levels
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.level + 1).max().unwrap_or(0)
    }

    /// Nodes grouped by level, ascending. Submission order is kept within a level.
    pub fn levels(&self) -> Vec<Vec<&Node>> {
        let mut levels: Vec<Vec<&Node>> = vec![Vec::new(); self.depth()];
        for node in &self.nodes {
            levels[node.level].push(node);
        }
        levels
    }

    /// Nodes that can start immediately
    pub fn roots(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.level == 0).collect()
    }

    pub fn unresolved(&self) -> &[UnresolvedDependency] {
        &self.unresolved
    }

    /// Every node reachable from `id` through `dependents` edges
    pub fn transitive_dependents(&self, id: &str) -> BTreeSet<String> {
        let mut reached = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.get(current) else {
                continue;
            };
            for dependent in &node.dependents {
                if reached.insert(dependent.clone()) {
                    queue.push_back(dependent.as_str());
                }
            }
        }

        reached
    }
}

/// Reassemble a DAG from nodes produced by [`build_dag`].
///
/// Levels and edges are taken as given; unresolved names are recomputed.
impl From<Vec<Node>> for WorkflowDag {
    fn from(nodes: Vec<Node>) -> Self {
        let positions: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (node.id.clone(), position))
            .collect();

        let unresolved = nodes
            .iter()
            .flat_map(|node| {
                node.dependencies
                    .iter()
                    .filter(|dep| !positions.contains_key(dep.as_str()))
                    .map(|dep| UnresolvedDependency {
                        node: node.id.clone(),
                        dependency: dep.clone(),
                    })
            })
            .collect();

        Self {
            nodes,
            positions,
            unresolved,
        }
    }
}

/// Build a DAG and return its nodes in submission order
pub fn build_dag(tasks: &[Task]) -> Result<Vec<Node>, DagError> {
    WorkflowDag::build(tasks).map(WorkflowDag::into_nodes)
}

/// Names of all nodes in the strongly connected component containing `start`
fn cycle_members(graph: &DiGraph<String, ()>, start: NodeIndex) -> Vec<String> {
    let mut members: Vec<String> = tarjan_scc(graph)
        .into_iter()
        .find(|component| component.contains(&start))
        .unwrap_or_else(|| vec![start])
        .into_iter()
        .map(|index| graph[index].clone())
        .collect();
    members.sort();
    members
}
