use crate::types::IndexSet;

/// One vertex of a dependency graph: a payload plus its static scheduling
/// metadata.
#[must_use]
pub(crate) struct GraphNode<T> {
    pub(crate) payload: T,
    /// Number of sibling nodes that must complete before this one is
    /// released.
    pub(crate) dependencies: usize,
    /// Sibling nodes waiting on this one, in registration order.
    pub(crate) dependants: Vec<u32>,
}

/// A DAG of nodes addressed by dense indices in registration order.
///
/// Acyclicity holds by construction: an edge can only reference a node that
/// was registered earlier, i.e. one with a strictly smaller index.
#[must_use]
pub(crate) struct Graph<T> {
    pub(crate) nodes: Vec<GraphNode<T>>,
    /// Indices of nodes with zero dependencies; filled by [`Graph::finalize`].
    pub(crate) independents: Vec<u32>,
}

impl<T> Default for Graph<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            independents: Vec::new(),
        }
    }
}

impl<T> Graph<T> {
    /// Register a node depending on `deps`. Duplicate entries are collapsed,
    /// so the dependency count matches the number of distinct dependencies.
    pub(crate) fn add_node(&mut self, payload: T, deps: impl IntoIterator<Item = u32>) -> u32 {
        let id = u32::try_from(self.nodes.len()).expect("Graph::add_node: [1]");
        let deps: IndexSet<u32> = deps.into_iter().collect();
        for &dep in &deps {
            self.nodes[dep as usize].dependants.push(id);
        }
        self.nodes.push(GraphNode {
            payload,
            dependencies: deps.len(),
            dependants: Vec::new(),
        });
        id
    }

    /// Record the indices of nodes with no dependencies.
    pub(crate) fn finalize(&mut self) {
        self.independents = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.dependencies == 0)
            .map(|(id, _)| id as u32)
            .collect();
    }
}
