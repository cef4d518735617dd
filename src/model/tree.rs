//! Two-level task tree: root -> tools -> tests
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. The tree is filled
//! once by the model builder and shared read-only afterwards, usually behind
//! an `Arc`.

use std::ops::Deref;
use std::sync::Arc;

use crate::descriptor::Locale;

use super::task::Task;

/// Stable index of a node in its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    task: Option<usize>,
}

/// The task tree
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    tasks: Vec<Task>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A tree holding only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                task: None,
            }],
            tasks: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Insert a tool and all of its tests under the root
    pub fn insert_tool(&mut self, tool: Task, tests: Vec<Task>) -> NodeId {
        let root = self.root();
        let tool_node = self.push_node(root, tool);
        for test in tests {
            self.push_node(tool_node, test);
        }
        tool_node
    }

    fn push_node(&mut self, parent: NodeId, task: Task) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.tasks.push(task);
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            task: Some(self.tasks.len() - 1),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Resolve display strings of every task for a locale
    pub fn localize(&mut self, locale: &Locale) {
        for task in &mut self.tasks {
            task.localize(locale);
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    pub fn child_count(&self, node: NodeId) -> usize {
        self.nodes.get(node.0).map_or(0, |n| n.children.len())
    }

    pub fn child(&self, node: NodeId, position: usize) -> Option<NodeId> {
        self.nodes
            .get(node.0)
            .and_then(|n| n.children.get(position))
            .copied()
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.0)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    /// The task held by a node; `None` for the root
    pub fn task(&self, node: NodeId) -> Option<&Task> {
        self.nodes
            .get(node.0)
            .and_then(|n| n.task)
            .map(|index| &self.tasks[index])
    }

    /// Distance from the root: 0 for root, 1 for tools, 2 for tests
    pub fn depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Tool nodes in insertion order
    pub fn tools(&self) -> &[NodeId] {
        self.children(self.root())
    }

    pub fn find_tool(&self, id: &str) -> Option<NodeId> {
        self.tools()
            .iter()
            .copied()
            .find(|&node| self.task(node).is_some_and(|task| task.id == id))
    }

    /// Number of nodes including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools().is_empty()
    }

    /// A shareable handle to the task of a node
    pub fn task_ref(self: &Arc<Self>, node: NodeId) -> Option<TaskRef> {
        let index = self.nodes.get(node.0)?.task?;
        Some(TaskRef {
            tree: Arc::clone(self),
            node,
            index,
        })
    }
}

/// A task handle that keeps its tree alive
///
/// Cheap to clone; dereferences to the [`Task`].
#[derive(Debug, Clone)]
pub struct TaskRef {
    tree: Arc<Tree>,
    node: NodeId,
    index: usize,
}

impl TaskRef {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }
}

impl Deref for TaskRef {
    type Target = Task;

    fn deref(&self) -> &Task {
        &self.tree.tasks[self.index]
    }
}

impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.node == other.node
    }
}

impl Eq for TaskRef {}
