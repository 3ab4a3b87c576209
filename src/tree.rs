use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use http::StatusCode;

use crate::{DavError, DavResult};

#[derive(Debug)]
/// A tree contains a bunch of nodes, addressed by id.
pub(crate) struct Tree<D> {
    nodes: HashMap<u64, Node<D>>,
    node_id: u64,
}

/// id of the root node of the tree.
pub(crate) const ROOT_ID: u64 = 1;

#[derive(Debug)]
/// Node itself. "data" contains user-modifiable data.
pub(crate) struct Node<D> {
    pub data: D,
    name: String,
    parent_id: u64,
    // ordered by name, so listings are stable.
    children: BTreeMap<String, u64>,
}

impl<D: Debug> Tree<D> {
    /// Get new tree and initialize the root with 'data'.
    pub fn new(data: D) -> Tree<D> {
        let mut t = Tree {
            nodes: HashMap::new(),
            node_id: ROOT_ID,
        };
        t.new_node(0, String::new(), data);
        t
    }

    fn new_node(&mut self, parent: u64, name: String, data: D) -> u64 {
        let id = self.node_id;
        self.node_id += 1;
        let node = Node {
            data,
            name,
            parent_id: parent,
            children: BTreeMap::new(),
        };
        self.nodes.insert(id, node);
        id
    }

    fn node(&self, id: u64) -> DavResult<&Node<D>> {
        self.nodes.get(&id).ok_or(DavError::NotFound)
    }

    /// add a child node to an existing node.
    pub fn add_child(&mut self, parent: u64, name: &str, data: D) -> DavResult<u64> {
        if self.node(parent)?.children.contains_key(name) {
            return Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED));
        }
        let id = self.new_node(parent, name.to_string(), data);
        if let Some(pnode) = self.nodes.get_mut(&parent) {
            pnode.children.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Get a child node by name.
    pub fn get_child(&self, parent: u64, name: &str) -> Option<u64> {
        self.nodes.get(&parent)?.children.get(name).copied()
    }

    /// Ids of all children of this node, ordered by name.
    pub fn get_children(&self, parent: u64) -> DavResult<Vec<u64>> {
        Ok(self.node(parent)?.children.values().copied().collect())
    }

    /// Find a node by its path segments.
    pub fn lookup(&self, segments: &[String]) -> Option<u64> {
        let mut id = ROOT_ID;
        for s in segments {
            id = self.get_child(id, s)?;
        }
        Some(id)
    }

    pub fn name(&self, id: u64) -> DavResult<&str> {
        Ok(&self.node(id)?.name)
    }

    pub fn parent(&self, id: u64) -> DavResult<u64> {
        Ok(self.node(id)?.parent_id)
    }

    pub fn has_children(&self, id: u64) -> bool {
        self.nodes.get(&id).map(|n| !n.children.is_empty()).unwrap_or(false)
    }

    /// Get reference to a node.
    pub fn get_node(&self, id: u64) -> DavResult<&D> {
        Ok(&self.node(id)?.data)
    }

    /// Get mutable reference to a node.
    pub fn get_node_mut(&mut self, id: u64) -> DavResult<&mut D> {
        let n = self.nodes.get_mut(&id).ok_or(DavError::NotFound)?;
        Ok(&mut n.data)
    }

    fn delete_node_from_parent(&mut self, id: u64) -> DavResult<()> {
        let (parent_id, name) = {
            let n = self.node(id)?;
            (n.parent_id, n.name.clone())
        };
        if let Some(pnode) = self.nodes.get_mut(&parent_id) {
            pnode.children.remove(&name);
        }
        Ok(())
    }

    /// Delete a node. Fails if node has children. Returns the node data.
    pub fn delete_node(&mut self, id: u64) -> DavResult<D> {
        if id == ROOT_ID {
            return Err(DavError::Status(StatusCode::FORBIDDEN));
        }
        if self.has_children(id) {
            return Err(DavError::Conflict);
        }
        self.delete_node_from_parent(id)?;
        self.nodes.remove(&id).map(|n| n.data).ok_or(DavError::NotFound)
    }

    /// Move a node to a new position and new name in the tree.
    /// The destination name must be free.
    pub fn move_node(&mut self, id: u64, new_parent: u64, new_name: &str) -> DavResult<()> {
        if self.node(new_parent)?.children.contains_key(new_name) {
            return Err(DavError::PreconditionFailed);
        }
        // a node cannot be moved below itself.
        let mut p = new_parent;
        while p != 0 {
            if p == id {
                return Err(DavError::Status(StatusCode::FORBIDDEN));
            }
            p = self.node(p)?.parent_id;
        }
        self.delete_node_from_parent(id)?;
        if let Some(n) = self.nodes.get_mut(&id) {
            n.parent_id = new_parent;
            n.name = new_name.to_string();
        }
        if let Some(pnode) = self.nodes.get_mut(&new_parent) {
            pnode.children.insert(new_name.to_string(), id);
        }
        Ok(())
    }

    /// All node ids below `id` (not including `id`), depth-first.
    pub fn descendants(&self, id: u64) -> Vec<u64> {
        let mut v = Vec::new();
        if let Some(n) = self.nodes.get(&id) {
            for &c in n.children.values() {
                v.push(c);
                v.extend(self.descendants(c));
            }
        }
        v
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &D> {
        self.nodes.values().map(|n| &n.data)
    }
}
