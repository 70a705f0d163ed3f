// src/comments/tree.rs

use std::collections::HashMap;

use crate::{
    error::AppError,
    models::comment::{Comment, CommentId},
};

/// A comment plus its place in the thread.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub comment: Comment,
    /// Where the node actually hangs. `None` for roots, including orphans
    /// whose declared parent is not loaded.
    pub parent: Option<CommentId>,
    pub children: Vec<CommentId>,
}

/// Threaded comments stored as an arena keyed by id.
///
/// Roots keep the server's order (newest first); children keep insertion order.
/// Every id appears at most once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentTree {
    nodes: HashMap<CommentId, CommentNode>,
    roots: Vec<CommentId>,
}

impl CommentTree {
    /// Rebuilds the thread from a flat list.
    ///
    /// A record whose parent is in the list hangs under it, wherever the parent
    /// appears in the list. A record whose parent is missing (not loaded yet) is
    /// shown as a root. Later duplicates of an id are ignored.
    pub fn build(records: impl IntoIterator<Item = Comment>) -> Self {
        let mut tree = Self::default();
        let mut order = Vec::new();

        for comment in records {
            if tree.nodes.contains_key(&comment.id) {
                tracing::debug!(id = %comment.id, "duplicate comment skipped");
                continue;
            }
            order.push(comment.id);
            tree.nodes.insert(
                comment.id,
                CommentNode {
                    comment,
                    parent: None,
                    children: Vec::new(),
                },
            );
        }

        for id in order {
            let declared = tree.nodes.get(&id).and_then(|n| n.comment.parent_id);
            match declared {
                Some(parent) if tree.can_attach(id, parent) => tree.link(id, parent),
                _ => tree.roots.push(id),
            }
        }

        tree
    }

    /// Depth-first, pre-order list of every comment; feeding it back into
    /// [`CommentTree::build`] yields the same tree.
    pub fn flatten(&self) -> Vec<Comment> {
        self.walk().into_iter().map(|(_, node)| node.comment.clone()).collect()
    }

    /// Depth-first, pre-order traversal with each node's true depth (roots are 0).
    pub fn walk(&self) -> Vec<(usize, &CommentNode)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, CommentId)> =
            self.roots.iter().rev().map(|id| (0, *id)).collect();

        while let Some((depth, id)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push((depth, node));
            stack.extend(node.children.iter().rev().map(|child| (depth + 1, *child)));
        }

        out
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: CommentId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: CommentId) -> Option<&Comment> {
        self.nodes.get(&id).map(|n| &n.comment)
    }

    pub fn node(&self, id: CommentId) -> Option<&CommentNode> {
        self.nodes.get(&id)
    }

    pub fn roots(&self) -> &[CommentId] {
        &self.roots
    }

    pub fn children(&self, id: CommentId) -> &[CommentId] {
        self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn depth(&self, id: CommentId) -> Option<usize> {
        let mut node = self.nodes.get(&id)?;
        let mut depth = 0;
        while let Some(parent) = node.parent {
            node = self.nodes.get(&parent)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Number of comments below `id`, at any depth.
    pub fn descendant_count(&self, id: CommentId) -> usize {
        let mut count = 0;
        let mut stack: Vec<CommentId> = self.children(id).to_vec();
        while let Some(next) = stack.pop() {
            count += 1;
            stack.extend_from_slice(self.children(next));
        }
        count
    }

    /// Descendant counts for every node in one pass.
    pub fn descendant_counts(&self) -> HashMap<CommentId, usize> {
        let mut counts = HashMap::with_capacity(self.nodes.len());
        // Reversed pre-order visits children before their parent.
        for (_, node) in self.walk().into_iter().rev() {
            let total: usize = node
                .children
                .iter()
                .map(|child| counts.get(child).map_or(1, |below| below + 1))
                .sum();
            counts.insert(node.comment.id, total);
        }
        counts
    }

    /// Optimistic comments still waiting for the server, in pre-order.
    pub fn pending(&self) -> Vec<Comment> {
        self.walk()
            .into_iter()
            .filter(|(_, node)| node.comment.id.is_pending())
            .map(|(_, node)| node.comment.clone())
            .collect()
    }

    /// Adds a new comment: roots go first, replies go last under their parent.
    pub fn insert(&mut self, comment: Comment) -> Result<(), AppError> {
        if self.nodes.contains_key(&comment.id) {
            return Err(AppError::Conflict(format!("Comment {} already exists", comment.id)));
        }

        match comment.parent_id {
            Some(parent) => {
                if !self.nodes.contains_key(&parent) {
                    return Err(AppError::NotFound(format!(
                        "Parent comment {} not found",
                        parent
                    )));
                }
                let id = comment.id;
                self.add_node(comment);
                self.link(id, parent);
            }
            None => {
                let id = comment.id;
                self.add_node(comment);
                self.roots.insert(0, id);
            }
        }

        Ok(())
    }

    /// Re-attaches optimistic comments after a rebuild.
    ///
    /// Pending roots go back on top in their previous order; pending replies go
    /// back under their parent if it is still loaded, otherwise they are dropped.
    pub fn graft_pending(&mut self, pending: Vec<Comment>) {
        let mut new_roots = Vec::new();

        for comment in pending {
            if self.nodes.contains_key(&comment.id) {
                continue;
            }
            let id = comment.id;
            match comment.parent_id {
                None => {
                    self.add_node(comment);
                    new_roots.push(id);
                }
                Some(parent) if self.nodes.contains_key(&parent) => {
                    self.add_node(comment);
                    self.link(id, parent);
                }
                Some(parent) => {
                    tracing::debug!(%id, %parent, "pending reply lost its parent");
                }
            }
        }

        self.roots.splice(0..0, new_roots);
    }

    /// Puts `comment` in the place of `old`, keeping old's position and replies.
    ///
    /// If `comment.id` is already in the tree (a reload got there first), `old`
    /// is folded into that node instead so the id stays unique.
    pub fn replace(&mut self, old: CommentId, comment: Comment) -> bool {
        let Some(old_node) = self.nodes.remove(&old) else {
            return false;
        };
        let new_id = comment.id;

        if new_id != old && self.nodes.contains_key(&new_id) {
            self.detach(old, old_node.parent);
            for child in old_node.children {
                self.reparent(child, new_id);
                if let Some(target) = self.nodes.get_mut(&new_id) {
                    if !target.children.contains(&child) {
                        target.children.push(child);
                    }
                }
            }
            return true;
        }

        let siblings = match old_node.parent {
            Some(parent) => self.nodes.get_mut(&parent).map(|n| &mut n.children),
            None => Some(&mut self.roots),
        };
        if let Some(slot) = siblings.and_then(|s| s.iter_mut().find(|id| **id == old)) {
            *slot = new_id;
        }

        for child in &old_node.children {
            self.reparent(*child, new_id);
        }

        self.nodes.insert(
            new_id,
            CommentNode {
                comment,
                parent: old_node.parent,
                children: old_node.children,
            },
        );
        true
    }

    /// Removes a comment and everything below it; returns how many went away.
    pub fn remove(&mut self, id: CommentId) -> usize {
        let Some(parent) = self.nodes.get(&id).map(|n| n.parent) else {
            return 0;
        };
        self.detach(id, parent);

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                removed += 1;
                stack.extend(node.children);
            }
        }
        removed
    }

    pub fn update_content(&mut self, id: CommentId, content: &str) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.comment.content = content.to_string();
                true
            }
            None => false,
        }
    }

    fn add_node(&mut self, comment: Comment) {
        self.nodes.insert(
            comment.id,
            CommentNode {
                comment,
                parent: None,
                children: Vec::new(),
            },
        );
    }

    /// A node may hang under `parent` if the parent exists and is not the node
    /// itself or one of its descendants.
    fn can_attach(&self, id: CommentId, parent: CommentId) -> bool {
        if id == parent || !self.nodes.contains_key(&parent) {
            return false;
        }
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == id {
                return false;
            }
            cursor = self.nodes.get(&current).and_then(|n| n.parent);
        }
        true
    }

    fn link(&mut self, id: CommentId, parent: CommentId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(parent);
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
    }

    fn detach(&mut self, id: CommentId, parent: Option<CommentId>) {
        match parent {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
    }

    fn reparent(&mut self, child: CommentId, parent: CommentId) {
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
            node.comment.parent_id = Some(parent);
        }
    }
}
