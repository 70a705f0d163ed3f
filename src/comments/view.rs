use std::collections::HashSet;

use crate::{
    comments::tree::CommentTree,
    models::comment::{Comment, CommentId},
    utils::html::to_plain_text,
};

/// Indent levels beyond this render flat, inside a bordered group.
pub const MAX_VISUAL_DEPTH: usize = 3;

/// Which reply groups the viewer folded away. Local UI state only.
#[derive(Debug, Clone, Default)]
pub struct CollapseState {
    collapsed: HashSet<CommentId>,
}

impl CollapseState {
    /// Flips a node's reply group; returns whether it is now collapsed.
    pub fn toggle(&mut self, id: CommentId) -> bool {
        if self.collapsed.remove(&id) {
            false
        } else {
            self.collapsed.insert(id);
            true
        }
    }

    pub fn is_collapsed(&self, id: CommentId) -> bool {
        self.collapsed.contains(&id)
    }

    /// Forgets nodes that are no longer in the thread.
    pub fn prune(&mut self, tree: &CommentTree) {
        self.collapsed.retain(|id| tree.contains(*id));
    }
}

/// One line of the rendered thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRow {
    pub id: CommentId,
    /// True nesting depth in the data.
    pub depth: usize,
    /// Visual indent, capped at `max_depth`.
    pub indent: usize,
    /// Rendered inside the bordered overflow container.
    pub boxed: bool,
    pub reply_count: usize,
    pub collapsed: bool,
}

/// Lays the thread out for display, skipping the replies of collapsed nodes.
pub fn visible_rows(tree: &CommentTree, collapse: &CollapseState, max_depth: usize) -> Vec<ThreadRow> {
    let mut rows = Vec::with_capacity(tree.len());
    let reply_counts = tree.descendant_counts();
    let mut stack: Vec<(usize, CommentId)> = tree.roots().iter().rev().map(|id| (0, *id)).collect();

    while let Some((depth, id)) = stack.pop() {
        let children = tree.children(id);
        let collapsed = collapse.is_collapsed(id);

        rows.push(ThreadRow {
            id,
            depth,
            indent: depth.min(max_depth),
            boxed: depth >= max_depth && depth > 0,
            reply_count: reply_counts.get(&id).copied().unwrap_or(0),
            collapsed,
        });

        if !collapsed {
            stack.extend(children.iter().rev().map(|child| (depth + 1, *child)));
        }
    }

    rows
}

/// Body text for display; soft-deleted comments keep their slot but not their text.
pub fn display_body(comment: &Comment) -> String {
    if comment.is_deleted {
        "[deleted]".to_string()
    } else {
        to_plain_text(&comment.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comment(id: i64, parent: Option<i64>) -> Comment {
        Comment {
            id: CommentId::Confirmed(id),
            parent_id: parent.map(CommentId::Confirmed),
            user_id: 1,
            content: "<p>text</p>".to_string(),
            created_at: Utc::now(),
            author_name: "ada".to_string(),
            author_avatar_url: None,
            author_role: None,
            is_sending: false,
            is_deleted: false,
        }
    }

    fn chain(len: i64) -> CommentTree {
        CommentTree::build((1..=len).map(|id| comment(id, (id > 1).then(|| id - 1))))
    }

    #[test]
    fn deep_replies_are_capped_visually_not_in_data() {
        let rows = visible_rows(&chain(6), &CollapseState::default(), MAX_VISUAL_DEPTH);
        let indents: Vec<usize> = rows.iter().map(|r| r.indent).collect();
        let depths: Vec<usize> = rows.iter().map(|r| r.depth).collect();

        assert_eq!(indents, vec![0, 1, 2, 3, 3, 3]);
        assert_eq!(depths, vec![0, 1, 2, 3, 4, 5]);
        assert!(rows[3].boxed && !rows[2].boxed);
        assert_eq!(rows[0].reply_count, 5);
    }

    #[test]
    fn reply_counts_cover_whole_subtrees() {
        // 1 -> {2 -> {4, 5 -> 7}, 3}, 6
        let tree = CommentTree::build(vec![
            comment(1, None),
            comment(2, Some(1)),
            comment(3, Some(1)),
            comment(4, Some(2)),
            comment(5, Some(2)),
            comment(6, None),
            comment(7, Some(5)),
        ]);

        let rows = visible_rows(&tree, &CollapseState::default(), MAX_VISUAL_DEPTH);
        assert_eq!(rows.len(), 7);
        for row in &rows {
            assert_eq!(row.reply_count, tree.descendant_count(row.id), "row {}", row.id);
        }
        let counts: Vec<(CommentId, usize)> = rows.iter().map(|r| (r.id, r.reply_count)).collect();
        assert_eq!(counts[0], (CommentId::Confirmed(1), 5));
        assert_eq!(counts[1], (CommentId::Confirmed(2), 3));
    }

    #[test]
    fn collapsing_hides_descendants() {
        let tree = chain(4);
        let mut collapse = CollapseState::default();
        assert!(collapse.toggle(CommentId::Confirmed(2)));

        let rows = visible_rows(&tree, &collapse, MAX_VISUAL_DEPTH);
        assert_eq!(rows.len(), 2);
        assert!(rows[1].collapsed);

        assert!(!collapse.toggle(CommentId::Confirmed(2)));
        assert_eq!(visible_rows(&tree, &collapse, MAX_VISUAL_DEPTH).len(), 4);
    }

    #[test]
    fn prune_forgets_removed_nodes() {
        let mut tree = chain(3);
        let mut collapse = CollapseState::default();
        collapse.toggle(CommentId::Confirmed(2));
        collapse.toggle(CommentId::Confirmed(3));

        tree.remove(CommentId::Confirmed(3));
        collapse.prune(&tree);

        assert!(collapse.is_collapsed(CommentId::Confirmed(2)));
        assert!(!collapse.is_collapsed(CommentId::Confirmed(3)));
    }

    #[test]
    fn deleted_body_is_hidden() {
        let mut c = comment(1, None);
        assert_eq!(display_body(&c), "text");
        c.is_deleted = true;
        assert_eq!(display_body(&c), "[deleted]");
    }
}
