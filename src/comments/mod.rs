// src/comments/mod.rs

pub mod manager;
pub mod tree;
pub mod view;

pub use manager::{CommentManager, ThreadSnapshot};
pub use tree::{CommentNode, CommentTree};
pub use view::{CollapseState, MAX_VISUAL_DEPTH, ThreadRow, visible_rows};
