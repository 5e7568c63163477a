//! Data Structures
//!
//! - [`TreeNode`] and identifier helpers
//! - [`ContentItem`]: content metadata the tree consumes
//! - [`Principal`]: explicit caller identity and permissions
//! - [`Mutation`] / [`MutationOutcome`]: structural change descriptions

pub mod content;
pub mod mutation;
pub mod principal;
pub mod tree_node;

pub use content::{ContentItem, ContentTypeId};
pub use mutation::{
    InsertReport, MoveItem, MoveReport, Mutation, MutationKind, MutationOutcome, MutationRecord, RemoveReport,
    RepairReport,
};
pub use principal::{Permission, Principal, PrincipalId};
pub use tree_node::{
    parse_id_list, parse_parent_id, parse_tree_id, ContentId, GroupId, TreeId, TreeNode,
    ValidationError, ROOT_PARENT_ID,
};
