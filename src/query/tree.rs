//! The relational-algebra plan tree.
//!
//! Nodes carry a closed `NodeType` tag, a string value, an ordered child
//! list, a weak parent back-reference, and a monotonic `id` assigned at
//! construction. The tree is the shared representation for the parsed AST
//! and the optimizer's rewrite target: a rule applier just builds a new
//! `QueryTree` (or subtree) and splices it in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Resets the global id counter. Test-only: lets property tests assert on
/// exact id values without cross-test interference.
#[cfg(test)]
pub fn reset_ids_for_test() {
    NEXT_ID.store(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Relation,
    Project,
    Filter,
    Join,
    Sort,
    Limit,
    Alias,
    Operator,
    OperatorS,
    Comparison,
    ColumnRef,
    ColumnName,
    TableName,
    Identifier,
    LiteralString,
    LiteralNumber,
    LiteralBoolean,
    LiteralNull,
    Array,
    List,
    FunctionCall,
    ArithExpr,
    InExpr,
    NotInExpr,
    ExistsExpr,
    NotExistsExpr,
    BetweenExpr,
    NotBetweenExpr,
    IsNullExpr,
    IsNotNullExpr,
    LikeExpr,
    NotLikeExpr,
    Assignment,
    ValuesClause,
    ColumnList,
    ColumnDef,
    ColumnDefList,
    DataType,
    PrimaryKey,
    ForeignKey,
    References,
    UpdateQuery,
    InsertQuery,
    DeleteQuery,
    CreateTable,
    DropTable,
    BeginTransaction,
    Commit,
}

pub type NodeRef = Rc<RefCell<QueryTree>>;

#[derive(Debug)]
pub struct QueryTree {
    pub id: u64,
    pub node_type: NodeType,
    pub value: String,
    pub children: Vec<NodeRef>,
    pub parent: Option<Weak<RefCell<QueryTree>>>,
}

impl QueryTree {
    pub fn new(node_type: NodeType, value: impl Into<String>) -> NodeRef {
        Rc::new(RefCell::new(Self {
            id: next_id(),
            node_type,
            value: value.into(),
            children: Vec::new(),
            parent: None,
        }))
    }

    pub fn new_with_id(id: u64, node_type: NodeType, value: impl Into<String>) -> NodeRef {
        Rc::new(RefCell::new(Self { id, node_type, value: value.into(), children: Vec::new(), parent: None }))
    }

    /// Appends a child, wiring its parent back-reference to `self_rc`.
    pub fn push_child(self_rc: &NodeRef, child: NodeRef) {
        child.borrow_mut().parent = Some(Rc::downgrade(self_rc));
        self_rc.borrow_mut().children.push(child);
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn parent_node(&self) -> Option<NodeRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }
}

/// Deep-clones a subtree. `preserve_id = true` copies the source ids onto
/// the clone structurally (a map from old id to the corresponding new node
/// makes the clone addressable by the same ids a rule's parameters refer
/// to); `preserve_id = false` assigns fresh monotonic ids throughout.
pub fn clone_tree(node: &NodeRef, preserve_id: bool) -> NodeRef {
    let borrowed = node.borrow();
    let new_node = if preserve_id {
        QueryTree::new_with_id(borrowed.id, borrowed.node_type, borrowed.value.clone())
    } else {
        QueryTree::new(borrowed.node_type, borrowed.value.clone())
    };
    for child in &borrowed.children {
        let cloned_child = clone_tree(child, preserve_id);
        QueryTree::push_child(&new_node, cloned_child);
    }
    new_node
}

/// Pre-order traversal, visiting `node` before its children.
pub fn traverse_preorder(node: &NodeRef, visit: &mut impl FnMut(&NodeRef)) {
    visit(node);
    let children: Vec<NodeRef> = node.borrow().children.clone();
    for child in &children {
        traverse_preorder(child, visit);
    }
}

/// Post-order traversal, visiting `node` after its children.
pub fn traverse_postorder(node: &NodeRef, visit: &mut impl FnMut(&NodeRef)) {
    let children: Vec<NodeRef> = node.borrow().children.clone();
    for child in &children {
        traverse_postorder(child, visit);
    }
    visit(node);
}

pub fn find_nodes_by_type(root: &NodeRef, node_type: NodeType) -> Vec<NodeRef> {
    let mut out = Vec::new();
    traverse_preorder(root, &mut |n| {
        if n.borrow().node_type == node_type {
            out.push(n.clone());
        }
    });
    out
}

pub fn find_by_id(root: &NodeRef, id: u64) -> Option<NodeRef> {
    let mut found = None;
    traverse_preorder(root, &mut |n| {
        if found.is_none() && n.borrow().id == id {
            found = Some(n.clone());
        }
    });
    found
}

/// Builds an id -> node lookup for an entire tree, used by rule appliers
/// that address condition/join nodes by stable id.
pub fn index_by_id(root: &NodeRef) -> HashMap<u64, NodeRef> {
    let mut map = HashMap::new();
    traverse_preorder(root, &mut |n| {
        map.insert(n.borrow().id, n.clone());
    });
    map
}

/// Replaces `old` with `new_node` in its parent's child list. No-op if
/// `old` has no parent (it is the root).
pub fn replace_child(old: &NodeRef, new_node: &NodeRef) {
    if let Some(parent) = old.borrow().parent_node() {
        let mut parent_mut = parent.borrow_mut();
        if let Some(slot) = parent_mut.children.iter_mut().find(|c| Rc::ptr_eq(c, old)) {
            *slot = new_node.clone();
        }
        new_node.borrow_mut().parent = Some(Rc::downgrade(&parent));
    } else {
        new_node.borrow_mut().parent = None;
    }
}

#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub root: NodeRef,
    pub original_sql: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserve_id_clone_matches_structure() {
        reset_ids_for_test();
        let root = QueryTree::new(NodeType::Filter, "WHERE");
        let data = QueryTree::new(NodeType::Relation, "users");
        let cond = QueryTree::new(NodeType::Comparison, "=");
        QueryTree::push_child(&root, data);
        QueryTree::push_child(&root, cond);

        let cloned = clone_tree(&root, true);
        assert_eq!(cloned.borrow().id, root.borrow().id);
        for (orig, new) in root.borrow().children.iter().zip(cloned.borrow().children.iter()) {
            assert_eq!(orig.borrow().id, new.borrow().id);
        }
    }

    #[test]
    fn fresh_id_clone_assigns_new_ids() {
        reset_ids_for_test();
        let root = QueryTree::new(NodeType::Relation, "users");
        let cloned = clone_tree(&root, false);
        assert_ne!(cloned.borrow().id, root.borrow().id);
    }

    #[test]
    fn parent_link_always_resolves_into_childs_children() {
        reset_ids_for_test();
        let root = QueryTree::new(NodeType::Project, "*");
        let child = QueryTree::new(NodeType::Relation, "users");
        QueryTree::push_child(&root, child.clone());
        let parent = child.borrow().parent_node().expect("parent set");
        assert!(parent.borrow().children.iter().any(|c| Rc::ptr_eq(c, &child)));
    }
}
