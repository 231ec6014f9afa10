//! Fluent construction of condition trees.
//!
//! Brackets live in an arena and are addressed by [`Cursor`] handles, so a
//! caller can keep several open brackets at once and append to any of them.
//! The root is always an AND bracket.

use super::ast::{FieldCondition, LogicalOp, Operator, Where, WhereValue};
use super::field_path::FieldPath;
use crate::core::{CrudError, Result};

/// Handle to one bracket inside a [`WhereBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor(usize);

#[derive(Debug, Clone)]
enum Child {
    Bracket(usize),
    Field(FieldCondition),
}

#[derive(Debug, Clone)]
struct Node {
    op: LogicalOp,
    parent: Option<usize>,
    children: Vec<Child>,
}

/// Arena-backed builder for [`Where`] trees.
#[derive(Debug, Clone)]
pub struct WhereBuilder {
    nodes: Vec<Node>,
}

impl Default for WhereBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WhereBuilder {
    /// Start with an empty AND root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                op: LogicalOp::And,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> Cursor {
        Cursor(0)
    }

    /// Enclosing bracket of `at`, `None` for the root.
    pub fn parent(&self, at: Cursor) -> Option<Cursor> {
        self.nodes.get(at.0).and_then(|n| n.parent).map(Cursor)
    }

    /// Kind of bracket addressed by `at`.
    pub fn kind(&self, at: Cursor) -> Result<LogicalOp> {
        self.node(at).map(|n| n.op)
    }

    /// Enter an AND bracket. Returns `at` unchanged when it already is one.
    pub fn add_and(&mut self, at: Cursor) -> Result<Cursor> {
        self.enter(at, LogicalOp::And)
    }

    /// Enter an OR bracket. Returns `at` unchanged when it already is one.
    pub fn add_or(&mut self, at: Cursor) -> Result<Cursor> {
        self.enter(at, LogicalOp::Or)
    }

    /// Append a validated leaf to the bracket at `at`.
    pub fn add_field(
        &mut self,
        at: Cursor,
        field: FieldPath,
        operator: Operator,
        value: WhereValue,
    ) -> Result<Cursor> {
        let condition = FieldCondition::new(field, operator, value)?;
        self.node_mut(at)?.children.push(Child::Field(condition));
        Ok(at)
    }

    /// Materialize the tree from the root.
    pub fn build(&self) -> Where {
        self.materialize(0)
    }

    fn enter(&mut self, at: Cursor, op: LogicalOp) -> Result<Cursor> {
        if self.node(at)?.op == op {
            return Ok(at);
        }

        let index = self.nodes.len();
        self.nodes.push(Node {
            op,
            parent: Some(at.0),
            children: Vec::new(),
        });
        self.node_mut(at)?.children.push(Child::Bracket(index));
        Ok(Cursor(index))
    }

    fn node(&self, at: Cursor) -> Result<&Node> {
        self.nodes.get(at.0).ok_or_else(|| {
            CrudError::InvalidWhereState(format!("cursor {} does not address a bracket", at.0))
        })
    }

    fn node_mut(&mut self, at: Cursor) -> Result<&mut Node> {
        self.nodes.get_mut(at.0).ok_or_else(|| {
            CrudError::InvalidWhereState(format!("cursor {} does not address a bracket", at.0))
        })
    }

    fn materialize(&self, index: usize) -> Where {
        let node = &self.nodes[index];
        let children = node
            .children
            .iter()
            .map(|child| match child {
                Child::Bracket(i) => self.materialize(*i),
                Child::Field(c) => Where::Field(c.clone()),
            })
            .collect();

        match node.op {
            LogicalOp::And => Where::and(children),
            LogicalOp::Or => Where::or(children),
        }
    }
}
