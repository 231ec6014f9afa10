//! Recursive condition walker shared by every adapter.
//!
//! An adapter supplies a [`WhereCompiler`]: how to compile one leaf and how
//! to join sibling fragments. The walker owns the tree shape rules:
//!
//! - an empty AND/OR contributes nothing
//! - a single-child AND/OR compiles to exactly its child
//! - leaves that compile to `None` (ignored or extracted) are dropped, and a
//!   bracket left with one fragment collapses to it

use crate::core::Result;
use crate::query::{FieldCondition, LogicalOp, Where};

/// Position of a node inside the tree being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    /// Reached through AND brackets only, starting from the root
    pub top_level_and: bool,
    /// Number of joined brackets above this node
    pub depth: usize,
}

impl Scope {
    pub fn root() -> Self {
        Self {
            top_level_and: true,
            depth: 0,
        }
    }

    fn enter(self, op: LogicalOp) -> Self {
        Self {
            top_level_and: self.top_level_and && op == LogicalOp::And,
            depth: self.depth + 1,
        }
    }
}

/// Per-adapter leaf compilation and joining.
pub trait WhereCompiler {
    type Fragment;

    /// Compile one leaf. `None` drops it from the output.
    fn compile_field(&mut self, condition: &FieldCondition, scope: Scope) -> Result<Option<Self::Fragment>>;

    /// Join two or more sibling fragments of the bracket at `scope`.
    fn join(&mut self, op: LogicalOp, fragments: Vec<Self::Fragment>, scope: Scope) -> Self::Fragment;
}

/// Compile a whole tree. `None` means the tree places no constraint.
pub fn compile_where<C>(compiler: &mut C, tree: &Where) -> Result<Option<C::Fragment>>
where
    C: WhereCompiler + ?Sized,
{
    walk(compiler, tree, Scope::root())
}

fn walk<C>(compiler: &mut C, node: &Where, scope: Scope) -> Result<Option<C::Fragment>>
where
    C: WhereCompiler + ?Sized,
{
    let (op, children) = match node {
        Where::Field(condition) => return compiler.compile_field(condition, scope),
        Where::And { and } => (LogicalOp::And, and),
        Where::Or { or } => (LogicalOp::Or, or),
    };

    match children.as_slice() {
        [] => Ok(None),
        // Predicates under an OR never count as top-level, even a lone one.
        [only] if op == LogicalOp::And => walk(compiler, only, scope),
        [only] => walk(
            compiler,
            only,
            Scope {
                top_level_and: false,
                ..scope
            },
        ),
        _ => {
            let inner = scope.enter(op);
            let mut fragments = Vec::with_capacity(children.len());
            for child in children {
                if let Some(fragment) = walk(compiler, child, inner)? {
                    fragments.push(fragment);
                }
            }

            if fragments.len() > 1 {
                Ok(Some(compiler.join(op, fragments, scope)))
            } else {
                Ok(fragments.pop())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Operator;

    /// Renders leaves as their field name, joins as `(a op b)`.
    struct Render;

    impl WhereCompiler for Render {
        type Fragment = String;

        fn compile_field(&mut self, c: &FieldCondition, scope: Scope) -> Result<Option<String>> {
            if c.field.name() == "skip" {
                return Ok(None);
            }
            let marker = if scope.top_level_and { "*" } else { "" };
            Ok(Some(format!("{}{}", c.field, marker)))
        }

        fn join(&mut self, op: LogicalOp, fragments: Vec<String>, _scope: Scope) -> String {
            format!("({})", fragments.join(&format!(" {} ", op)))
        }
    }

    fn leaf(name: &str) -> Where {
        Where::field(name, Operator::Eq, 1).unwrap()
    }

    fn render(tree: &Where) -> Option<String> {
        compile_where(&mut Render, tree).unwrap()
    }

    #[test]
    fn test_empty_brackets_contribute_nothing() {
        assert_eq!(render(&Where::default()), None);
        assert_eq!(render(&Where::or(vec![])), None);
        assert_eq!(render(&Where::and(vec![Where::or(vec![]), Where::and(vec![])])), None);
    }

    #[test]
    fn test_single_child_is_flattened() {
        let child = Where::or(vec![leaf("a"), leaf("b")]);
        assert_eq!(render(&Where::and(vec![child.clone()])), render(&child));
        assert_eq!(render(&child).as_deref(), Some("(a OR b)"));
    }

    #[test]
    fn test_top_level_scope() {
        let tree = Where::and(vec![leaf("a"), Where::or(vec![leaf("b"), leaf("c")])]);
        assert_eq!(render(&tree).as_deref(), Some("(a* AND (b OR c))"));

        let lone_or = Where::and(vec![leaf("a"), Where::or(vec![leaf("b")])]);
        assert_eq!(render(&lone_or).as_deref(), Some("(a* AND b)"));
    }

    #[test]
    fn test_dropped_leaves_collapse_brackets() {
        let tree = Where::and(vec![leaf("skip"), leaf("a")]);
        assert_eq!(render(&tree).as_deref(), Some("a*"));
        assert_eq!(render(&Where::and(vec![leaf("skip")])), None);
    }
}
