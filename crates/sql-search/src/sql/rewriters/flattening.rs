//! Flattening of nested AND/OR nodes.

use crate::error::StorageResult;
use crate::expression::{ExprRef, Expression};

use super::{ExpressionRewriter, rewrite_children};

/// Pulls the children of a nested node with the same operator up into its
/// parent, and replaces single-child nodes by their child.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatteningRewriter;

impl ExpressionRewriter for FlatteningRewriter {
    fn name(&self) -> &'static str {
        "flattening"
    }

    fn rewrite(&self, expression: &ExprRef) -> StorageResult<Option<ExprRef>> {
        let Expression::Multiary { op, expressions } = expression.as_ref() else {
            return rewrite_children(self, expression);
        };

        let mut changed = false;
        let mut flattened = Vec::with_capacity(expressions.len());
        for child in expressions {
            let child = match self.rewrite(child)? {
                Some(new) => {
                    changed = true;
                    new
                }
                None => child.clone(),
            };

            match child.as_ref() {
                Expression::Multiary {
                    op: child_op,
                    expressions: grandchildren,
                } if child_op == op => {
                    changed = true;
                    flattened.extend(grandchildren.iter().cloned());
                }
                _ => flattened.push(child),
            }
        }

        if flattened.len() == 1 {
            return Ok(flattened.pop());
        }
        Ok(changed.then(|| Expression::multiary(*op, flattened)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::FieldName;

    fn leaf(value: &str) -> ExprRef {
        Expression::string_equals(FieldName::TokenCode, value)
    }

    #[test]
    fn test_nested_same_operator_is_pulled_up() {
        let expr = Expression::and(vec![
            leaf("a"),
            Expression::and(vec![leaf("b"), Expression::and(vec![leaf("c")])]),
            Expression::or(vec![leaf("d"), leaf("e")]),
        ]);

        let flat = FlatteningRewriter.rewrite(&expr).unwrap().unwrap();
        assert_eq!(
            flat.to_string(),
            "(And (StringEquals TokenCode 'a') (StringEquals TokenCode 'b') \
             (StringEquals TokenCode 'c') \
             (Or (StringEquals TokenCode 'd') (StringEquals TokenCode 'e')))"
        );
    }

    #[test]
    fn test_single_child_collapses() {
        let expr = Expression::or(vec![leaf("a")]);
        assert_eq!(
            FlatteningRewriter.rewrite(&expr).unwrap().unwrap().to_string(),
            "(StringEquals TokenCode 'a')"
        );
    }

    #[test]
    fn test_already_flat_is_unchanged() {
        let expr = Expression::and(vec![leaf("a"), Expression::or(vec![leaf("b"), leaf("c")])]);
        assert!(FlatteningRewriter.rewrite(&expr).unwrap().is_none());
    }
}
