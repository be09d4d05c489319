//! Moves includes after the matches and unions them in.

use crate::error::StorageResult;
use crate::sql::root::{SqlRootExpression, TableExpression, TableExpressionKind};

use super::{RewriteContext, RootRewriter};

/// Stably moves include table expressions to the end and appends one
/// `IncludeUnionAll`. Count-only requests drop the includes instead, since
/// included resources never count as matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct IncludeRewriter;

impl RootRewriter for IncludeRewriter {
    fn name(&self) -> &'static str {
        "include"
    }

    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>> {
        let tables = root.table_expressions();
        if !tables
            .iter()
            .any(|t| t.kind() == TableExpressionKind::Include)
        {
            return Ok(None);
        }

        let (includes, mut reordered): (Vec<TableExpression>, Vec<TableExpression>) = tables
            .iter()
            .cloned()
            .partition(|t| t.kind() == TableExpressionKind::Include);

        if !context.count_only {
            reordered.extend(includes);
            reordered.push(TableExpression::marker(TableExpressionKind::IncludeUnionAll));
        }

        Ok(Some(SqlRootExpression::new(
            reordered,
            root.denormalized_expressions().to_vec(),
        )))
    }
}
