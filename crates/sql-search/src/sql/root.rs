//! The SQL-specific root of a rewritten search expression.

use std::fmt;

use crate::error::{QueryError, QueryResult};
use crate::expression::{ExprRef, Expression};

use super::generators::QueryGenerator;

/// What a [`TableExpression`] contributes to the generated query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableExpressionKind {
    /// A single search parameter matched against its table.
    Normal,
    /// One hop of a chained or reverse-chained reference traversal.
    Chain,
    /// `_include` / `_revinclude` expansion of the matched page.
    Include,
    /// Distinct, page-limited selection of matches.
    Top,
    /// Every current resource, used as a seed to restrict.
    All,
    /// Rows of the predecessor with no match in the parameter table.
    NotExists,
    /// The predecessor's rows unioned with an alternative match.
    Concatenation,
    /// Matches unioned with every include.
    IncludeUnionAll,
}

impl fmt::Display for TableExpressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A predicate over one search parameter (or compartment) table.
///
/// The normalized predicate, when present, is always a search parameter,
/// missing search parameter, compartment, chained or include expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableExpression {
    kind: TableExpressionKind,
    query_generator: Option<QueryGenerator>,
    normalized_predicate: Option<ExprRef>,
    denormalized_predicate: Option<ExprRef>,
    chain_level: usize,
}

impl TableExpression {
    /// Creates a table expression, rejecting normalized predicates outside
    /// the allowed set.
    pub fn new(
        kind: TableExpressionKind,
        query_generator: Option<QueryGenerator>,
        normalized_predicate: Option<ExprRef>,
        denormalized_predicate: Option<ExprRef>,
        chain_level: usize,
    ) -> QueryResult<Self> {
        if let Some(predicate) = &normalized_predicate {
            match predicate.as_ref() {
                Expression::SearchParameter { .. }
                | Expression::MissingSearchParameter { .. }
                | Expression::Compartment { .. }
                | Expression::Chained { .. }
                | Expression::Include { .. } => {}
                _ => {
                    return Err(QueryError::InvalidNormalizedPredicate {
                        expression: predicate.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            kind,
            query_generator,
            normalized_predicate,
            denormalized_predicate,
            chain_level,
        })
    }

    /// A table expression that carries no predicates (`Top`, `IncludeUnionAll`).
    pub fn marker(kind: TableExpressionKind) -> Self {
        Self {
            kind,
            query_generator: None,
            normalized_predicate: None,
            denormalized_predicate: None,
            chain_level: 0,
        }
    }

    /// An `All` seed restricted by `denormalized_predicate`.
    pub fn all(
        query_generator: Option<QueryGenerator>,
        denormalized_predicate: Option<ExprRef>,
    ) -> Self {
        Self {
            kind: TableExpressionKind::All,
            query_generator,
            normalized_predicate: None,
            denormalized_predicate,
            chain_level: 0,
        }
    }

    /// What the table expression renders as.
    pub fn kind(&self) -> TableExpressionKind {
        self.kind
    }

    /// Generator for the search parameter table, if any.
    pub fn query_generator(&self) -> Option<QueryGenerator> {
        self.query_generator
    }

    /// Predicate over the search parameter table.
    pub fn normalized_predicate(&self) -> Option<&ExprRef> {
        self.normalized_predicate.as_ref()
    }

    /// Predicate over the resource table, applied inside this table expression.
    pub fn denormalized_predicate(&self) -> Option<&ExprRef> {
        self.denormalized_predicate.as_ref()
    }

    /// Number of reference hops from the searched resource; zero outside chains.
    pub fn chain_level(&self) -> usize {
        self.chain_level
    }

    /// A copy with a different kind.
    pub fn with_kind(&self, kind: TableExpressionKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// A copy with a different normalized predicate.
    pub fn with_normalized_predicate(&self, predicate: Option<ExprRef>) -> QueryResult<Self> {
        Self::new(
            self.kind,
            self.query_generator,
            predicate,
            self.denormalized_predicate.clone(),
            self.chain_level,
        )
    }

    /// A copy with a different denormalized predicate.
    pub fn with_denormalized_predicate(&self, predicate: Option<ExprRef>) -> Self {
        Self {
            denormalized_predicate: predicate,
            ..self.clone()
        }
    }
}

impl fmt::Display for TableExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Table {}", self.kind)?;
        if self.chain_level > 0 {
            write!(f, " ChainLevel:{}", self.chain_level)?;
        }
        if let Some(table) = self.query_generator.and_then(|g| g.table()) {
            write!(f, " {}", table)?;
        }
        if let Some(p) = &self.normalized_predicate {
            write!(f, " Normalized:{}", p)?;
        }
        if let Some(p) = &self.denormalized_predicate {
            write!(f, " Denormalized:{}", p)?;
        }
        write!(f, ")")
    }
}

/// A search expression partitioned into table expressions and predicates
/// over the resource table.
///
/// With no table expressions the resource table is scanned directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlRootExpression {
    table_expressions: Vec<TableExpression>,
    denormalized_expressions: Vec<ExprRef>,
}

impl SqlRootExpression {
    /// Creates a root from its two partitions.
    pub fn new(
        table_expressions: Vec<TableExpression>,
        denormalized_expressions: Vec<ExprRef>,
    ) -> Self {
        Self {
            table_expressions,
            denormalized_expressions,
        }
    }

    /// A root without resource-table predicates.
    pub fn with_table_expressions(table_expressions: Vec<TableExpression>) -> Self {
        Self::new(table_expressions, Vec::new())
    }

    /// A root that only filters the resource table.
    pub fn with_denormalized_expressions(denormalized_expressions: Vec<ExprRef>) -> Self {
        Self::new(Vec::new(), denormalized_expressions)
    }

    /// Table expressions, in rendering order.
    pub fn table_expressions(&self) -> &[TableExpression] {
        &self.table_expressions
    }

    /// Predicates evaluated against the resource table itself.
    pub fn denormalized_expressions(&self) -> &[ExprRef] {
        &self.denormalized_expressions
    }

    /// Kinds of the table expressions, in order.
    pub fn kinds(&self) -> Vec<TableExpressionKind> {
        self.table_expressions.iter().map(|t| t.kind).collect()
    }
}

impl fmt::Display for SqlRootExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(SqlRoot (Tables")?;
        for table in &self.table_expressions {
            write!(f, " {}", table)?;
        }
        write!(f, ") (Denormalized")?;
        for predicate in &self.denormalized_expressions {
            write!(f, " {}", predicate)?;
        }
        write!(f, "))")
    }
}
