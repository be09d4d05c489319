//! Renders a rewritten [`SqlRootExpression`] as a T-SQL command.
//!
//! Every table expression becomes one common table expression (`cte0`,
//! `cte1`, ...) that restricts the surrogate ids selected by its predecessor.
//! The final statement joins the resource table to the last one.
//!
//! Every CTE projects `Sid1`, the surrogate id of a candidate match. Inside a
//! chain, `Sid2` carries the surrogate id at the far end of the current
//! reference hop.

use std::fmt::Write as _;

use crate::error::{QueryError, QueryResult, StorageResult};
use crate::expression::{ExprRef, Expression};

use super::generators::PredicateRenderer;
use super::model::{SearchModel, require_resource_type_id, require_search_param_id};
use super::parameters::{SqlParam, SqlParameter, SqlQueryParameterManager};
use super::rewriters::RewriteContext;
use super::root::{SqlRootExpression, TableExpression, TableExpressionKind};
use super::schema::{SearchParamTable, qualify, reference, resource, search_param};
use super::writer::SqlWriter;

const RESOURCE_ALIAS: &str = "r";
const REFERENCE_ALIAS: &str = "ref";
const REVERSE_CHAIN_RESOURCE_ALIAS: &str = "r2";

/// A command ready to be executed: T-SQL text and its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlCommand {
    /// The command text, with `@pN` placeholders.
    pub text: String,
    /// Parameters in placeholder order.
    pub parameters: Vec<SqlParameter>,
}

impl SqlCommand {
    /// Value bound to placeholder `name`.
    pub fn parameter(&self, name: &str) -> Option<&SqlParam> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// The command as a script that declares every parameter, for replaying
    /// it by hand.
    pub fn to_debug_script(&self) -> String {
        let mut script = String::new();
        for parameter in &self.parameters {
            let _ = writeln!(script, "{};", parameter.declare_statement());
        }
        if !self.parameters.is_empty() {
            script.push('\n');
        }
        script.push_str(&self.text);
        script
    }
}

/// Generates the T-SQL of one search.
///
/// A generator holds the state of a single rendering and is consumed by
/// [`SqlQueryGenerator::generate`].
pub struct SqlQueryGenerator<'a> {
    model: &'a dyn SearchModel,
    params: SqlQueryParameterManager,
    context: RewriteContext,
    is_history_search: bool,
    main_select: Option<String>,
    include_ctes: Vec<String>,
}

impl<'a> SqlQueryGenerator<'a> {
    /// Creates a generator for one search. History searches keep history
    /// rows and delete markers.
    pub fn new(
        model: &'a dyn SearchModel,
        context: RewriteContext,
        is_history_search: bool,
    ) -> Self {
        Self {
            model,
            params: SqlQueryParameterManager::new(),
            context,
            is_history_search,
            main_select: None,
            include_ctes: Vec::new(),
        }
    }

    /// Renders `root`.
    pub fn generate(mut self, root: &SqlRootExpression) -> StorageResult<SqlCommand> {
        let mut w = SqlWriter::new();
        let tables = root.table_expressions();

        if !tables.is_empty() {
            w.append("WITH ");
            for index in 0..tables.len() {
                if index > 0 {
                    w.append_line(",");
                }
                w.append(&cte_name(index)).append_line(" AS").append_line("(");
                w.indented(|w| self.table_expression(w, root, index))?;
                w.append(")");
            }
            w.new_line();
        }

        self.terminal_select(&mut w, root)?;

        Ok(SqlCommand {
            text: w.finish(),
            parameters: self.params.into_parameters(),
        })
    }

    fn terminal_select(
        &mut self,
        w: &mut SqlWriter,
        root: &SqlRootExpression,
    ) -> StorageResult<()> {
        let column = |name: &str| qualify(Some(RESOURCE_ALIAS), name);
        let has_tables = !root.table_expressions().is_empty();

        if self.context.count_only {
            w.append_line(&format!(
                "SELECT COUNT(DISTINCT {})",
                column(resource::RESOURCE_SURROGATE_ID)
            ));
        } else {
            w.append("SELECT ");
            if !has_tables {
                let top = self.params.add(page_size_plus_one(&self.context));
                w.append(&format!("TOP ({}) ", top));
            }

            let leading = [
                resource::RESOURCE_TYPE_ID,
                resource::RESOURCE_ID,
                resource::VERSION,
                resource::IS_DELETED,
                resource::RESOURCE_SURROGATE_ID,
                resource::REQUEST_METHOD,
            ];
            for name in leading {
                w.append(&column(name)).append(", ");
            }
            w.append(if has_tables {
                "CAST(IsMatch AS bit) AS IsMatch, "
            } else {
                "CAST(1 AS bit) AS IsMatch, "
            });
            w.append(&column(resource::RAW_RESOURCE)).append(", ");
            w.append(&column(resource::IS_RAW_RESOURCE_IN_BLOB_STORE))
                .append(", ");
            w.append_line(&column(resource::LINK_TO_RAW_RESOURCE));
        }

        w.append_line(&format!("FROM {} {}", resource::TABLE, RESOURCE_ALIAS));

        if has_tables {
            let last = cte_name(root.table_expressions().len() - 1);
            w.append_line(&format!("INNER JOIN {}", last));
            w.append_line(&format!(
                "ON {} = {}.Sid1",
                column(resource::RESOURCE_SURROGATE_ID),
                last
            ));
        }

        // With a page already cut, resource-table predicates were applied by
        // the top CTE and must not filter out included resources.
        let mut clauses = Vec::new();
        if self.main_select.is_none() {
            for predicate in root.denormalized_expressions() {
                clauses.push(self.denormalized(predicate, Some(RESOURCE_ALIAS))?);
            }
        }
        if !has_tables {
            self.history_clause(&mut clauses, Some(RESOURCE_ALIAS));
            self.deleted_clause(&mut clauses, Some(RESOURCE_ALIAS));
        }
        w.where_clause(&clauses);

        if !self.context.count_only {
            w.append_line(&format!(
                "ORDER BY {} ASC",
                column(resource::RESOURCE_SURROGATE_ID)
            ));
        }
        w.append("OPTION(RECOMPILE)");
        Ok(())
    }

    fn table_expression(
        &mut self,
        w: &mut SqlWriter,
        root: &SqlRootExpression,
        index: usize,
    ) -> StorageResult<()> {
        let tables = root.table_expressions();
        let table = &tables[index];
        match table.kind() {
            TableExpressionKind::Normal => self.normal(w, tables, index),
            TableExpressionKind::Concatenation => {
                let previous = index
                    .checked_sub(1)
                    .ok_or(QueryError::MissingPredecessor { index })?;
                w.append_line(&format!("SELECT * FROM {}", cte_name(previous)));
                w.append_line("UNION ALL");
                self.normal(w, tables, index)
            }
            TableExpressionKind::All => self.all(w, table),
            TableExpressionKind::NotExists => self.not_exists(w, table, index),
            TableExpressionKind::Top => self.top(w, root.denormalized_expressions(), index),
            TableExpressionKind::Chain => self.chain(w, tables, index),
            TableExpressionKind::Include => self.include(w, table, index),
            TableExpressionKind::IncludeUnionAll => self.include_union_all(w),
        }
    }

    fn normal(
        &mut self,
        w: &mut SqlWriter,
        tables: &[TableExpression],
        index: usize,
    ) -> StorageResult<()> {
        let table = &tables[index];
        let (generator, table_name) = search_param_table(table)?;
        let surrogate_id = search_param::RESOURCE_SURROGATE_ID;

        if table.chain_level() == 0 {
            w.append_line(&format!("SELECT {} AS Sid1", surrogate_id));
            w.append_line(&format!("FROM {}", table_name));
        } else {
            let predecessor = restricting_predecessor(tables, index)?
                .ok_or(QueryError::MissingPredecessor { index })?;
            w.append_line(&format!("SELECT Sid1, {} AS Sid2", surrogate_id));
            w.append_line(&format!("FROM {}", table_name));
            w.append_line(&format!("INNER JOIN {}", cte_name(predecessor)));
            w.on_clause(&[format!("{} = Sid2", surrogate_id)]);
        }

        let mut clauses = Vec::new();
        self.history_clause(&mut clauses, None);
        if table.chain_level() == 0 {
            clauses.extend(intersection_with_predecessor(tables, index, None)?);
        }
        if let Some(predicate) = table.denormalized_predicate() {
            clauses.push(self.denormalized(predicate, None)?);
        }
        if let Some(predicate) = table.normalized_predicate() {
            clauses.push(self.renderer(None).normalized(generator, predicate)?);
        }
        w.where_clause(&clauses);
        Ok(())
    }

    fn all(&mut self, w: &mut SqlWriter, table: &TableExpression) -> StorageResult<()> {
        w.append_line(&format!("SELECT {} AS Sid1", resource::RESOURCE_SURROGATE_ID));
        w.append_line(&format!("FROM {}", resource::TABLE));

        let mut clauses = Vec::new();
        self.history_clause(&mut clauses, None);
        self.deleted_clause(&mut clauses, None);
        if let Some(predicate) = table.denormalized_predicate() {
            clauses.push(self.denormalized(predicate, None)?);
        }
        w.where_clause(&clauses);
        Ok(())
    }

    fn not_exists(
        &mut self,
        w: &mut SqlWriter,
        table: &TableExpression,
        index: usize,
    ) -> StorageResult<()> {
        let previous = index
            .checked_sub(1)
            .ok_or(QueryError::MissingPredecessor { index })?;
        let (generator, table_name) = search_param_table(table)?;

        // Inside a chain the parameter belongs to the resource at the far end
        // of the hop.
        if table.chain_level() == 0 {
            w.append_line(&format!("SELECT Sid1 FROM {}", cte_name(previous)));
            w.append_line("WHERE Sid1 NOT IN").append_line("(");
        } else {
            w.append_line(&format!("SELECT Sid1, Sid2 FROM {}", cte_name(previous)));
            w.append_line("WHERE Sid2 NOT IN").append_line("(");
        }
        w.indented(|w| -> StorageResult<()> {
            w.append_line(&format!("SELECT {}", search_param::RESOURCE_SURROGATE_ID));
            w.append_line(&format!("FROM {}", table_name));

            let mut clauses = Vec::new();
            self.history_clause(&mut clauses, None);
            if let Some(predicate) = table.denormalized_predicate() {
                clauses.push(self.denormalized(predicate, None)?);
            }
            if let Some(predicate) = table.normalized_predicate() {
                clauses.push(self.renderer(None).normalized(generator, predicate)?);
            }
            w.where_clause(&clauses);
            Ok(())
        })?;
        w.append_line(")");
        Ok(())
    }

    /// Cuts the page. Resource-table predicates left on the root, such as the
    /// continuation cursor after a chain, restrict the candidates first.
    fn top(
        &mut self,
        w: &mut SqlWriter,
        denormalized: &[ExprRef],
        index: usize,
    ) -> StorageResult<()> {
        let previous = index
            .checked_sub(1)
            .ok_or(QueryError::MissingPredecessor { index })?;
        let top = self.params.add(page_size_plus_one(&self.context));

        w.append_line(&format!("SELECT DISTINCT TOP ({}) Sid1, 1 AS IsMatch", top));
        w.append_line(&format!("FROM {}", cte_name(previous)));
        if !denormalized.is_empty() {
            w.append_line(&format!("INNER JOIN {} {}", resource::TABLE, RESOURCE_ALIAS));
            w.on_clause(&[format!(
                "{} = Sid1",
                qualify(Some(RESOURCE_ALIAS), resource::RESOURCE_SURROGATE_ID)
            )]);
            let mut clauses = Vec::with_capacity(denormalized.len());
            for predicate in denormalized {
                clauses.push(self.denormalized(predicate, Some(RESOURCE_ALIAS))?);
            }
            w.where_clause(&clauses);
        }
        w.append_line("ORDER BY Sid1 ASC");

        self.main_select = Some(cte_name(index));
        Ok(())
    }

    fn chain(
        &mut self,
        w: &mut SqlWriter,
        tables: &[TableExpression],
        index: usize,
    ) -> StorageResult<()> {
        let table = &tables[index];
        let Some(Expression::Chained {
            reversed,
            source_type,
            reference_parameter,
            target_type,
            ..
        }) = table.normalized_predicate().map(|p| p.as_ref())
        else {
            return Err(unexpected_predicate(table, "chain"));
        };
        let reversed = *reversed;
        let level = table.chain_level();

        let re = |column: &str| qualify(Some(REFERENCE_ALIAS), column);

        let first = if level == 1 {
            format!(
                "{} AS {}",
                re(search_param::RESOURCE_SURROGATE_ID),
                if reversed { "Sid2" } else { "Sid1" }
            )
        } else {
            "Sid1".to_string()
        };
        let second_alias = if reversed && level > 1 {
            REFERENCE_ALIAS
        } else {
            RESOURCE_ALIAS
        };
        let second_name = if reversed && level == 1 { "Sid1" } else { "Sid2" };

        w.append_line(&format!(
            "SELECT {}, {} AS {}",
            first,
            qualify(Some(second_alias), resource::RESOURCE_SURROGATE_ID),
            second_name
        ));
        self.reference_join(w);

        if reversed && let Some(predicate) = table.denormalized_predicate() {
            w.append_line(&format!(
                "INNER JOIN {} {}",
                resource::TABLE,
                REVERSE_CHAIN_RESOURCE_ALIAS
            ));
            let denormalized = self.denormalized(predicate, Some(REVERSE_CHAIN_RESOURCE_ALIAS))?;
            w.on_clause(&[
                format!(
                    "{} = {}",
                    re(search_param::RESOURCE_SURROGATE_ID),
                    qualify(
                        Some(REVERSE_CHAIN_RESOURCE_ALIAS),
                        resource::RESOURCE_SURROGATE_ID
                    )
                ),
                denormalized,
            ]);
        }

        if level > 1 {
            let predecessor = restricting_predecessor(tables, index)?
                .ok_or(QueryError::MissingPredecessor { index })?;
            let joined = if reversed { RESOURCE_ALIAS } else { REFERENCE_ALIAS };
            w.append_line(&format!("INNER JOIN {}", cte_name(predecessor)));
            w.on_clause(&[format!(
                "{} = Sid2",
                qualify(Some(joined), resource::RESOURCE_SURROGATE_ID)
            )]);
        }

        let search_param_id = require_search_param_id(self.model, &reference_parameter.url)?;
        let source_type_id = require_resource_type_id(self.model, source_type)?;
        let target_type_id = require_resource_type_id(self.model, target_type)?;

        let mut clauses = vec![format!(
            "{} = {}",
            re(search_param::SEARCH_PARAM_ID),
            self.params.add(search_param_id)
        )];
        self.history_clause(&mut clauses, Some(RESOURCE_ALIAS));
        self.history_clause(&mut clauses, Some(REFERENCE_ALIAS));
        clauses.push(format!(
            "{} = {}",
            re(search_param::RESOURCE_TYPE_ID),
            self.params.add(source_type_id)
        ));
        clauses.push(format!(
            "{} = {}",
            re(reference::REFERENCE_RESOURCE_TYPE_ID),
            self.params.add(target_type_id)
        ));
        if level == 1 {
            let alias = if reversed { RESOURCE_ALIAS } else { REFERENCE_ALIAS };
            clauses.extend(intersection_with_predecessor(tables, index, Some(alias))?);
        }
        if !reversed && let Some(predicate) = table.denormalized_predicate() {
            clauses.push(self.denormalized(predicate, Some(RESOURCE_ALIAS))?);
        }
        w.where_clause(&clauses);
        Ok(())
    }

    fn include(
        &mut self,
        w: &mut SqlWriter,
        table: &TableExpression,
        index: usize,
    ) -> StorageResult<()> {
        let Some(Expression::Include {
            wildcard,
            reversed,
            resource_type,
            reference_parameter,
            target_type,
        }) = table.normalized_predicate().map(|p| p.as_ref())
        else {
            return Err(unexpected_predicate(table, "include"));
        };
        let main_select = self
            .main_select
            .clone()
            .ok_or(QueryError::MissingMainSelect)?;

        // The matched side restricts to the page; the other side is returned.
        let (included, matched) = if *reversed {
            (REFERENCE_ALIAS, RESOURCE_ALIAS)
        } else {
            (RESOURCE_ALIAS, REFERENCE_ALIAS)
        };
        let re = |column: &str| qualify(Some(REFERENCE_ALIAS), column);

        w.append_line(&format!(
            "SELECT DISTINCT {} AS Sid1, 0 AS IsMatch",
            qualify(Some(included), resource::RESOURCE_SURROGATE_ID)
        ));
        self.reference_join(w);

        let mut clauses = Vec::new();
        if !*wildcard {
            let parameter = reference_parameter
                .as_ref()
                .ok_or_else(|| unexpected_predicate(table, "include"))?;
            let id = require_search_param_id(self.model, &parameter.url)?;
            clauses.push(format!(
                "{} = {}",
                re(search_param::SEARCH_PARAM_ID),
                self.params.add(id)
            ));
            if let Some(target_type) = target_type {
                let id = require_resource_type_id(self.model, target_type)?;
                clauses.push(format!(
                    "{} = {}",
                    re(reference::REFERENCE_RESOURCE_TYPE_ID),
                    self.params.add(id)
                ));
            }
        }
        self.history_clause(&mut clauses, Some(RESOURCE_ALIAS));
        self.history_clause(&mut clauses, Some(REFERENCE_ALIAS));

        let source_type_id = require_resource_type_id(self.model, resource_type)?;
        clauses.push(format!(
            "{} = {}",
            re(search_param::RESOURCE_TYPE_ID),
            self.params.add(source_type_id)
        ));

        // The main select holds one row more than the page.
        let page = self.params.add(page_size(&self.context));
        clauses.push(format!(
            "{} IN (SELECT TOP({}) Sid1 FROM {} ORDER BY Sid1 ASC)",
            qualify(Some(matched), resource::RESOURCE_SURROGATE_ID),
            page,
            main_select
        ));
        w.where_clause(&clauses);

        self.include_ctes.push(cte_name(index));
        Ok(())
    }

    fn include_union_all(&mut self, w: &mut SqlWriter) -> StorageResult<()> {
        let main_select = self
            .main_select
            .as_deref()
            .ok_or(QueryError::MissingMainSelect)?;

        w.append_line("SELECT Sid1, IsMatch");
        w.append_line(&format!("FROM {}", main_select));
        for include in &self.include_ctes {
            w.append_line("UNION ALL");
            w.append_line("SELECT Sid1, IsMatch");
            w.append_line(&format!("FROM {}", include));
        }
        Ok(())
    }

    /// `FROM ref INNER JOIN r ON <reference target>`.
    fn reference_join(&self, w: &mut SqlWriter) {
        let r = |column: &str| qualify(Some(RESOURCE_ALIAS), column);
        let re = |column: &str| qualify(Some(REFERENCE_ALIAS), column);

        w.append_line(&format!(
            "FROM {} {}",
            SearchParamTable::Reference.name(),
            REFERENCE_ALIAS
        ));
        w.append_line(&format!("INNER JOIN {} {}", resource::TABLE, RESOURCE_ALIAS));
        w.on_clause(&[
            format!(
                "{} = {}",
                re(reference::REFERENCE_RESOURCE_TYPE_ID),
                r(resource::RESOURCE_TYPE_ID)
            ),
            format!(
                "{} = {}",
                re(reference::REFERENCE_RESOURCE_ID),
                r(resource::RESOURCE_ID)
            ),
        ]);
    }

    fn renderer<'r>(&'r mut self, alias: Option<&'r str>) -> PredicateRenderer<'r> {
        PredicateRenderer::new(&mut self.params, self.model, alias)
    }

    fn denormalized(&mut self, predicate: &ExprRef, alias: Option<&str>) -> StorageResult<String> {
        self.renderer(alias).denormalized(predicate)
    }

    fn history_clause(&self, clauses: &mut Vec<String>, alias: Option<&str>) {
        if !self.is_history_search {
            clauses.push(format!("{} = 0", qualify(alias, resource::IS_HISTORY)));
        }
    }

    fn deleted_clause(&self, clauses: &mut Vec<String>, alias: Option<&str>) {
        if !self.is_history_search {
            clauses.push(format!("{} = 0", qualify(alias, resource::IS_DELETED)));
        }
    }
}

fn cte_name(index: usize) -> String {
    format!("cte{}", index)
}

fn page_size(context: &RewriteContext) -> i64 {
    i64::try_from(context.max_item_count).unwrap_or(i64::MAX)
}

fn page_size_plus_one(context: &RewriteContext) -> i64 {
    page_size(context).saturating_add(1)
}

fn search_param_table(
    table: &TableExpression,
) -> QueryResult<(super::generators::QueryGenerator, &'static str)> {
    table
        .query_generator()
        .and_then(|g| g.table().map(|t| (g, t.name())))
        .ok_or_else(|| QueryError::UnexpectedTableExpressionKind {
            kind: table.kind(),
            context: "table expression without a search parameter table",
        })
}

fn unexpected_predicate(
    table: &TableExpression,
    context: &'static str,
) -> crate::error::StorageError {
    QueryError::UnsupportedExpression {
        pass: context,
        expression: table.to_string(),
    }
    .into()
}

/// Index of the table expression that restricts the one at `index`.
///
/// A concatenation unions its predecessor with an alternative, so it is
/// restricted by whatever restricts that predecessor.
fn restricting_predecessor(
    tables: &[TableExpression],
    index: usize,
) -> QueryResult<Option<usize>> {
    let mut current = index;
    loop {
        match tables[current].kind() {
            TableExpressionKind::Normal
            | TableExpressionKind::NotExists
            | TableExpressionKind::Chain => return Ok(current.checked_sub(1)),
            TableExpressionKind::Concatenation => {
                current = current
                    .checked_sub(1)
                    .ok_or(QueryError::MissingPredecessor { index })?;
            }
            kind => {
                return Err(QueryError::UnexpectedTableExpressionKind {
                    kind,
                    context: "restricting predecessor",
                });
            }
        }
    }
}

/// `<alias.>ResourceSurrogateId IN (SELECT Sid1|Sid2 FROM <predecessor>)`, if
/// the table expression at `index` has a predecessor.
fn intersection_with_predecessor(
    tables: &[TableExpression],
    index: usize,
    alias: Option<&str>,
) -> QueryResult<Option<String>> {
    let table = &tables[index];
    let Some(predecessor) = restricting_predecessor(tables, index)? else {
        return Ok(None);
    };

    let level = match table.kind() {
        TableExpressionKind::Chain => table.chain_level().saturating_sub(1),
        _ => table.chain_level(),
    };
    let column = if level == 0 { "Sid1" } else { "Sid2" };

    Ok(Some(format!(
        "{} IN (SELECT {} FROM {})",
        qualify(alias, resource::RESOURCE_SURROGATE_ID),
        column,
        cte_name(predecessor)
    )))
}
