//! SQL 语句键值对抽取
//!
//! 把一条 SQL 语句解析为语法树，递归收集其中“列 与 字面量”之间的关系。
//! 函数调用、裸字面量和裸列引用不产生任何键值对。

use super::pairs::KVPairs;
use sqlparser::ast::{
    AssignmentTarget, BinaryOperator, Delete, Expr, Insert, Query, SetExpr,
    Statement, Value,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::{Parser, ParserError};

/// 语句抽取错误
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("sql parse error: {0}")]
    Sql(#[from] ParserError),
    #[error("invalid row length: expected {expected}, found {found}")]
    RowLength { expected: usize, found: usize },
    #[error("invalid row type")]
    UnsupportedRows,
}

const STATEMENT_PREFIX: &str = "statement:";
const SUPPORTED_VERBS: [&str; 4] = ["select", "update", "delete", "insert"];

/// 从 `statement: ...` 形式的日志消息中取出 SQL
///
/// 只接受 SELECT / UPDATE / DELETE / INSERT。
pub fn statement_from_message(message: &str) -> Option<&str> {
    let sql = message.trim().strip_prefix(STATEMENT_PREFIX)?.trim();
    let verb = sql.get(..6)?;
    SUPPORTED_VERBS
        .iter()
        .any(|v| verb.eq_ignore_ascii_case(v))
        .then_some(sql)
}

/// 解析 SQL 并抽取全部键值对
pub fn extract(sql: &str) -> Result<KVPairs, ExtractError> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)?;
    let mut out = KVPairs::new();
    for statement in &statements {
        out.merge(extract_statement(statement)?);
    }
    Ok(out)
}

fn extract_statement(statement: &Statement) -> Result<KVPairs, ExtractError> {
    let mut out = KVPairs::new();
    match statement {
        Statement::Query(query) => walk_query(query, &mut out),
        Statement::Update { assignments, selection, .. } => {
            for assignment in assignments {
                let column = match &assignment.target {
                    AssignmentTarget::ColumnName(name) => {
                        name.0.last().map(|ident| ident.value.as_str())
                    }
                    AssignmentTarget::Tuple(_) => None,
                };
                out.add(column, literal(&assignment.value));
                walk_expr(&assignment.value, &mut out);
            }
            if let Some(selection) = selection {
                walk_expr(selection, &mut out);
            }
        }
        Statement::Delete(Delete { selection, .. }) => {
            if let Some(selection) = selection {
                walk_expr(selection, &mut out);
            }
        }
        Statement::Insert(insert) => extract_insert(insert, &mut out)?,
        other => {
            tracing::trace!(statement = %other, "语句类型不参与抽取");
        }
    }
    Ok(out)
}

fn extract_insert(
    insert: &Insert,
    out: &mut KVPairs,
) -> Result<(), ExtractError> {
    let Some(source) = &insert.source else {
        return Ok(());
    };
    if insert.columns.is_empty() {
        return Ok(());
    }

    let SetExpr::Values(values) = source.body.as_ref() else {
        return Err(ExtractError::UnsupportedRows);
    };

    for row in &values.rows {
        if row.len() != insert.columns.len() {
            return Err(ExtractError::RowLength {
                expected: insert.columns.len(),
                found: row.len(),
            });
        }
        for (column, expr) in insert.columns.iter().zip(row) {
            out.add(Some(column.value.as_str()), literal(expr));
        }
    }
    Ok(())
}

fn walk_query(query: &Query, out: &mut KVPairs) {
    walk_set_expr(&query.body, out);
}

fn walk_set_expr(body: &SetExpr, out: &mut KVPairs) {
    match body {
        SetExpr::Select(select) => {
            if let Some(selection) = &select.selection {
                walk_expr(selection, out);
            }
            if let Some(having) = &select.having {
                walk_expr(having, out);
            }
        }
        SetExpr::Query(query) => walk_query(query, out),
        SetExpr::SetOperation { left, right, .. } => {
            walk_set_expr(left, out);
            walk_set_expr(right, out);
        }
        _ => {}
    }
}

fn walk_expr(expr: &Expr, out: &mut KVPairs) {
    match expr {
        Expr::BinaryOp { left, op, right } => {
            if is_comparison(op) {
                add_comparison(left, right, out);
            }
            walk_expr(left, out);
            walk_expr(right, out);
        }
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::SimilarTo { expr, pattern, .. } => {
            add_comparison(expr, pattern, out);
            walk_expr(expr, out);
            walk_expr(pattern, out);
        }
        Expr::Between { expr, low, high, .. } => {
            let column = column_name(expr);
            out.add(column, literal(low));
            out.add(column, literal(high));
            walk_expr(low, out);
            walk_expr(high, out);
        }
        Expr::InList { expr, list, .. } => {
            let column = column_name(expr);
            for item in list {
                out.add(column, literal(item));
                walk_expr(item, out);
            }
        }
        Expr::InSubquery { expr, subquery, .. } => {
            walk_expr(expr, out);
            walk_query(subquery, out);
        }
        Expr::Exists { subquery, .. } | Expr::Subquery(subquery) => {
            walk_query(subquery, out)
        }
        Expr::Nested(inner)
        | Expr::UnaryOp { expr: inner, .. }
        | Expr::IsNull(inner)
        | Expr::IsNotNull(inner)
        | Expr::IsTrue(inner)
        | Expr::IsNotTrue(inner)
        | Expr::IsFalse(inner)
        | Expr::IsNotFalse(inner)
        | Expr::Cast { expr: inner, .. }
        | Expr::Collate { expr: inner, .. } => walk_expr(inner, out),
        Expr::Case { operand, conditions, results, else_result, .. } => {
            for inner in operand.iter().chain(else_result.iter()) {
                walk_expr(inner, out);
            }
            for inner in conditions.iter().chain(results.iter()) {
                walk_expr(inner, out);
            }
        }
        Expr::Tuple(items) => {
            for item in items {
                walk_expr(item, out);
            }
        }
        _ => {}
    }
}

fn add_comparison(left: &Expr, right: &Expr, out: &mut KVPairs) {
    if let (Some(column), Some(value)) = (column_name(left), literal(right)) {
        out.add(Some(column), Some(value));
    } else if let (Some(column), Some(value)) =
        (column_name(right), literal(left))
    {
        out.add(Some(column), Some(value));
    }
}

fn is_comparison(op: &BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
            | BinaryOperator::Spaceship
    )
}

fn column_name(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.as_str()),
        Expr::CompoundIdentifier(idents) => {
            idents.last().map(|ident| ident.value.as_str())
        }
        _ => None,
    }
}

fn literal(expr: &Expr) -> Option<&str> {
    let Expr::Value(value) = expr else {
        return None;
    };
    match value {
        Value::Number(n, _) => Some(n.as_str()),
        Value::SingleQuotedString(s)
        | Value::EscapedStringLiteral(s)
        | Value::NationalStringLiteral(s)
        | Value::HexStringLiteral(s) => Some(s.as_str()),
        Value::DollarQuotedString(d) => Some(d.value.as_str()),
        _ => None,
    }
}
