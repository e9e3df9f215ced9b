//! Binding resolution and dispatch of a statement to a [`Connection`].

use tracing::debug;

use crate::argument::ArgumentContext;
use crate::error::{Result, SqlBindError};
use crate::statement::{OutParameters, ParamKey, SqlStatements, StatementContext};
use crate::traits::Connection;
use crate::types::{RawQueryResult, SqlValue};

/// What an execution should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Query,
    Update,
    Call,
}

/// The raw outcome of one execution.
#[derive(Debug)]
pub enum ExecutionResult {
    Rows(RawQueryResult),
    UpdateCount(u64),
    OutParameters(OutParameters),
}

/// A statement ready to send: rewritten SQL and converted parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSql {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub parameters: Vec<ParamKey>,
}

/// Converts every bound value through the argument chain.
///
/// Runs immediately before execution, so config changes made on the
/// statement after binding still apply.
pub fn prepare(ctx: &StatementContext) -> Result<PreparedSql> {
    let parsed = ctx
        .config()
        .get::<SqlStatements>()
        .parser()
        .parse(ctx.template())?;

    let params = parsed
        .parameters
        .iter()
        .map(|key| {
            if ctx.is_out_parameter(key) && ctx.binding(key).is_none() {
                return Ok(SqlValue::Null);
            }
            let binding = ctx.binding(key).ok_or_else(|| {
                SqlBindError::statement(ctx.template(), key, "no value bound for parameter")
            })?;
            ArgumentContext::new(ctx.config(), ctx.template(), key)
                .convert(binding.value.as_ref(), &binding.qualifiers)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PreparedSql {
        sql: parsed.sql,
        params,
        parameters: parsed.parameters,
    })
}

/// Prepares and runs the statement against `connection`.
pub async fn execute(
    connection: &mut dyn Connection,
    ctx: &StatementContext,
    mode: ExecutionMode,
) -> Result<ExecutionResult> {
    let prepared = prepare(ctx)?;
    debug!(
        sql = %prepared.sql,
        params = prepared.params.len(),
        mode = ?mode,
        "executing statement"
    );

    match mode {
        ExecutionMode::Query => connection
            .query(&prepared.sql, &prepared.params)
            .await
            .map(ExecutionResult::Rows),
        ExecutionMode::Update => connection
            .execute(&prepared.sql, &prepared.params)
            .await
            .map(ExecutionResult::UpdateCount),
        ExecutionMode::Call => {
            let raw = connection.call(&prepared.sql, &prepared.params).await?;
            Ok(ExecutionResult::OutParameters(collect_out_parameters(
                ctx, &prepared, raw,
            )))
        }
    }
}

/// OUT values arrive as the first row, in registration order.
fn collect_out_parameters(
    ctx: &StatementContext,
    prepared: &PreparedSql,
    raw: RawQueryResult,
) -> OutParameters {
    let mut values = raw.rows.into_iter().next().unwrap_or_default().into_iter();
    let mut out = OutParameters::new();
    for (key, sql_type) in ctx.out_parameters() {
        let ordinal = prepared
            .parameters
            .iter()
            .position(|p| p == key)
            .map(|i| i + 1);
        out.push(
            key.clone(),
            ordinal,
            *sql_type,
            values.next().unwrap_or(SqlValue::Null),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::{Arguments, TypedArgumentFactory};
    use crate::config::ConfigRegistry;
    use crate::error::ErrorKind;
    use crate::types::{Qualifier, QualifierSet, SqlType};
    use std::sync::Arc;

    #[test]
    fn test_prepare_orders_named_parameters() {
        let mut ctx = StatementContext::new("SELECT :b, :a", ConfigRegistry::new());
        ctx.bind("a", Arc::new(1i32)).bind("b", Arc::new("x".to_string()));

        let prepared = prepare(&ctx).unwrap();
        assert_eq!(prepared.sql, "SELECT $1, $2");
        assert_eq!(
            prepared.params,
            vec![SqlValue::Text("x".to_string()), SqlValue::Int32(1)]
        );
    }

    #[test]
    fn test_missing_binding_names_parameter() {
        let ctx = StatementContext::new("SELECT :missing", ConfigRegistry::new());
        let err = prepare(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatementConstruction);
        assert!(err.to_string().contains(":missing"));
    }

    #[test]
    fn test_factory_registered_after_bind_still_applies() {
        let mut ctx = StatementContext::new("SELECT :name", ConfigRegistry::new());
        ctx.bind_qualified(
            "name",
            Arc::new("what".to_string()),
            QualifierSet::new().with(Qualifier::tag("reversed")),
        );
        ctx.configure::<Arguments>(|a| {
            a.register(Arc::new(
                TypedArgumentFactory::new(|s: &String| SqlValue::Text(s.chars().rev().collect()))
                    .qualified(Qualifier::tag("reversed")),
            ));
        });

        assert_eq!(
            prepare(&ctx).unwrap().params,
            vec![SqlValue::Text("tahw".to_string())]
        );
    }

    #[test]
    fn test_unbound_out_parameter_is_null() {
        let mut ctx = StatementContext::new("? = CALL f(?)", ConfigRegistry::new());
        ctx.register_out_parameter(1usize, SqlType::Float8)
            .bind(2usize, Arc::new(100.0f64));

        assert_eq!(
            prepare(&ctx).unwrap().params,
            vec![SqlValue::Null, SqlValue::Float64(100.0)]
        );
    }
}
