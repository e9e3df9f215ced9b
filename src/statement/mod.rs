mod context;
mod engine;
mod locator;
mod out_params;
mod query;
mod result;
mod template;

pub use context::{Binding, ParamKey, StatementContext};
pub use engine::{execute, prepare, ExecutionMode, ExecutionResult, PreparedSql};
pub use locator::{InlineSqlLocator, MapSqlLocator, SqlLocator, SqlStatements};
pub use out_params::OutParameters;
pub use query::{Call, Query, ResultIterable, SqlStatement, Update};
pub use result::ResultIter;
pub(crate) use result::{at_most_one, exactly_one};
pub use template::{ColonPrefixParser, ParsedSql, TemplateParser};
