//! Conversion of result columns and rows back into native values.

mod column;
mod row;

pub use column::{
    ColumnMapper, ColumnMapperFactory, ColumnMappers, FromSqlValue, TypedColumnMapperFactory,
};
pub use row::{
    FromRow, FromRowMapperFactory, MapperCache, RowMapper, RowMapperFactory, RowMappers,
    RowView, SingleColumnRowMapperFactory,
};
