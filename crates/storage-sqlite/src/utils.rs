//! Row-mapping helpers shared by the repositories.

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::Row;
use rust_decimal::Decimal;

/// Read a TEXT column back into a `Decimal`.
pub(crate) fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
