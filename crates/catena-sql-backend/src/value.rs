use catena_sql_parser::Literal;
use rusqlite::types::ValueRef;
use rusqlite::Row;

pub fn literal_from_row(row: &Row, idx: usize) -> rusqlite::Result<Literal> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Literal::Null,
        ValueRef::Integer(i) if i < 0 => Literal::Integer(i),
        ValueRef::Integer(i) => Literal::Unsigned(i as u64),
        ValueRef::Real(f) => Literal::Text(f.to_string()),
        ValueRef::Text(t) => Literal::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Literal::Blob(b.to_vec()),
    })
}

/// SQLite has no boolean type; truthiness mirrors its own `CASE WHEN`
/// convention (zero/empty/NULL is false).
pub fn truthy(lit: &Literal) -> bool {
    match lit {
        Literal::Integer(i) => *i != 0,
        Literal::Unsigned(u) => *u != 0,
        Literal::Text(s) => !s.is_empty(),
        Literal::Blob(b) => !b.is_empty(),
        Literal::Null => false,
    }
}
