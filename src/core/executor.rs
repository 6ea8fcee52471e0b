//! PD-007: Query executor.
//!
//! Runs the statements of one SQL source in order against the live session
//! through a forward-only cursor: statement N+1 is not prepared until
//! statement N's rows have been fully drained, because earlier statements may
//! create tables or otherwise affect later ones. Result sets are realized
//! eagerly since the connection is reused immediately afterwards.

use super::error::{Error, Result};
use super::session::Session;
use super::types::{QueryResultSet, SourceLocation, Variables};
use rusqlite::types::ValueRef;
use rusqlite::Batch;

/// Execute every statement in `sql`, returning the result sets of the
/// row-producing ones in statement order. Opens the default session lazily.
pub fn execute(
    session: &mut Session,
    variables: &Variables,
    sql: &str,
    origin: &SourceLocation,
) -> Result<Vec<QueryResultSet>> {
    let connection = session.open_connection(variables, origin)?;
    let mut result_sets = Vec::new();
    let mut batch = Batch::new(connection, sql);

    loop {
        let mut statement = match batch.next() {
            Ok(Some(statement)) => statement,
            Ok(None) => break,
            Err(e) => return Err(located(origin, e)),
        };

        if statement.column_count() == 0 {
            // DDL/DML: execute for its side effect, no result set.
            statement.execute([]).map_err(|e| located(origin, e))?;
            continue;
        }

        let columns: Vec<String> = statement
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let mut rows = Vec::new();
        let mut cursor = statement.query([]).map_err(|e| located(origin, e))?;
        while let Some(row) = cursor.next().map_err(|e| located(origin, e))? {
            let mut record = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                let value = row.get_ref(index).map_err(|e| located(origin, e))?;
                record.push(value_to_string(value));
            }
            rows.push(record);
        }

        result_sets.push(QueryResultSet { columns, rows });
    }

    Ok(result_sets)
}

fn located(origin: &SourceLocation, source: rusqlite::Error) -> Error {
    Error::QueryExecution {
        location: origin.clone(),
        source,
    }
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(r) => r.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
