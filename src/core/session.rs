//! PD-006: Database session manager.
//!
//! Owns the run's single SQLite connection. Opening a new data source drops
//! the previous connection first, so at most one is ever live. Variables are
//! exposed to SQL through a registered `getvariable(name)` scalar function
//! backed by a table shared with the connection, and are rebound whenever the
//! session reopens. Settings are applied as PRAGMA statements; keys absent
//! from the engine's pragma catalog are skipped so documents written against
//! a newer engine still process.

use super::error::{Error, Result};
use super::types::{yaml_value_to_string, SourceLocation, Variables};
use indexmap::IndexMap;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Connection string for the lazy default session.
pub const DEFAULT_DATA_SOURCE: &str = ":memory:";

type VariableTable = Arc<Mutex<HashMap<String, String>>>;

pub struct Session {
    connection: Option<Connection>,
    bound: VariableTable,
}

impl Session {
    pub fn new() -> Self {
        Self {
            connection: None,
            bound: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Open (or reopen) the session on `data_source`, validate it, and rebind
    /// every current variable.
    pub fn open(
        &mut self,
        data_source: &str,
        variables: &Variables,
        location: &SourceLocation,
    ) -> Result<()> {
        // Dispose the previous connection before its replacement exists.
        self.connection = None;

        let connect = || -> rusqlite::Result<Connection> {
            let connection = if data_source.is_empty() || data_source == DEFAULT_DATA_SOURCE {
                Connection::open_in_memory()?
            } else {
                Connection::open(data_source)?
            };
            connection.query_row("SELECT 1", [], |_row| Ok(()))?;

            let bound = Arc::clone(&self.bound);
            connection.create_scalar_function(
                "getvariable",
                1,
                FunctionFlags::SQLITE_UTF8,
                move |context| {
                    let name: String = context.get(0)?;
                    Ok(lock_table(&bound).get(&name).cloned())
                },
            )?;
            Ok(connection)
        };

        let connection = connect().map_err(|e| Error::Connection {
            location: location.clone(),
            source: e,
        })?;

        let mut table = lock_table(&self.bound);
        table.clear();
        for (name, value) in variables {
            table.insert(name.clone(), value.clone());
        }
        drop(table);

        self.connection = Some(connection);
        Ok(())
    }

    /// Open the in-memory default if nothing is open yet.
    pub fn ensure_open(&mut self, variables: &Variables, location: &SourceLocation) -> Result<()> {
        if self.connection.is_none() {
            self.open(DEFAULT_DATA_SOURCE, variables, location)?;
        }
        Ok(())
    }

    /// Lazily open, then hand out the live connection.
    pub fn open_connection(
        &mut self,
        variables: &Variables,
        location: &SourceLocation,
    ) -> Result<&Connection> {
        self.ensure_open(variables, location)?;
        Ok(self
            .connection
            .as_ref()
            .expect("session is open after ensure_open"))
    }

    /// Make one variable visible to `getvariable` on the live session.
    pub fn bind_variable(&self, name: &str, value: &str) {
        lock_table(&self.bound).insert(name.to_string(), value.to_string());
    }

    /// Apply settings in document order. Unrecognized keys are skipped.
    pub fn apply_settings(
        &mut self,
        settings: &IndexMap<String, serde_yaml_ng::Value>,
        variables: &Variables,
        location: &SourceLocation,
    ) -> Result<()> {
        let connection = self.open_connection(variables, location)?;
        let recognized = recognized_settings(connection).map_err(|e| Error::Connection {
            location: location.clone(),
            source: e,
        })?;

        for (key, value) in settings {
            if !recognized.contains(&key.to_ascii_lowercase()) {
                continue;
            }
            // The engine has no prepared-statement path for settings, so the
            // value is embedded as a quoted literal.
            let statement = format!(
                "PRAGMA {} = {}",
                quote_identifier(key),
                quote_literal(&yaml_value_to_string(value))
            );
            apply_setting(connection, &statement).map_err(|e| Error::Connection {
                location: location.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_table(table: &Mutex<HashMap<String, String>>) -> MutexGuard<'_, HashMap<String, String>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run one setting statement. Some PRAGMA assignments report the new value
/// as a row; drain it rather than treating it as an error.
fn apply_setting(connection: &Connection, sql: &str) -> rusqlite::Result<()> {
    let mut statement = connection.prepare(sql)?;
    if statement.column_count() == 0 {
        statement.execute([])?;
    } else {
        let mut rows = statement.query([])?;
        while rows.next()?.is_some() {}
    }
    Ok(())
}

/// The engine's recognized-setting catalog, lowercase.
fn recognized_settings(connection: &Connection) -> rusqlite::Result<HashSet<String>> {
    let mut statement = connection.prepare("PRAGMA pragma_list")?;
    let names = statement.query_map([], |row| row.get::<_, String>(0))?;
    names
        .map(|name| name.map(|n| n.to_ascii_lowercase()))
        .collect()
}

/// Quote an identifier; embedded double quotes are doubled.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal; embedded single quotes are doubled.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
