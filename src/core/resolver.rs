//! PD-005: Variable expansion.
//!
//! Replaces `${name}` tokens in configuration scalars from the run's variable
//! map. Flat string-level replacement only: no nesting, no escapes, no
//! defaults inside the token. An unresolved name is fatal and reported at the
//! configuration's location.

use super::error::{Error, Result};
use super::types::{Configuration, SourceLocation, Variables};
use indexmap::IndexMap;

/// Expand all `${name}` tokens in one string.
pub fn expand(template: &str, variables: &Variables, location: &SourceLocation) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("${") {
        let open = start + open;
        let close = match result[open..].find('}') {
            Some(offset) => open + offset,
            None => {
                // Unclosed token: report only the leading word, not the rest
                // of a possibly multi-line scalar.
                let name = result[open + 2..]
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                return Err(Error::Expansion {
                    location: location.clone(),
                    name,
                });
            }
        };
        let name = result[open + 2..close].trim().to_string();
        let value = variables.get(&name).ok_or_else(|| Error::Expansion {
            location: location.clone(),
            name: name.clone(),
        })?;
        result.replace_range(open..close + 1, value);
        start = open + value.len();
    }

    Ok(result)
}

/// Expand every string scalar of a configuration.
pub fn expand_configuration(
    config: &Configuration,
    variables: &Variables,
) -> Result<Configuration> {
    let location = &config.location;
    let mut expanded = config.clone();

    expanded.include = expand_option(&config.include, variables, location)?;
    expanded.data_source = expand_option(&config.data_source, variables, location)?;
    expanded.query = expand_option(&config.query, variables, location)?;
    expanded.query_file = expand_option(&config.query_file, variables, location)?;
    expanded.output = expand_option(&config.output, variables, location)?;
    expanded.template = expand_option(&config.template, variables, location)?;

    for parameter in &mut expanded.parameters {
        if let Some(ref name) = parameter.name {
            let name = expand(name, variables, location)?;
            parameter.name = Some(name);
        }
        if let Some(serde_yaml_ng::Value::String(ref default)) = parameter.default {
            let default = expand(default, variables, location)?;
            parameter.default = Some(serde_yaml_ng::Value::String(default));
        }
    }

    let mut db_config = IndexMap::new();
    for (key, value) in &config.db_config {
        let key = expand(key, variables, location)?;
        let value = match value {
            serde_yaml_ng::Value::String(s) => {
                serde_yaml_ng::Value::String(expand(s, variables, location)?)
            }
            other => other.clone(),
        };
        db_config.insert(key, value);
    }
    expanded.db_config = db_config;

    Ok(expanded)
}

fn expand_option(
    field: &Option<String>,
    variables: &Variables,
    location: &SourceLocation,
) -> Result<Option<String>> {
    field
        .as_deref()
        .map(|value| expand(value, variables, location))
        .transpose()
}
