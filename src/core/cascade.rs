//! PD-008: Configuration cascade.
//!
//! Applies one configuration's directives in fixed order against the shared
//! run state: include, parameters, data_source/db_config, query_file, query.
//! Application mutates the variable map and session in place; successive
//! configurations cascade rather than merging declaratively, so document
//! order is meaning-bearing.

use super::error::{Error, Result};
use super::executor;
use super::resolver;
use super::types::{yaml_value_to_string, Block, Configuration, SourceLocation};
use super::walker::{self, RunContext};

/// Expand and apply a configuration to `block`. Returns the expanded form
/// (to attach as the block's `plotter_config`) and any blocks contributed by
/// Markdown includes.
pub fn apply(
    ctx: &mut RunContext,
    block: &mut Block,
    raw: &Configuration,
) -> Result<(Configuration, Vec<Block>)> {
    let config = resolver::expand_configuration(raw, &ctx.variables)?;
    let included = apply_expanded(ctx, block, &config)?;
    Ok((config, included))
}

/// Apply an already-expanded configuration.
pub fn apply_expanded(
    ctx: &mut RunContext,
    block: &mut Block,
    config: &Configuration,
) -> Result<Vec<Block>> {
    // The first configuration of the whole run is the authoritative carrier
    // of the global output/template directives.
    if ctx.top_config.is_none() {
        ctx.top_config = Some(config.clone());
    }

    let mut included = Vec::new();
    if let Some(ref path) = config.include {
        included = walker::resolve_include(ctx, block, path, &config.location)?;
    }

    for parameter in &config.parameters {
        let name = parameter.name.as_deref().ok_or_else(|| Error::MissingField {
            location: config.location.clone(),
            field: "parameters.name",
        })?;
        if ctx.variables.contains_key(name) {
            continue; // first writer wins
        }
        if let Some(ref default) = parameter.default {
            let value = yaml_value_to_string(default);
            ctx.variables.insert(name.to_string(), value.clone());
            if ctx.session.is_open() {
                ctx.session.bind_variable(name, &value);
            }
        }
    }

    if let Some(ref data_source) = config.data_source {
        let target = resolve_data_source(ctx, data_source);
        ctx.session
            .open(&target, &ctx.variables, &config.location)?;
    } else if !config.db_config.is_empty() {
        ctx.session
            .apply_settings(&config.db_config, &ctx.variables, &config.location)?;
    }

    if let Some(ref query_file) = config.query_file {
        let resolved = ctx.resolve_path(query_file);
        let sql = std::fs::read_to_string(&resolved).map_err(|e| Error::FileAccess {
            location: config.location.clone(),
            source: e,
        })?;
        let origin = SourceLocation::file(ctx.display_path(&resolved));
        for result_set in executor::execute(&mut ctx.session, &ctx.variables, &sql, &origin)? {
            block.push_query_result(result_set);
        }
    }

    if let Some(ref query) = config.query {
        for result_set in
            executor::execute(&mut ctx.session, &ctx.variables, query, &config.location)?
        {
            block.push_query_result(result_set);
        }
    }

    Ok(included)
}

/// Resolve a file-backed data source against the logical working directory.
/// In-memory sources have no path to resolve.
fn resolve_data_source(ctx: &RunContext, data_source: &str) -> String {
    if data_source.is_empty() || data_source == super::session::DEFAULT_DATA_SOURCE {
        data_source.to_string()
    } else {
        ctx.resolve_path(data_source).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BlockKind, Parameter, Variables};
    use std::path::Path;

    fn context() -> RunContext {
        RunContext::new(Path::new("."), Variables::new())
    }

    fn block() -> Block {
        Block::new(
            BlockKind::Code {
                language: "plot".to_string(),
            },
            String::new(),
            SourceLocation::new("a.md", 1),
        )
    }

    fn parse(yaml: &str) -> Configuration {
        crate::core::parser::parse_configuration(yaml, SourceLocation::new("a.md", 1)).unwrap()
    }

    #[test]
    fn test_pd008_caller_binding_is_never_overwritten() {
        let mut ctx = context();
        ctx.variables.insert("x".to_string(), "caller".to_string());
        let config = parse("parameters:\n  - name: x\n    default: later\n");
        apply(&mut ctx, &mut block(), &config).unwrap();
        assert_eq!(ctx.variables["x"], "caller");
    }

    #[test]
    fn test_pd008_first_default_wins_across_configs() {
        let mut ctx = context();
        let first = parse("parameters:\n  - name: x\n    default: one\n");
        let second = parse("parameters:\n  - name: x\n    default: two\n");
        apply(&mut ctx, &mut block(), &first).unwrap();
        apply(&mut ctx, &mut block(), &second).unwrap();
        assert_eq!(ctx.variables["x"], "one");
    }

    #[test]
    fn test_pd008_parameter_without_default_binds_nothing() {
        let mut ctx = context();
        let config = parse("parameters:\n  - name: x\n");
        apply(&mut ctx, &mut block(), &config).unwrap();
        assert!(!ctx.variables.contains_key("x"));
    }

    #[test]
    fn test_pd008_parameter_without_name_is_missing_field() {
        let mut ctx = context();
        let config = Configuration {
            parameters: vec![Parameter {
                name: None,
                default: Some(serde_yaml_ng::Value::String("v".to_string())),
            }],
            location: SourceLocation::new("a.md", 2),
            ..Configuration::default()
        };
        let err = apply(&mut ctx, &mut block(), &config).unwrap_err();
        match err {
            Error::MissingField { location, field } => {
                assert_eq!(field, "parameters.name");
                assert_eq!(location.line, Some(2));
            }
            other => panic!("expected MissingField error, got {:?}", other),
        }
    }

    #[test]
    fn test_pd008_parameter_binds_into_open_session() {
        let mut ctx = context();
        // Force the session open before the parameter is declared.
        let warmup = parse("query: SELECT 1\n");
        apply(&mut ctx, &mut block(), &warmup).unwrap();

        let config = parse("parameters:\n  - name: x\n    default: \"9\"\nquery: \"SELECT getvariable('x') AS v\"\n");
        let mut target = block();
        apply(&mut ctx, &mut target, &config).unwrap();
        assert_eq!(target.query_results()[0].rows, vec![vec!["9".to_string()]]);
    }

    #[test]
    fn test_pd008_data_source_takes_precedence_over_db_config() {
        let mut ctx = context();
        // Both present: db_config must not be applied, only the reopen.
        let config = parse(
            "data_source: \":memory:\"\ndb_config:\n  definitely_not_a_setting: 1\nquery: SELECT 1 AS one\n",
        );
        let mut target = block();
        apply(&mut ctx, &mut target, &config).unwrap();
        assert!(ctx.session.is_open());
        assert_eq!(target.query_results().len(), 1);
    }

    #[test]
    fn test_pd008_relative_data_source_resolves_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = RunContext::new(dir.path(), Variables::new());
        let config = parse("data_source: reports.db\nquery: CREATE TABLE t (x);\n");
        apply(&mut ctx, &mut block(), &config).unwrap();
        assert!(dir.path().join("reports.db").exists());
    }

    #[test]
    fn test_pd008_db_config_opens_default_session() {
        let mut ctx = context();
        let config = parse("db_config:\n  cache_size: 400\n");
        apply(&mut ctx, &mut block(), &config).unwrap();
        assert!(ctx.session.is_open());
    }

    #[test]
    fn test_pd008_query_file_results_precede_inline_query() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("q.sql"), "SELECT 1 AS a;").unwrap();
        let mut ctx = RunContext::new(dir.path(), Variables::new());
        let config = parse("query_file: q.sql\nquery: SELECT 2 AS b\n");
        let mut target = block();
        apply(&mut ctx, &mut target, &config).unwrap();
        let results = target.query_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].columns, vec!["a"]);
        assert_eq!(results[1].columns, vec!["b"]);
    }

    #[test]
    fn test_pd008_missing_query_file_is_file_access_error() {
        let mut ctx = context();
        let config = parse("query_file: /nonexistent/q.sql\n");
        let err = apply(&mut ctx, &mut block(), &config).unwrap_err();
        assert!(matches!(err, Error::FileAccess { .. }));
    }

    #[test]
    fn test_pd008_first_config_becomes_top_config() {
        let mut ctx = context();
        let first = parse("output: report.html\n");
        let second = parse("output: ignored.html\n");
        apply(&mut ctx, &mut block(), &first).unwrap();
        apply(&mut ctx, &mut block(), &second).unwrap();
        assert_eq!(
            ctx.top_config.as_ref().unwrap().output.as_deref(),
            Some("report.html")
        );
    }

    #[test]
    fn test_pd008_expansion_applies_before_directives() {
        let mut ctx = context();
        ctx.variables.insert("n".to_string(), "5".to_string());
        let config = parse("query: SELECT ${n} AS v\n");
        let mut target = block();
        let (expanded, _) = apply(&mut ctx, &mut target, &config).unwrap();
        assert_eq!(expanded.query.as_deref(), Some("SELECT 5 AS v"));
        assert_eq!(target.query_results()[0].rows, vec![vec!["5".to_string()]]);
    }
}
