//! PD-004: Configuration parsing.
//!
//! Recognizes configuration blocks (fenced code whose info string starts with
//! `plot`) and parses their YAML body into a [`Configuration`], as well as
//! whole included YAML files. Syntax is delegated to serde_yaml_ng; this
//! module only attaches source locations.

use super::error::{Error, Result};
use super::types::{Block, BlockKind, Configuration, SourceLocation};
use std::path::Path;

/// Fence language that marks a configuration block.
pub const CONFIG_LANGUAGE: &str = "plot";

/// If `block` is a configuration block, return its configuration source text.
pub fn configuration_source(block: &Block) -> Option<String> {
    match &block.kind {
        BlockKind::Code { language } if language == CONFIG_LANGUAGE => Some(block.text.clone()),
        _ => None,
    }
}

/// Parse configuration text. An empty body is the all-default configuration.
pub fn parse_configuration(source: &str, location: SourceLocation) -> Result<Configuration> {
    let mut config = if source.trim().is_empty() {
        Configuration::default()
    } else {
        serde_yaml_ng::from_str(source).map_err(|e| Error::Parse {
            location: location.clone(),
            source: e,
        })?
    };
    config.location = location;
    Ok(config)
}

/// Parse an included YAML file as one configuration.
///
/// Read failures point at the include directive; parse failures point at the
/// included file itself.
pub fn parse_configuration_file(
    path: &Path,
    display: &str,
    include_location: &SourceLocation,
) -> Result<Configuration> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::FileAccess {
        location: include_location.clone(),
        source: e,
    })?;
    parse_configuration(&contents, SourceLocation::file(display))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BlockKind;

    fn code_block(language: &str, text: &str) -> Block {
        Block::new(
            BlockKind::Code {
                language: language.to_string(),
            },
            text.to_string(),
            SourceLocation::new("a.md", 3),
        )
    }

    #[test]
    fn test_pd004_recognizes_plot_fence() {
        let block = code_block("plot", "query: SELECT 1\n");
        assert_eq!(
            configuration_source(&block).as_deref(),
            Some("query: SELECT 1\n")
        );
    }

    #[test]
    fn test_pd004_ignores_other_fences_and_kinds() {
        assert!(configuration_source(&code_block("sql", "SELECT 1")).is_none());
        assert!(configuration_source(&code_block("", "plain")).is_none());
        let paragraph = Block::new(
            BlockKind::Paragraph,
            "plot".to_string(),
            SourceLocation::default(),
        );
        assert!(configuration_source(&paragraph).is_none());
    }

    #[test]
    fn test_pd004_parse_attaches_location() {
        let config =
            parse_configuration("query: SELECT 1\n", SourceLocation::new("a.md", 3)).unwrap();
        assert_eq!(config.location, SourceLocation::new("a.md", 3));
        assert_eq!(config.query.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_pd004_empty_body_is_default() {
        let config = parse_configuration("  \n", SourceLocation::new("a.md", 1)).unwrap();
        assert_eq!(config.query, None);
        assert!(config.parameters.is_empty());
        assert_eq!(config.location.line, Some(1));
    }

    #[test]
    fn test_pd004_invalid_yaml_is_parse_error() {
        let err = parse_configuration("query: [unclosed\n", SourceLocation::new("a.md", 7))
            .unwrap_err();
        match err {
            Error::Parse { location, .. } => assert_eq!(location.line, Some(7)),
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_pd004_missing_file_points_at_include_site() {
        let include_location = SourceLocation::new("a.md", 5);
        let err = parse_configuration_file(
            Path::new("/nonexistent/plotdown/q.yaml"),
            "q.yaml",
            &include_location,
        )
        .unwrap_err();
        match err {
            Error::FileAccess { location, .. } => assert_eq!(location, include_location),
            other => panic!("expected FileAccess error, got {:?}", other),
        }
    }
}
