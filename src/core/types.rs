//! PD-001: Core data model — locations, configurations, blocks, result sets.
//!
//! Everything the traversal produces or consumes lives here. Configurations
//! are immutable once parsed; blocks carry an ordered, string-keyed metadata
//! bag so downstream renderers can attach further annotation keys without a
//! schema change.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Run-scoped variable map: name → string value, insertion-ordered.
pub type Variables = IndexMap<String, String>;

// ============================================================================
// Source locations
// ============================================================================

/// Where a value came from, for error attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    /// File path, relative to the invocation directory where possible.
    pub path: Option<PathBuf>,

    /// 1-based line number within the file.
    pub line: Option<usize>,
}

impl SourceLocation {
    /// Location with both a path and a line.
    pub fn new(path: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            path: Some(path.into()),
            line: Some(line),
        }
    }

    /// Location naming a whole file (no line).
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            line: None,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, self.line) {
            (Some(path), Some(line)) => write!(f, "{}:{}", path.display(), line),
            (Some(path), None) => write!(f, "{}", path.display()),
            (None, _) => write!(f, "<input>"),
        }
    }
}

// ============================================================================
// Configurations
// ============================================================================

/// One entry of a `parameters` directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Variable name. Absence is a configuration error, caught at apply time.
    #[serde(default)]
    pub name: Option<String>,

    /// Default value, bound only if the variable is not already set.
    #[serde(default)]
    pub default: Option<serde_yaml_ng::Value>,
}

/// Directive set parsed from one configuration block or included YAML file.
///
/// Unknown keys are ignored so documents stay forward-compatible with newer
/// directive vocabularies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Path of a file to include before the rest of this configuration.
    #[serde(default)]
    pub include: Option<String>,

    /// Ordered parameter declarations (first default wins).
    #[serde(default)]
    pub parameters: Vec<Parameter>,

    /// Connection string; reopens the session. Takes precedence over
    /// `db_config` within one configuration.
    #[serde(default)]
    pub data_source: Option<String>,

    /// Incremental session settings, applied in document order.
    #[serde(default)]
    pub db_config: IndexMap<String, serde_yaml_ng::Value>,

    /// Inline SQL text; may contain multiple statements.
    #[serde(default)]
    pub query: Option<String>,

    /// Path of a SQL file, executed before any inline `query`.
    #[serde(default)]
    pub query_file: Option<String>,

    /// Output file for the downstream renderer. Authoritative only in the
    /// first configuration of the run.
    #[serde(default)]
    pub output: Option<String>,

    /// Renderer template. Same first-occurrence rule as `output`.
    #[serde(default)]
    pub template: Option<String>,

    /// Where this configuration was parsed from.
    #[serde(skip)]
    pub location: SourceLocation,
}

/// Stringify a YAML scalar for variable binding and setting application.
pub fn yaml_value_to_string(value: &serde_yaml_ng::Value) -> String {
    match value {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// Shape of one top-level content unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading { level: u32 },
    Paragraph,
    Code { language: String },
    List,
    BlockQuote,
    Table,
    Rule,
    Html,
    Other,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heading { level } => write!(f, "heading({})", level),
            Self::Paragraph => write!(f, "paragraph"),
            Self::Code { language } if language.is_empty() => write!(f, "code"),
            Self::Code { language } => write!(f, "code({})", language),
            Self::List => write!(f, "list"),
            Self::BlockQuote => write!(f, "blockquote"),
            Self::Table => write!(f, "table"),
            Self::Rule => write!(f, "rule"),
            Self::Html => write!(f, "html"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Metadata value variants a block can carry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    Config(Configuration),
    ConfigList(Vec<Configuration>),
    Results(Vec<QueryResultSet>),
}

/// Metadata key: source path of the block, relative to the invocation dir.
pub const META_PATH: &str = "path";
/// Metadata key: the block's own (expanded) configuration.
pub const META_PLOTTER_CONFIG: &str = "plotter_config";
/// Metadata key: configurations contributed by included YAML files.
pub const META_INCLUDED_CONFIGS: &str = "included_configs";
/// Metadata key: result sets attached by query execution.
pub const META_QUERY_RESULTS: &str = "query_results";

/// One ordered content unit from a parsed source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    /// Structural shape of the block.
    pub kind: BlockKind,

    /// Raw source text (fence contents for code blocks).
    pub text: String,

    /// Position of the block's first line.
    pub location: SourceLocation,

    /// Extensible annotation bag, insertion-ordered.
    pub metadata: IndexMap<String, MetaValue>,
}

impl Block {
    pub fn new(kind: BlockKind, text: String, location: SourceLocation) -> Self {
        Self {
            kind,
            text,
            location,
            metadata: IndexMap::new(),
        }
    }

    pub fn set_path(&mut self, path: &str) {
        self.metadata
            .insert(META_PATH.to_string(), MetaValue::Text(path.to_string()));
    }

    pub fn path(&self) -> Option<&str> {
        match self.metadata.get(META_PATH) {
            Some(MetaValue::Text(path)) => Some(path),
            _ => None,
        }
    }

    pub fn set_plotter_config(&mut self, config: Configuration) {
        self.metadata
            .insert(META_PLOTTER_CONFIG.to_string(), MetaValue::Config(config));
    }

    pub fn plotter_config(&self) -> Option<&Configuration> {
        match self.metadata.get(META_PLOTTER_CONFIG) {
            Some(MetaValue::Config(config)) => Some(config),
            _ => None,
        }
    }

    pub fn push_included_config(&mut self, config: Configuration) {
        let entry = self
            .metadata
            .entry(META_INCLUDED_CONFIGS.to_string())
            .or_insert_with(|| MetaValue::ConfigList(Vec::new()));
        if let MetaValue::ConfigList(configs) = entry {
            configs.push(config);
        }
    }

    pub fn included_configs(&self) -> &[Configuration] {
        match self.metadata.get(META_INCLUDED_CONFIGS) {
            Some(MetaValue::ConfigList(configs)) => configs,
            _ => &[],
        }
    }

    pub fn push_query_result(&mut self, result_set: QueryResultSet) {
        let entry = self
            .metadata
            .entry(META_QUERY_RESULTS.to_string())
            .or_insert_with(|| MetaValue::Results(Vec::new()));
        if let MetaValue::Results(results) = entry {
            results.push(result_set);
        }
    }

    pub fn query_results(&self) -> &[QueryResultSet] {
        match self.metadata.get(META_QUERY_RESULTS) {
            Some(MetaValue::Results(results)) => results,
            _ => &[],
        }
    }
}

// ============================================================================
// Result sets
// ============================================================================

/// Tabular output of one executed statement. Values are stringified; SQL NULL
/// becomes the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pd001_location_display() {
        assert_eq!(SourceLocation::new("a.md", 3).to_string(), "a.md:3");
        assert_eq!(SourceLocation::file("b.yaml").to_string(), "b.yaml");
        assert_eq!(SourceLocation::default().to_string(), "<input>");
    }

    #[test]
    fn test_pd001_configuration_parse() {
        let yaml = r#"
include: extra.yaml
parameters:
  - name: region
    default: eu-west-1
data_source: reports.db
db_config:
  journal_mode: wal
  cache_size: 500
query: SELECT 1
output: out.html
"#;
        let config: Configuration = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.include.as_deref(), Some("extra.yaml"));
        assert_eq!(config.parameters.len(), 1);
        assert_eq!(config.parameters[0].name.as_deref(), Some("region"));
        assert_eq!(config.data_source.as_deref(), Some("reports.db"));
        let keys: Vec<_> = config.db_config.keys().collect();
        assert_eq!(keys, vec!["journal_mode", "cache_size"]);
        assert_eq!(config.query.as_deref(), Some("SELECT 1"));
        assert_eq!(config.output.as_deref(), Some("out.html"));
        assert!(config.template.is_none());
    }

    #[test]
    fn test_pd001_configuration_ignores_unknown_keys() {
        let config: Configuration =
            serde_yaml_ng::from_str("query: SELECT 1\nfuture_directive: yes\n").unwrap();
        assert_eq!(config.query.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_pd001_yaml_value_to_string() {
        assert_eq!(
            yaml_value_to_string(&serde_yaml_ng::Value::String("x".into())),
            "x"
        );
        assert_eq!(
            yaml_value_to_string(&serde_yaml_ng::Value::Number(7.into())),
            "7"
        );
        assert_eq!(
            yaml_value_to_string(&serde_yaml_ng::Value::Bool(false)),
            "false"
        );
        assert_eq!(yaml_value_to_string(&serde_yaml_ng::Value::Null), "");
    }

    #[test]
    fn test_pd001_block_metadata_accessors() {
        let mut block = Block::new(
            BlockKind::Paragraph,
            "hello".to_string(),
            SourceLocation::new("a.md", 1),
        );
        assert!(block.path().is_none());
        assert!(block.included_configs().is_empty());
        assert!(block.query_results().is_empty());

        block.set_path("a.md");
        block.push_included_config(Configuration::default());
        block.push_query_result(QueryResultSet {
            columns: vec!["v".to_string()],
            rows: vec![vec!["1".to_string()]],
        });
        block.push_query_result(QueryResultSet {
            columns: vec!["w".to_string()],
            rows: vec![],
        });

        assert_eq!(block.path(), Some("a.md"));
        assert_eq!(block.included_configs().len(), 1);
        let results = block.query_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].columns, vec!["v"]);
        assert_eq!(results[1].columns, vec!["w"]);
    }

    #[test]
    fn test_pd001_metadata_preserves_insertion_order() {
        let mut block = Block::new(
            BlockKind::Paragraph,
            String::new(),
            SourceLocation::default(),
        );
        block.set_path("a.md");
        block.set_plotter_config(Configuration::default());
        block.push_query_result(QueryResultSet {
            columns: vec![],
            rows: vec![],
        });
        let keys: Vec<_> = block.metadata.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![META_PATH, META_PLOTTER_CONFIG, META_QUERY_RESULTS]
        );
    }

    #[test]
    fn test_pd001_block_kind_display() {
        assert_eq!(BlockKind::Heading { level: 2 }.to_string(), "heading(2)");
        assert_eq!(
            BlockKind::Code {
                language: "plot".to_string()
            }
            .to_string(),
            "code(plot)"
        );
        assert_eq!(
            BlockKind::Code {
                language: String::new()
            }
            .to_string(),
            "code"
        );
        assert_eq!(BlockKind::Rule.to_string(), "rule");
    }
}
