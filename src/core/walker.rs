//! PD-009: Inclusion resolver and run context.
//!
//! Walks the document tree from the entry file, splicing included Markdown
//! blocks into the flat stream right after the including block and routing
//! configuration blocks through the cascade. The working directory is a field
//! of the run context scoped per included file by a drop guard — never the
//! process-wide directory — so concurrent runs cannot interact. A canonical
//! path stack rejects inclusion cycles instead of recursing until resource
//! exhaustion.

use super::blocks;
use super::cascade;
use super::error::{Error, Result};
use super::parser;
use super::resolver;
use super::session::Session;
use super::types::{Block, Configuration, SourceLocation, Variables};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Shared state of one processing run, threaded by reference through the
/// recursion. Dropping the context disposes the session exactly once.
pub struct RunContext {
    /// Directory of the top-level invocation; error paths are relative to it.
    pub invocation_dir: PathBuf,

    /// Logical working directory; relative paths resolve against it.
    pub current_dir: PathBuf,

    /// Run-scoped variable bindings.
    pub variables: Variables,

    /// The single database session.
    pub session: Session,

    /// First configuration encountered in the run (expanded form).
    pub top_config: Option<Configuration>,

    /// Canonical paths of files currently being included.
    include_stack: Vec<PathBuf>,
}

impl RunContext {
    pub fn new(base_dir: &Path, variables: Variables) -> Self {
        let invocation_dir =
            fs::canonicalize(base_dir).unwrap_or_else(|_| base_dir.to_path_buf());
        Self {
            current_dir: invocation_dir.clone(),
            invocation_dir,
            variables,
            session: Session::new(),
            top_config: None,
            include_stack: Vec::new(),
        }
    }

    /// Resolve a possibly-relative path against the logical working dir.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current_dir.join(path)
        }
    }

    /// Render a path relative to the invocation directory where possible.
    pub fn display_path(&self, path: &Path) -> String {
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        match canonical.strip_prefix(&self.invocation_dir) {
            Ok(relative) => relative.display().to_string(),
            Err(_) => canonical.display().to_string(),
        }
    }
}

/// Everything `process` hands back to the caller.
#[derive(Debug, serde::Serialize)]
pub struct ProcessOutput {
    /// Flattened, annotated blocks in document order.
    pub blocks: Vec<Block>,

    /// First configuration of the run (carries the global output/template).
    pub configuration: Option<Configuration>,

    /// Final variable bindings.
    pub variables: Variables,
}

/// Process the document tree rooted at `entry` (relative to `base_dir`).
pub fn process(base_dir: &Path, entry: &str, variables: Variables) -> Result<ProcessOutput> {
    let mut ctx = RunContext::new(base_dir, variables);
    let entry_path = ctx.resolve_path(entry);
    let blocks = walk_markdown(&mut ctx, &entry_path, &SourceLocation::default())?;
    let RunContext {
        variables,
        top_config,
        ..
    } = ctx;
    Ok(ProcessOutput {
        blocks,
        configuration: top_config,
        variables,
    })
}

/// Dispatch one include directive by extension.
pub(crate) fn resolve_include(
    ctx: &mut RunContext,
    block: &mut Block,
    path: &str,
    location: &SourceLocation,
) -> Result<Vec<Block>> {
    let resolved = ctx.resolve_path(path);
    let extension = resolved
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "md" | "markdown" | "txt" => walk_markdown(ctx, &resolved, location),
        "yaml" | "yml" => include_configuration(ctx, block, &resolved, location),
        other => Err(Error::UnsupportedExtension {
            location: location.clone(),
            extension: other.to_string(),
        }),
    }
}

/// Recursively process one Markdown file into blocks.
fn walk_markdown(
    ctx: &mut RunContext,
    path: &Path,
    location: &SourceLocation,
) -> Result<Vec<Block>> {
    let canonical = enter_file(ctx, path, location)?;
    let contents = fs::read_to_string(&canonical).map_err(|e| Error::FileAccess {
        location: location.clone(),
        source: e,
    })?;
    let display = ctx.display_path(&canonical);
    let directory = canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.current_dir.clone());

    ctx.include_stack.push(canonical);
    let result = walk_blocks(ctx, &contents, &display, directory);
    ctx.include_stack.pop();
    result
}

fn walk_blocks(
    ctx: &mut RunContext,
    contents: &str,
    display: &str,
    directory: PathBuf,
) -> Result<Vec<Block>> {
    let parsed = blocks::segment(contents, Path::new(display));
    let scope = DirScope::enter(ctx, directory);
    let mut out = Vec::with_capacity(parsed.len());

    for mut block in parsed {
        block.set_path(display);
        match parser::configuration_source(&block) {
            Some(source) => {
                let raw = parser::parse_configuration(&source, block.location.clone())?;
                let (expanded, included) = cascade::apply(scope.ctx, &mut block, &raw)?;
                block.set_plotter_config(expanded);
                out.push(block);
                out.extend(included);
            }
            None => out.push(block),
        }
    }

    Ok(out)
}

/// Parse an included YAML file, record it on the block, and cascade it.
fn include_configuration(
    ctx: &mut RunContext,
    block: &mut Block,
    path: &Path,
    location: &SourceLocation,
) -> Result<Vec<Block>> {
    let canonical = enter_file(ctx, path, location)?;
    let display = ctx.display_path(&canonical);
    let raw = parser::parse_configuration_file(&canonical, &display, location)?;
    let expanded = resolver::expand_configuration(&raw, &ctx.variables)?;
    block.push_included_config(expanded.clone());

    ctx.include_stack.push(canonical);
    let result = cascade::apply_expanded(ctx, block, &expanded);
    ctx.include_stack.pop();
    result
}

/// Canonicalize an include target and reject re-entry.
fn enter_file(ctx: &RunContext, path: &Path, location: &SourceLocation) -> Result<PathBuf> {
    let canonical = fs::canonicalize(path).map_err(|e| Error::FileAccess {
        location: location.clone(),
        source: e,
    })?;
    if ctx.include_stack.contains(&canonical) {
        return Err(Error::InclusionCycle {
            location: location.clone(),
            path: ctx.display_path(&canonical),
        });
    }
    Ok(canonical)
}

/// Scoped working-directory change: restores the previous directory on every
/// exit path, normal or unwinding.
struct DirScope<'a> {
    ctx: &'a mut RunContext,
    previous: PathBuf,
}

impl<'a> DirScope<'a> {
    fn enter(ctx: &'a mut RunContext, directory: PathBuf) -> Self {
        let previous = std::mem::replace(&mut ctx.current_dir, directory);
        Self { ctx, previous }
    }
}

impl Drop for DirScope<'_> {
    fn drop(&mut self) {
        self.ctx.current_dir = std::mem::take(&mut self.previous);
    }
}
