//! PD-003: Markdown block segmentation.
//!
//! Splits a Markdown source into its ordered top-level blocks using the
//! pulldown-cmark offset iterator. Line numbers are derived from byte offsets
//! so every block keeps its position for error attribution. For code blocks
//! the stored text is the fence contents, not the fence markers, because that
//! is what the configuration parser consumes.

use super::types::{Block, BlockKind, SourceLocation};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};
use std::path::Path;

/// Parse a Markdown source into ordered top-level blocks tagged with `path`.
pub fn segment(contents: &str, path: &Path) -> Vec<Block> {
    let offsets = line_offsets(contents);
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<OpenBlock> = None;

    for (event, range) in Parser::new_ext(contents, Options::all()).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                if depth == 0 {
                    open = Some(OpenBlock {
                        kind: kind_of(&tag),
                        start: range.start,
                        code: String::new(),
                    });
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(block) = open.take() {
                        blocks.push(finish(block, range.end, contents, path, &offsets));
                    }
                }
            }
            Event::Text(text) => {
                if depth == 1 {
                    if let Some(ref mut block) = open {
                        if matches!(block.kind, BlockKind::Code { .. }) {
                            block.code.push_str(&text);
                        }
                    }
                }
            }
            Event::Rule if depth == 0 => {
                blocks.push(Block::new(
                    BlockKind::Rule,
                    contents[range.clone()].trim_end().to_string(),
                    location_at(path, range.start, &offsets),
                ));
            }
            Event::Html(html) if depth == 0 => {
                blocks.push(Block::new(
                    BlockKind::Html,
                    html.trim_end().to_string(),
                    location_at(path, range.start, &offsets),
                ));
            }
            _ => {}
        }
    }

    blocks
}

struct OpenBlock {
    kind: BlockKind,
    start: usize,
    code: String,
}

fn finish(
    block: OpenBlock,
    end: usize,
    contents: &str,
    path: &Path,
    offsets: &[usize],
) -> Block {
    let text = if matches!(block.kind, BlockKind::Code { .. }) {
        block.code
    } else {
        contents[block.start..end].trim_end().to_string()
    };
    Block::new(block.kind, text, location_at(path, block.start, offsets))
}

fn kind_of(tag: &Tag) -> BlockKind {
    match tag {
        Tag::Heading(level, ..) => BlockKind::Heading {
            level: *level as u32,
        },
        Tag::Paragraph => BlockKind::Paragraph,
        Tag::CodeBlock(CodeBlockKind::Fenced(info)) => BlockKind::Code {
            language: info
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
        },
        Tag::CodeBlock(CodeBlockKind::Indented) => BlockKind::Code {
            language: String::new(),
        },
        Tag::List(_) => BlockKind::List,
        Tag::BlockQuote => BlockKind::BlockQuote,
        Tag::Table(_) => BlockKind::Table,
        _ => BlockKind::Other,
    }
}

fn location_at(path: &Path, byte: usize, offsets: &[usize]) -> SourceLocation {
    SourceLocation::new(path, line_for(offsets, byte))
}

/// Byte offset of each line start; index i holds the start of line i+1.
fn line_offsets(contents: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    for (index, byte) in contents.bytes().enumerate() {
        if byte == b'\n' {
            offsets.push(index + 1);
        }
    }
    offsets
}

fn line_for(offsets: &[usize], byte: usize) -> usize {
    offsets.partition_point(|&start| start <= byte)
}
