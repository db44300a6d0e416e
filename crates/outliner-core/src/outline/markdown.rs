//! Markdown to block tree.
//!
//! Lines are first assigned a nesting level by comparing them against a
//! stack of open contexts, then linked into a tree in a second pass.

use crate::block::{Block, Position};
use crate::error::Result;
use crate::repo::BlockSeed;
use crate::store::ChangeScope;

const TAB_WIDTH: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    /// `#` count of the heading.
    Header(usize),
    /// Bullet character of the item.
    UnorderedItem(char),
    OrderedItem,
    Text,
}

impl LineKind {
    fn is_header(&self) -> bool {
        matches!(self, LineKind::Header(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedBlock {
    pub content: String,
    pub kind: LineKind,
    /// 1 for top-level lines.
    pub level: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedOutline {
    blocks: Vec<ParsedBlock>,
}

impl ParsedOutline {
    pub fn blocks(&self) -> &[ParsedBlock] {
        &self.blocks
    }

    pub fn get(&self, ix: usize) -> Option<&ParsedBlock> {
        self.blocks.get(ix)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.parent.is_none())
            .map(|(ix, _)| ix)
    }

    /// Creates the parsed tree as real blocks below `parent`, with the
    /// parsed roots placed at `position`. Returns the created roots.
    pub fn create_under(&self, parent: &Block, position: Position) -> Result<Vec<Block>> {
        let repo = parent.repo()?;
        repo.batch(&ChangeScope::DOCUMENT, || {
            let start = position.resolve(parent.child_ids()?.len());
            let mut created = Vec::new();
            for (offset, root) in self.roots().enumerate() {
                let block = parent.create_child(
                    BlockSeed::new(self.blocks[root].content.clone()),
                    Position::Index(start + offset),
                )?;
                self.create_children(root, &block)?;
                created.push(block);
            }
            Ok(created)
        })
    }

    fn create_children(&self, ix: usize, block: &Block) -> Result<()> {
        for &child_ix in &self.blocks[ix].children {
            let child = block.create_child(
                BlockSeed::new(self.blocks[child_ix].content.clone()),
                Position::Last,
            )?;
            self.create_children(child_ix, &child)?;
        }
        Ok(())
    }
}

struct Line {
    indent: usize,
    kind: LineKind,
    content: String,
}

struct Context {
    indent: usize,
    kind: LineKind,
    level: usize,
}

pub fn parse_markdown_to_blocks(text: &str) -> ParsedOutline {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<Line> = normalized
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(classify)
        .collect();

    let mut stack: Vec<Context> = Vec::new();
    let mut levels = Vec::with_capacity(lines.len());
    for line in &lines {
        while let Some(top) = stack.last() {
            if is_child_of(line, top) {
                break;
            }
            stack.pop();
        }
        let level = stack.last().map_or(0, |top| top.level) + 1;
        stack.push(Context {
            indent: line.indent,
            kind: line.kind,
            level,
        });
        levels.push(level);
    }

    let mut blocks: Vec<ParsedBlock> = Vec::with_capacity(lines.len());
    let mut last_at_level: Vec<usize> = Vec::new();
    for (line, level) in lines.into_iter().zip(levels) {
        let ix = blocks.len();
        let parent = level
            .checked_sub(2)
            .and_then(|parent_level| last_at_level.get(parent_level).copied());
        if let Some(parent) = parent {
            blocks[parent].children.push(ix);
        }
        last_at_level.truncate(level - 1);
        last_at_level.push(ix);
        blocks.push(ParsedBlock {
            content: line.content,
            kind: line.kind,
            level,
            parent,
            children: Vec::new(),
        });
    }
    ParsedOutline { blocks }
}

fn is_child_of(line: &Line, top: &Context) -> bool {
    if line.indent != top.indent {
        return line.indent > top.indent;
    }
    match (top.kind, line.kind) {
        (LineKind::Header(parent), LineKind::Header(child)) => child > parent,
        (LineKind::Header(_), _) => true,
        _ => false,
    }
}

fn classify(raw: &str) -> Line {
    let trimmed = raw.trim_start();
    let indent = raw[..raw.len() - trimmed.len()]
        .chars()
        .map(|ch| if ch == '\t' { TAB_WIDTH } else { 1 })
        .sum();
    let (kind, content) = if let Some(depth) = header_depth(trimmed) {
        (LineKind::Header(depth), raw.trim_end().to_string())
    } else if let Some((bullet, rest)) = unordered_item(trimmed) {
        (LineKind::UnorderedItem(bullet), rest.trim().to_string())
    } else if is_ordered_item(trimmed) {
        (LineKind::OrderedItem, trimmed.trim_end().to_string())
    } else {
        (LineKind::Text, raw.trim_end().to_string())
    };
    Line {
        indent,
        kind,
        content,
    }
}

fn header_depth(trimmed: &str) -> Option<usize> {
    let depth = trimmed.chars().take_while(|ch| *ch == '#').count();
    if depth == 0 {
        return None;
    }
    match trimmed[depth..].chars().next() {
        None => Some(depth),
        Some(ch) if ch.is_whitespace() => Some(depth),
        Some(_) => None,
    }
}

fn unordered_item(trimmed: &str) -> Option<(char, &str)> {
    let mut chars = trimmed.chars();
    let bullet = chars.next()?;
    if !matches!(bullet, '-' | '*' | '+') {
        return None;
    }
    let rest = chars.as_str();
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((bullet, rest))
}

fn is_ordered_item(trimmed: &str) -> bool {
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }
    let mut rest = trimmed[digits..].chars();
    rest.next() == Some('.') && rest.next().is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(outline: &ParsedOutline) -> Vec<(String, usize, Option<usize>)> {
        outline
            .blocks()
            .iter()
            .map(|block| (block.content.clone(), block.level, block.parent))
            .collect()
    }

    #[test]
    fn header_owns_indented_text_and_deeper_header() {
        let outline =
            parse_markdown_to_blocks("# Header 1\n  Content under header 1\n## Header 2");
        assert_eq!(
            summary(&outline),
            vec![
                ("# Header 1".to_string(), 1, None),
                ("  Content under header 1".to_string(), 2, Some(0)),
                ("## Header 2".to_string(), 2, Some(0)),
            ]
        );
        assert_eq!(outline.blocks()[0].children, vec![1, 2]);
        assert_eq!(outline.roots().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn equal_headers_are_siblings() {
        let outline = parse_markdown_to_blocks("## A\nbody\n## B\n# C");
        assert_eq!(
            summary(&outline),
            vec![
                ("## A".to_string(), 1, None),
                ("body".to_string(), 2, Some(0)),
                ("## B".to_string(), 1, None),
                ("# C".to_string(), 1, None),
            ]
        );
    }

    #[test]
    fn list_items_nest_by_indentation() {
        let outline = parse_markdown_to_blocks("- one\n  - one.a\n  - one.b\n- two\n\n- three");
        assert_eq!(
            summary(&outline),
            vec![
                ("one".to_string(), 1, None),
                ("one.a".to_string(), 2, Some(0)),
                ("one.b".to_string(), 2, Some(0)),
                ("two".to_string(), 1, None),
                ("three".to_string(), 1, None),
            ]
        );
    }

    #[test]
    fn ordered_items_keep_numeric_marker() {
        let outline = parse_markdown_to_blocks("1. first\n2. second");
        let contents: Vec<&str> = outline
            .blocks()
            .iter()
            .map(|block| block.content.as_str())
            .collect();
        assert_eq!(contents, vec!["1. first", "2. second"]);
        assert!(outline
            .blocks()
            .iter()
            .all(|block| block.kind == LineKind::OrderedItem && block.parent.is_none()));
    }

    #[test]
    fn list_under_header_and_dedent_pops() {
        let outline = parse_markdown_to_blocks("# Tasks\n- a\n    - deep\n  - mid\nafter");
        assert_eq!(
            summary(&outline),
            vec![
                ("# Tasks".to_string(), 1, None),
                ("a".to_string(), 2, Some(0)),
                ("deep".to_string(), 3, Some(1)),
                ("mid".to_string(), 3, Some(1)),
                ("after".to_string(), 2, Some(0)),
            ]
        );
    }

    #[test]
    fn classification_rules() {
        assert_eq!(header_depth("### x"), Some(3));
        assert_eq!(header_depth("#tag"), None);
        assert_eq!(unordered_item("* item").map(|(bullet, _)| bullet), Some('*'));
        assert!(unordered_item("-nope").is_none());
        assert!(is_ordered_item("12. twelve"));
        assert!(!is_ordered_item("12.5 units"));
    }

    #[test]
    fn tabs_count_as_indentation() {
        let outline = parse_markdown_to_blocks("- a\n\t- b");
        assert_eq!(outline.blocks()[1].parent, Some(0));
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert!(parse_markdown_to_blocks("\n  \r\n").is_empty());
    }
}
