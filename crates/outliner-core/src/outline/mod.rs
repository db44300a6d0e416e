//! Tree algorithms over blocks: visible order, range selection, structural
//! editing and markdown import.

pub mod editing;
pub mod markdown;
pub mod selection;
pub mod traversal;

pub use editing::{
    delete_empty_block, delete_selected_blocks, indent_block, indent_selected_blocks, move_block,
    navigate, outdent_block, outdent_selected_blocks, paste_multiline_text, split_block_at_cursor,
    toggle_collapsed, SplitOutcome,
};
pub use markdown::{parse_markdown_to_blocks, LineKind, ParsedBlock, ParsedOutline};
pub use selection::{
    all_visible_block_ids_in_order, blocks_in_range, extend_selection, select_block,
    validate_selection_hierarchy,
};
pub use traversal::{next_visible_block, previous_visible_block, visible_blocks};
