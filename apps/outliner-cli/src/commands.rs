use anyhow::Context;
use clap::Args;
use outliner_core::exchange::{export_subtree, import_blocks, ExportDocument};
use outliner_core::outline::{parse_markdown_to_blocks, visible_blocks};
use outliner_core::settings::SettingsStore;
use outliner_core::{Block, Position, Repo};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

const CLI_USER: &str = "outliner-cli";

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Markdown file to import
    pub input: PathBuf,

    /// Write the export document here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Export document (JSON)
    pub input: PathBuf,
}

#[derive(Args, Debug)]
pub struct SettingsArgs {
    /// Settings file to read instead of the platform default
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}

pub fn import(args: ImportArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let title = args
        .input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let repo = Repo::new(CLI_USER);
    let root = repo.create_root(title)?;
    let parsed = parse_markdown_to_blocks(&text);
    parsed.create_under(&root, Position::Last)?;
    let doc = export_subtree(&root)?;
    info!(blocks = doc.blocks.len(), "parsed markdown");

    match args.out {
        Some(path) => {
            doc.write(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => writeln!(out, "{}", doc.to_json()?)?,
    }
    Ok(())
}

pub fn tree(args: TreeArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let doc = ExportDocument::read(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    let repo = Repo::new(CLI_USER);
    for root in import_blocks(&repo, &doc, None)? {
        write_outline(&root, out)?;
    }
    Ok(())
}

fn write_outline(root: &Block, out: &mut impl Write) -> anyhow::Result<()> {
    let base = root.parents()?.len();
    for block in visible_blocks(root)? {
        let depth = block.parents()?.len().saturating_sub(base);
        let marker = if block.is_collapsed()? && block.has_children()? {
            "+"
        } else {
            "-"
        };
        writeln!(
            out,
            "{}{} {}",
            "  ".repeat(depth),
            marker,
            block.content()?
        )?;
    }
    Ok(())
}

pub fn settings(args: SettingsArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let store = match args.path {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::default_store()?,
    };
    let settings = store
        .load()
        .with_context(|| format!("failed to load {}", store.path().display()))?;
    writeln!(out, "{}", serde_json::to_string_pretty(&settings)?)?;
    Ok(())
}
