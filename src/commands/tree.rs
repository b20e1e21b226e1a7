//! # Tree Command Implementation
//!
//! Displays the extends chain of every app in a manifest, each base nested
//! under the app that extends it. Only the discovery phase runs, so apps with
//! missing compose files or bad templates can still be inspected.
//!
//! This command is a safe, read-only operation that does not modify any files.

use std::borrow::Cow;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use ptree::{write_tree, Style, TreeItem};

use super::{explain, fetcher, manifest_source};
use d0s::cancel::CancellationToken;
use d0s::manifest;
use d0s::output::{emoji, OutputConfig};
use d0s::phases::{discovery, ChainLink, ResolvedApp};

/// Display each app's extends chain
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Manifest file, directory, or git reference.
    #[arg(
        short,
        long,
        value_name = "MANIFEST",
        env = "D0S_MANIFEST",
        default_value = "."
    )]
    pub manifest: String,

    /// The root directory for the checkout cache.
    #[arg(long, value_name = "DIR", env = "D0S_CACHE")]
    pub cache_root: Option<PathBuf>,

    /// Maximum number of bases to show below each app.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,
}

/// Execute the `tree` command.
pub fn execute(args: TreeArgs, output: &OutputConfig) -> Result<()> {
    let fetcher = fetcher(args.cache_root);
    let cancel = CancellationToken::new();
    let source = manifest_source(&args.manifest)?;

    let manifest = Arc::new(
        manifest::load(&fetcher, &source, &cancel)
            .map_err(|e| explain(e, &source))
            .with_context(|| format!("Failed to load manifest {}", source))?,
    );
    let resolver = discovery::Resolver::new(&fetcher, &cancel).with_root(&manifest)?;
    let chains = discovery::execute(&resolver, &manifest)
        .map_err(|e| explain(e, &source))
        .context("Failed to discover extends chains")?;

    println!("{} Extends tree for: {}", emoji(output, "🌳", "[tree]"), source);
    let root = TreeNode {
        label: manifest.source.to_string(),
        children: chains
            .iter()
            .map(|chain| build_tree_node(chain, args.depth.unwrap_or(usize::MAX)))
            .collect(),
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_tree(&root, &mut handle).context("Failed to display tree")?;
    handle.flush()?;
    Ok(())
}

/// `leaf <- base <- root base` summary of a resolved app's chain
pub fn chain_label(app: &ResolvedApp) -> String {
    if app.chain.len() <= 1 {
        return "-".to_string();
    }
    app.chain
        .iter()
        .rev()
        .skip(1)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" <- ")
}

fn link_label(link: &ChainLink) -> String {
    format!("{} ({})", link.label(), link.app.kind_name())
}

/// Nest the links of a chain, leaf at the top
fn build_tree_node(chain: &[ChainLink], max_depth: usize) -> TreeNode {
    let mut links = chain.iter().rev();
    let Some(leaf) = links.next() else {
        return TreeNode {
            label: String::new(),
            children: vec![],
        };
    };

    let bases: Vec<&ChainLink> = links.take(max_depth).collect();
    let mut node: Option<TreeNode> = None;
    for base in bases.into_iter().rev() {
        node = Some(TreeNode {
            label: link_label(base),
            children: node.into_iter().collect(),
        });
    }

    TreeNode {
        label: format!("{} ({})", leaf.app.raw_name, leaf.app.kind_name()),
        children: node.into_iter().collect(),
    }
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: Write>(&self, f: &mut W, _style: &Style) -> io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.children)
    }
}
