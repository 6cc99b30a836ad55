use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum RetryMode {
    /// No retry callback is registered
    None,
    /// Park failed sources until connectivity "comes back"
    Defer,
    /// Swap failed sources for `--alternate`
    Alternate,
}

/// Binds image sources to in-memory elements through the cache binding.
#[derive(Debug, Parser)]
#[command(name = "imgcache-demo")]
pub(crate) struct Args {
    /// Sources to bind, one element each
    #[arg(required = true)]
    pub(crate) sources: Vec<String>,

    /// Bind as background images instead of image sources
    #[arg(long)]
    pub(crate) background: bool,

    #[arg(long, default_value = "/local")]
    pub(crate) local_root: String,

    /// Source already present in the cache (repeatable)
    #[arg(long = "cached")]
    pub(crate) cached: Vec<String>,

    /// Source whose download fails (repeatable)
    #[arg(long = "fail")]
    pub(crate) fail: Vec<String>,

    #[arg(long)]
    pub(crate) disable_cache: bool,

    #[arg(long, value_enum, default_value_t = RetryMode::None)]
    pub(crate) retry: RetryMode,

    #[arg(long, default_value = "placeholder.jpg")]
    pub(crate) alternate: String,

    /// Extra engine option as name=json (repeatable)
    #[arg(long = "option")]
    pub(crate) options: Vec<String>,

    /// JSON file holding a cache config
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
}
