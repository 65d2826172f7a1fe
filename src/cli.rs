use std::path::PathBuf;

use clap::Parser;

/// contrack — check containers for newer image tags in their registries
#[derive(Parser, Debug)]
#[command(name = "contrack", version, about)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/contrack/config.yaml)
    #[arg(long, env = "CT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Container inventory file (YAML or JSON list of name/image/state/labels)
    #[arg(long, env = "CT_CONTAINERS")]
    pub containers: Option<PathBuf>,

    /// Include stopped containers
    #[arg(short = 'a', long, env = "CT_INCLUDE_STOPPED", default_value_t = false)]
    pub include_stopped: bool,

    /// Columns to print, comma separated
    /// (container, status, detail, repository, image, domain, path, tag, update)
    #[arg(short, long, env = "CT_COLUMNS", value_delimiter = ',')]
    pub columns: Option<Vec<String>>,

    /// Number of concurrent tag fetches
    #[arg(long, env = "CT_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Hide the progress bar
    #[arg(long, env = "CT_NO_PROGRESS", default_value_t = false)]
    pub no_progress: bool,

    /// Debug output
    #[arg(short, long, env = "CT_DEBUG", default_value_t = false)]
    pub debug: bool,
}
