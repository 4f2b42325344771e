//! CLI argument definitions.

use clap::Parser;
use netsweep_engine::CommandKind;
use std::path::PathBuf;

/// Top-level CLI parser for `netsweep`.
#[derive(Debug, Parser)]
#[command(
    name = "netsweep",
    version,
    about = "Run network diagnostics against many targets at once",
    after_help = "A command after `--` replaces --kind; {target}, {host}, {user} and {port} are substituted per target."
)]
pub struct Cli {
    /// Hosts or addresses to run against.
    pub targets: Vec<String>,

    /// Read more targets from a file, one per line.
    #[arg(short = 'f', long, value_name = "PATH")]
    pub targets_file: Option<PathBuf>,

    /// Diagnostic to run: ping, continuous-ping, traceroute, whois, nslookup.
    #[arg(short, long, default_value = "ping")]
    pub kind: CommandKind,

    /// Config file (default: $NETSWEEP_CONFIG or /etc/netsweep/config.toml).
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum targets running at once.
    #[arg(short = 'j', long, value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Per-target timeout.
    #[arg(short, long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Time a stopped command gets before it is killed.
    #[arg(long, value_name = "MILLIS")]
    pub grace_ms: Option<u64>,

    /// Write the JSON-lines run report here (`-` for stdout).
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Write all output, grouped by target, to one file.
    #[arg(long, value_name = "PATH")]
    pub transcript: Option<PathBuf>,

    /// Save each target's output to <DIR>/<target>.log.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only log warnings and errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Device inventory (TOML, or YAML for .yml/.yaml) to select targets from.
    #[arg(long, value_name = "PATH")]
    pub inventory: Option<PathBuf>,

    /// Inventory site.
    #[arg(long, requires = "inventory")]
    pub site: Option<String>,

    /// Inventory category within the site.
    #[arg(long, requires = "inventory")]
    pub category: Option<String>,

    /// Inventory host, or `all`.
    #[arg(long, requires = "inventory")]
    pub host: Option<String>,

    /// Command template to run instead of --kind.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}
