use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

pub const SHPKG_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const SHPKG_BEFORE_HELP: &str = concat!(
    "shpkg ",
    env!("CARGO_PKG_VERSION"),
    " – Shared package provisioning for cluster jobs\n\n",
    "\x1b[1;36mCommands\x1b[0m\n",
    "  provision        Ensure the base runtime and auxiliary packages, then print bindings.\n",
    "  ensure           Ensure one archive is extracted into one destination.\n",
    "  status           Report absent/stale/valid for a destination without locking.\n",
    "  checksum         Print an archive digest in checksum-record format.\n",
);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = SHPKG_BEFORE_HELP,
    help_template = SHPKG_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct ShpkgCli {
    #[arg(
        short,
        long,
        help = "Suppress status lines (env/json bindings and errors still print)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        long,
        value_name = "SECS",
        help = "Give up waiting for a destination lock after SECS (overrides SHPKG_LOCK_TIMEOUT)",
        global = true
    )]
    pub lock_timeout: Option<u64>,
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(
        about = "Ensure the base runtime, then each --package in order.",
        override_usage = "shpkg provision [--base NAME=ARCHIVE:DEST[:CHECKSUM]] \
                          --package NAME=ARCHIVE:DEST[:CHECKSUM] ..."
    )]
    Provision(ProvisionArgs),
    #[command(about = "Ensure one archive is extracted into one destination.")]
    Ensure(TargetArgs),
    #[command(about = "Report whether a destination is absent, stale or valid (no lock).")]
    Status(TargetArgs),
    #[command(about = "Print the archive digest in checksum-record format.")]
    Checksum(ChecksumArgs),
}

impl CommandCli {
    pub fn name(&self) -> &'static str {
        match self {
            CommandCli::Provision(_) => "provision",
            CommandCli::Ensure(_) => "ensure",
            CommandCli::Status(_) => "status",
            CommandCli::Checksum(_) => "checksum",
        }
    }
}

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    #[arg(
        long,
        value_name = "NAME=ARCHIVE:DEST[:CHECKSUM]",
        help = "Base runtime, provisioned before every --package"
    )]
    pub base: Option<String>,
    #[arg(
        long = "package",
        value_name = "NAME=ARCHIVE:DEST[:CHECKSUM]",
        action = ArgAction::Append,
        help = "Auxiliary package; CHECKSUM defaults to DEST.sha256"
    )]
    pub packages: Vec<String>,
    #[arg(long, value_enum, default_value_t = BindingFormat::Plain)]
    pub format: BindingFormat,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,
    #[arg(value_name = "DEST")]
    pub dest: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        help = "Checksum record location (default: DEST.sha256)"
    )]
    pub checksum_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingFormat {
    /// `export NAME_DIR='dest'` lines for `eval`.
    Env,
    /// A JSON object of `NAME_DIR` to destination.
    Json,
    /// A status line followed by a package table.
    Plain,
}
