use clap::{Parser, ValueEnum};

/// Which version components a stamp increments and which it zeroes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Default)]
pub enum Strategy {
    /// Increment build, then revision
    #[default]
    #[value(alias = "fullrevision")]
    FullRevision,
    /// Increment revision only
    #[value(alias = "revisiononly")]
    RevisionOnly,
    /// Increment minor and zero revision
    #[value(alias = "newminor")]
    NewMinor,
    /// Increment major and zero minor and revision
    #[value(alias = "newmajor")]
    NewMajor,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(author, version, about, bin_name = "stamp")]
pub struct Arguments {
    /// Root folder to scan for *.??proj files
    #[arg(default_value = "./")]
    pub folder: String,
    #[arg(long, short, value_enum, ignore_case = true, default_value_t = Strategy::FullRevision)]
    pub strategy: Strategy,
    /// Force the build component to 0 after the strategy is applied
    #[arg(long, short)]
    pub reset_build: bool,
    /// Only scan the top level of the folder
    #[arg(long)]
    pub no_recurse: bool,
    /// Abort the whole scan on the first project file that fails
    #[arg(long)]
    pub fail_fast: bool,
    /// Report the new versions without writing any file
    #[arg(long, short = 'n')]
    pub dry_run: bool,
    #[arg(long, short, value_enum, ignore_case = true, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[arg(long, short)]
    pub verbose: bool,
}
