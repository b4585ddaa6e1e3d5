//! CLI argument parsing.

use std::path::PathBuf;

use argh::FromArgs;

#[derive(Clone, Debug, FromArgs)]
#[argh(description = "Replays a batch event script against a batch tracker")]
pub(crate) struct Args {
    /// Path to the config toml.  Defaults are used if not given.
    #[argh(option, short = 'c', description = "path to configuration")]
    pub config: Option<PathBuf>,

    /// Other generic overrides to the config toml.
    /// Will be used, for example, as `-o tracker.invalid_retention_secs=60`
    #[argh(option, short = 'o', description = "generic config overrides")]
    pub overrides: Vec<String>,

    /// Dump the tracker metrics after the replay.
    #[argh(switch, description = "print metrics when done")]
    pub print_metrics: bool,

    #[argh(positional, description = "path to the JSON lines script")]
    pub script: PathBuf,
}
