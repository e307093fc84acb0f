use std::{ffi::OsString, process::ExitCode};

use clap::{Parser, error::ErrorKind};
use log::error;
use reel_engine::Config;

/// Generates a mascot video or image through a generative media API.
///
/// Every option can also be set through the environment variable shown in its help.
#[derive(Debug, clap::Parser)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,
}

impl Cli {
    /// Help and version output exit right away. Any other parse error is a
    /// failed run, reported through the log.
    pub fn from_args<I, T>(args: I) -> Result<Self, ExitCode>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|e| match e.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => e.exit(),
            _ => {
                error!("Invalid configuration: {e}");
                ExitCode::FAILURE
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_values_fail_the_run() {
        assert!(Cli::from_args(["reelgen", "--duration", "x"]).is_err());
        assert!(Cli::from_args(["reelgen", "--poll-budget-secs", "soon"]).is_err());
        assert!(Cli::from_args(["reelgen", "--no-such-flag"]).is_err());
    }

    #[test]
    fn well_formed_arguments_parse() {
        let cli = Cli::from_args(["reelgen", "--duration", "5", "--seed", ""]).unwrap();
        assert_eq!(cli.config.duration, 5);
    }
}
