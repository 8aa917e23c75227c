//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Incrementally mirror an authenticated online library to local text files.
///
/// Each run continues where the previous one stopped and fetches every item
/// up to the newest one listed on the library index.
#[derive(Parser, Debug)]
#[command(name = "library-mirror")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch every item between the resume point and the newest listed item
    Sync(SyncArgs),

    /// Fetch one item and print its normalized text (prompts for missing arguments)
    Fetch(FetchArgs),
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Session token (bare value or `NAME=value`); prompted for when omitted
    #[arg(short, long)]
    pub token: Option<String>,

    /// Start from the first item and replace items already stored
    #[arg(long)]
    pub overwrite: bool,

    /// Parallel fetch workers (1-64)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub workers: Option<u8>,

    /// First identifier to fetch (default: resume point)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub start: Option<u64>,

    /// Exclusive upper identifier (default: newest listed item + 1)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub end: Option<u64>,

    /// Library root directory
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Library base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Store raw extracted text instead of normalized text
    #[arg(long)]
    pub raw_text: bool,

    /// Fail instead of prompting when the session expires
    #[arg(long)]
    pub no_prompt: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct FetchArgs {
    /// Session token (bare value or `NAME=value`); prompted for when omitted
    pub token: Option<String>,

    /// Item identifier or full item link; prompted for when omitted
    pub item: Option<String>,

    /// Library base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Print raw extracted text instead of normalized text
    #[arg(long)]
    pub raw_text: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_args(argv: &[&str]) -> SyncArgs {
        match Args::try_parse_from(argv).unwrap().command {
            Command::Sync(args) => args,
            Command::Fetch(_) => panic!("expected sync subcommand"),
        }
    }

    #[test]
    fn test_cli_sync_defaults() {
        let args = sync_args(&["library-mirror", "sync"]);
        assert!(!args.overwrite);
        assert_eq!(args.workers, None);
        assert_eq!(args.start, None);
        assert_eq!(args.end, None);
        assert!(!args.raw_text);
        assert!(!args.no_prompt);
        assert!(!args.json);
    }

    #[test]
    fn test_cli_subcommand_is_required() {
        let result = Args::try_parse_from(["library-mirror"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["library-mirror", "-v", "sync"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["library-mirror", "sync", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["library-mirror", "-q", "sync"]).unwrap();
        assert!(args.quiet);

        let args = Args::try_parse_from(["library-mirror", "sync", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["library-mirror", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let result = Args::try_parse_from(["library-mirror", "--version"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let result = Args::try_parse_from(["library-mirror", "sync", "--invalid-flag"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_workers_short_and_long_flag() {
        assert_eq!(sync_args(&["library-mirror", "sync", "-w", "8"]).workers, Some(8));
        assert_eq!(
            sync_args(&["library-mirror", "sync", "--workers", "64"]).workers,
            Some(64)
        );
    }

    #[test]
    fn test_cli_workers_out_of_range_rejected() {
        for value in ["0", "65"] {
            let err = Args::try_parse_from(["library-mirror", "sync", "-w", value]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_start_zero_rejected() {
        let err = Args::try_parse_from(["library-mirror", "sync", "--start", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_sync_all_flags() {
        let args = sync_args(&[
            "library-mirror",
            "sync",
            "--token",
            "PHPSESSID=abc",
            "--overwrite",
            "--start",
            "10",
            "--end",
            "20",
            "--root",
            "/tmp/lib",
            "--base-url",
            "http://localhost/library/",
            "--raw-text",
            "--no-prompt",
            "--json",
        ]);
        assert_eq!(args.token.as_deref(), Some("PHPSESSID=abc"));
        assert!(args.overwrite);
        assert_eq!(args.start, Some(10));
        assert_eq!(args.end, Some(20));
        assert_eq!(args.root, Some(PathBuf::from("/tmp/lib")));
        assert_eq!(args.base_url.as_deref(), Some("http://localhost/library/"));
        assert!(args.raw_text);
        assert!(args.no_prompt);
        assert!(args.json);
    }

    #[test]
    fn test_cli_fetch_positional_args() {
        let args = Args::try_parse_from(["library-mirror", "fetch", "tok", "42"]).unwrap();
        match args.command {
            Command::Fetch(fetch) => {
                assert_eq!(fetch.token.as_deref(), Some("tok"));
                assert_eq!(fetch.item.as_deref(), Some("42"));
                assert!(!fetch.raw_text);
            }
            Command::Sync(_) => panic!("expected fetch subcommand"),
        }
    }

    #[test]
    fn test_cli_fetch_arguments_are_optional() {
        let args = Args::try_parse_from(["library-mirror", "fetch"]).unwrap();
        match args.command {
            Command::Fetch(fetch) => {
                assert_eq!(fetch.token, None);
                assert_eq!(fetch.item, None);
            }
            Command::Sync(_) => panic!("expected fetch subcommand"),
        }

        let args = Args::try_parse_from(["library-mirror", "fetch", "tok"]).unwrap();
        match args.command {
            Command::Fetch(fetch) => {
                assert_eq!(fetch.token.as_deref(), Some("tok"));
                assert_eq!(fetch.item, None);
            }
            Command::Sync(_) => panic!("expected fetch subcommand"),
        }
    }
}
