use clap::{ArgAction, Args, Parser, Subcommand};
use geocrawl_cache::StorageId;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "geocrawl", version, about = "Catalogue the rasters of remote FTP, SFTP and HTTP trees")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON), on top of the user's own.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// More logging; repeat for even more.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run queued scans, one at a time, until interrupted.
    Worker,
    /// Register a remote tree and queue its first scan.
    ///
    /// Accepts ftp://, sftp:// and http(s):// URLs. Credentials go in the
    /// userinfo, the crawl root in the path.
    Add { url: String },
    /// Check that a remote tree can be reached, without registering it.
    Check { url: String },
    /// List every registered storage.
    List,
    /// Show a storage, including the state of its scan.
    Status { id: StorageId },
    /// Queue another scan of a storage.
    Rescan { id: StorageId },
    /// List the raster files found by the last successful scan.
    Items { id: StorageId },
    /// Download a file (or part of it) through the proxy.
    Fetch(FetchArgs),
    /// Forget a storage along with everything found on it.
    Remove { id: StorageId },
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    pub id: StorageId,
    /// Path of the file on the remote, as listed by `items`.
    pub path: String,
    /// Value of a `Range` header, e.g. `bytes=0-1023`.
    #[arg(long)]
    pub range: Option<String>,
    /// Only print the headers.
    #[arg(long, conflicts_with = "range")]
    pub head: bool,
    /// Write the body here instead of to stdout.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&["geocrawl", "worker"])]
    #[case(&["geocrawl", "-vv", "--config", "geocrawl.toml", "status", "3"])]
    #[case(&["geocrawl", "fetch", "3", "/tiles/a.jp2", "--range", "bytes=0-9", "-o", "a.part"])]
    fn test_parse(#[case] args: &[&str]) {
        Cli::try_parse_from(args).unwrap();
    }

    #[test]
    fn test_fetch_head_and_range_conflict() {
        let args = ["geocrawl", "fetch", "3", "/a.tif", "--head", "--range", "bytes=0-1"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["geocrawl", "items", "7", "-v"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Command::Items { id: 7 }));
    }
}
