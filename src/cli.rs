// src/cli.rs
// =============================================================================
// Command-line interface, defined with clap's derive API.
//
// Global options (config file, database override, JSON output) apply to every
// subcommand, so they are marked `global = true` and may appear anywhere on
// the command line.
// =============================================================================

use clap::{Parser, Subcommand};
use link_sweeper::import::DocumentFormat;
use link_sweeper::store::LinkId;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "link-sweeper",
    version,
    about = "Keeps a database of links healthy by probing them on a schedule",
    long_about = "link-sweeper periodically checks every stored link with a HEAD request, \
                  routes .onion hosts through a SOCKS proxy, and deletes links that keep failing."
)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides db_path from the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Output results in JSON format instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler until Ctrl-C, sweeping on the configured interval
    ///
    /// The first sweep starts immediately.
    Run,

    /// Run one full sweep now and print the tally
    Sweep,

    /// Probe a single URL without storing anything
    ///
    /// Example: link-sweeper probe http://example.onion
    Probe {
        /// URL to probe
        url: String,
    },

    /// Show job state and link statistics
    Status,

    /// List every stored link
    List,

    /// Add the links found in a Markdown or HTML document
    ///
    /// Example: link-sweeper import bookmarks.html --base-url https://example.com
    Import {
        /// Document to read links from
        file: PathBuf,

        /// Document format (guessed from the file extension when omitted)
        #[arg(long, value_enum)]
        format: Option<DocumentFormat>,

        /// Base URL for resolving relative links in HTML
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Delete a link (and its votes and comments) by id
    Remove {
        /// Link id as shown by `list`
        id: LinkId,
    },
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. What does `global = true` do?
//    - The flag is accepted before or after the subcommand name
//    - `link-sweeper --json sweep` and `link-sweeper sweep --json` are the same
//
// 2. Why Option<DocumentFormat> for --format?
//    - None means "guess from the file extension" (see main.rs)
//    - ValueEnum lets clap list the allowed values in --help
//
// 3. Why is `id` a LinkId and not a String?
//    - clap parses it for us and rejects "abc" with a usage error
//    - The handler never has to deal with a malformed id
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["link-sweeper", "sweep", "--json", "--db", "x.db"]);
        assert!(cli.json);
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        assert!(matches!(cli.command, Commands::Sweep));
    }

    #[test]
    fn test_import_arguments() {
        let cli = Cli::parse_from([
            "link-sweeper",
            "import",
            "links.txt",
            "--format",
            "markdown",
        ]);
        match cli.command {
            Commands::Import {
                file,
                format,
                base_url,
            } => {
                assert_eq!(file, PathBuf::from("links.txt"));
                assert_eq!(format, Some(DocumentFormat::Markdown));
                assert!(base_url.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_remove_requires_numeric_id() {
        assert!(Cli::try_parse_from(["link-sweeper", "remove", "abc"]).is_err());
        let cli = Cli::parse_from(["link-sweeper", "remove", "42"]);
        assert!(matches!(cli.command, Commands::Remove { id: 42 }));
    }
}
