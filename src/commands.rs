//! CLI command definitions
//!
//! Defines the clap commands for the diagnostic tool runner.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available diagnostic tools
    #[command(alias = "ls")]
    List,

    /// List the tests of a tool
    Tests {
        /// Tool id
        tool: String,
    },

    /// Run all tests of a tool, or one named test
    Run {
        /// Tool id
        tool: String,

        /// Test id (default: all tests of the tool)
        test: Option<String>,

        /// Print the output of each test
        #[arg(long, short)]
        verbose: bool,
    },

    /// Save the report of a tool to a file
    Report {
        /// Tool id
        tool: String,

        /// Destination file
        file: PathBuf,
    },

    /// Run the management service backed by local descriptor files
    Serve,
}
