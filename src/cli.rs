use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fileconverter")]
#[command(author, version, about = "Convert video and image files between formats")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override the application data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one or more files to a target format
    Convert {
        /// Input files, converted in this order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Target format (e.g. mp4, webm, png)
        #[arg(short, long)]
        format: String,

        /// Directory for converted files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Custom output name, one per input file, in order
        #[arg(long = "name")]
        names: Vec<String>,

        /// Delete each input after it converts successfully
        #[arg(long = "move")]
        move_files: bool,

        /// Print the batch result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe a file and list the formats it can be converted to
    Formats {
        /// File to describe
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Report the active conversion backend
    CheckBackend,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
