use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "tfbackend",
    about = "Terraform HTTP remote state backend with locking and encryption at rest",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the state backend server.
    Serve {
        /// YAML config file. Environment variables override its values.
        #[arg(long, short, env = "TF_BACKEND_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print a random base64 key for KMS_KEY.
    GenerateKey,
}
