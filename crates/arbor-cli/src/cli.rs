use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor namespace administration",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Service configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build or update tables of contents
    #[command(subcommand)]
    Toc(TocCommand),
    /// Map between domains and container paths, create or delete domains
    #[command(subcommand)]
    Domain(DomainCommand),
    /// List the links of a group inside a domain
    Ls(LsArgs),
    /// Show or change access control entries
    #[command(subcommand)]
    Acl(AclCommand),
    /// Copy an existing container into the namespace
    Import(ImportArgs),
    /// Drop and rebuild the sidecar index of a read-only container
    Reindex(ReindexArgs),
    /// Work with wire type schemas
    #[command(subcommand)]
    Type(TypeCommand),
    /// Keep tables of contents current until interrupted
    Watch,
}

#[derive(Subcommand)]
pub enum TocCommand {
    /// Create the TOC for a directory (the data root by default)
    Build { dir: Option<PathBuf> },
    /// Add or remove the TOC entry for one container path
    Update { path: PathBuf },
}

#[derive(Subcommand)]
pub enum DomainCommand {
    /// Container path of a domain
    Path { domain: String },
    /// Domain of a container path
    Name { path: PathBuf },
    /// Create an empty domain
    Create {
        domain: String,
        /// Owner of the new domain
        #[arg(long)]
        owner: Option<String>,
    },
    /// Delete a domain and its TOC entry
    Delete {
        domain: String,
        /// User performing the deletion
        #[arg(long = "as")]
        user: String,
    },
}

#[derive(Args)]
pub struct LsArgs {
    pub domain: String,
    #[arg(default_value = "/")]
    pub h5path: String,
}

#[derive(Subcommand)]
pub enum AclCommand {
    /// Effective ACL for one user, or every explicit entry
    Get {
        domain: String,
        #[arg(long)]
        user: Option<String>,
        /// Object path inside the domain
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Grant or revoke permissions; `default` names the fallback entry
    Set {
        domain: String,
        #[arg(long)]
        user: String,
        /// Comma-separated permissions, or `all`
        #[arg(long)]
        grant: Option<String>,
        #[arg(long)]
        revoke: Option<String>,
        #[arg(long, default_value = "/")]
        path: String,
    },
}

#[derive(Args)]
pub struct ImportArgs {
    pub file: PathBuf,
    pub domain: String,
}

#[derive(Args)]
pub struct ReindexArgs {
    pub file: PathBuf,
}

#[derive(Subcommand)]
pub enum TypeCommand {
    /// Decode a wire schema and print its shaped form
    Check { json: String },
}
