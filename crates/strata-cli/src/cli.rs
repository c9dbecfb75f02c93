use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Strata object store: pools, objects, xattrs and omaps on a local cluster",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Cluster configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the cluster journal; overrides the config file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Pool for object commands
    #[arg(short, long, global = true)]
    pub pool: Option<String>,

    /// Object locator key used for placement
    #[arg(long, global = true)]
    pub locator: Option<String>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a pool
    Mkpool(PoolArgs),
    /// Delete a pool and everything in it
    Rmpool(PoolArgs),
    /// List pools
    Lspools,
    /// Allocate a pool snapshot id
    Mksnap(PoolArgs),
    /// Show pool and cluster usage
    Df,
    /// List objects in the pool
    Ls,
    /// Store a file (or stdin with `-`) as an object
    Put(PutArgs),
    /// Append a file (or stdin with `-`) to an object
    Append(PutArgs),
    /// Fetch an object into a file (or stdout with `-`)
    Get(GetArgs),
    /// Remove an object
    Rm(ObjectArgs),
    /// Show object size and modification time
    Stat(ObjectArgs),
    /// Resize an object
    Truncate(TruncateArgs),
    /// Set an extended attribute
    Setxattr(SetXattrArgs),
    /// Print an extended attribute
    Getxattr(XattrArgs),
    /// Remove an extended attribute
    Rmxattr(XattrArgs),
    /// List extended attributes
    Listxattr(ObjectArgs),
    /// Set an omap value
    Setomapval(SetOmapArgs),
    /// Print an omap value
    Getomapval(OmapKeyArgs),
    /// Remove an omap key
    Rmomapkey(OmapKeyArgs),
    /// List omap keys and values
    Listomapvals(ListOmapArgs),
    /// Call an object class method
    Exec(ExecArgs),
}

#[derive(Args)]
pub struct PoolArgs {
    pub name: String,
}

#[derive(Args)]
pub struct ObjectArgs {
    pub object: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub object: String,
    pub file: PathBuf,
}

#[derive(Args)]
pub struct GetArgs {
    pub object: String,
    pub file: PathBuf,
    #[arg(long, default_value = "0")]
    pub offset: u64,
    /// Bytes to read; 0 reads to the end
    #[arg(long, default_value = "0")]
    pub length: u64,
    /// Read as of this snapshot id
    #[arg(long)]
    pub snap: Option<u64>,
}

#[derive(Args)]
pub struct TruncateArgs {
    pub object: String,
    pub size: u64,
}

#[derive(Args)]
pub struct SetXattrArgs {
    pub object: String,
    pub name: String,
    pub value: String,
}

#[derive(Args)]
pub struct XattrArgs {
    pub object: String,
    pub name: String,
}

#[derive(Args)]
pub struct SetOmapArgs {
    pub object: String,
    pub key: String,
    pub value: String,
}

#[derive(Args)]
pub struct OmapKeyArgs {
    pub object: String,
    pub key: String,
}

#[derive(Args)]
pub struct ListOmapArgs {
    pub object: String,
    #[arg(long)]
    pub start_after: Option<String>,
    #[arg(short = 'n', long, default_value = "512")]
    pub max: u64,
}

#[derive(Args)]
pub struct ExecArgs {
    pub object: String,
    pub class: String,
    pub method: String,
    #[arg(default_value = "")]
    pub input: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mkpool() {
        let cli = Cli::try_parse_from(["strata", "mkpool", "data"]).unwrap();
        if let Command::Mkpool(args) = cli.command {
            assert_eq!(args.name, "data");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put_with_pool() {
        let cli = Cli::try_parse_from(["strata", "-p", "data", "put", "obj", "/tmp/in"]).unwrap();
        assert_eq!(cli.pool, Some("data".into()));
        if let Command::Put(args) = cli.command {
            assert_eq!(args.object, "obj");
            assert_eq!(args.file, PathBuf::from("/tmp/in"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_get_range() {
        let cli = Cli::try_parse_from([
            "strata", "get", "obj", "-", "--offset", "4", "--length", "8", "--snap", "3",
        ])
        .unwrap();
        if let Command::Get(args) = cli.command {
            assert_eq!((args.offset, args.length, args.snap), (4, 8, Some(3)));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "strata", "lspools", "--data-dir", "/var/strata", "--locator", "shared",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/var/strata")));
        assert_eq!(cli.locator, Some("shared".into()));
    }

    #[test]
    fn parse_listomapvals_defaults() {
        let cli = Cli::try_parse_from(["strata", "listomapvals", "obj"]).unwrap();
        if let Command::Listomapvals(args) = cli.command {
            assert_eq!(args.max, 512);
            assert!(args.start_after.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_exec_without_input() {
        let cli = Cli::try_parse_from(["strata", "exec", "obj", "hello", "say_hello"]).unwrap();
        if let Command::Exec(args) = cli.command {
            assert_eq!(args.input, "");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["strata", "--format", "json", "df"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["strata", "--verbose", "ls"]).unwrap();
        assert!(cli.verbose);
    }
}
