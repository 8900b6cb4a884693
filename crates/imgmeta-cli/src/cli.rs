use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "imgmeta",
    about = "imgmeta — where every fragment of every stored object lives",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory, overriding `storage.data_dir`
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

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
    /// Record one fragment of an object
    Put(PutArgs),
    /// Register an explicit (possibly empty) directory
    Mkdir(PathArgs),
    /// Delete an object's fragments and its directory marker
    Rm(PathArgs),
    /// List the immediate children of a directory
    Ls(LsArgs),
    /// Show an object's fragments
    Stat(StatArgs),
    /// Find the fragment holding an index or byte range
    Locate(LocateArgs),
    /// Show completeness and coverage of an object
    Summary(PathArgs),
    /// Rewrite the metadata log as a snapshot
    Compact,
}

#[derive(Args)]
pub struct PutArgs {
    pub path: String,
    #[arg(long)]
    pub index: u64,
    #[arg(long)]
    pub start: u64,
    #[arg(long)]
    pub end: u64,
    #[arg(long, default_value = "0")]
    pub group: u16,
    #[arg(long, default_value = "0")]
    pub file: u64,
    /// Mark this as the object's final fragment
    #[arg(long)]
    pub last: bool,
}

#[derive(Args)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Args)]
pub struct StatArgs {
    pub path: String,
    /// List every fragment instead of the tail only
    #[arg(long)]
    pub detail: bool,
}

#[derive(Args)]
pub struct LocateArgs {
    pub path: String,
    #[arg(long, default_value = "0")]
    pub index: u64,
    #[arg(long, default_value = "0")]
    pub start: u64,
    #[arg(long, default_value = "0")]
    pub end: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_put() {
        let cli = Cli::try_parse_from([
            "imgmeta", "put", "/img/1", "--index", "2", "--start", "250", "--end", "300",
            "--group", "7", "--file", "42", "--last",
        ])
        .unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.path, "/img/1");
            assert_eq!((args.index, args.start, args.end), (2, 250, 300));
            assert_eq!((args.group, args.file), (7, 42));
            assert!(args.last);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put_defaults_ids() {
        let cli = Cli::try_parse_from([
            "imgmeta", "put", "/a", "--index", "0", "--start", "0", "--end", "10",
        ])
        .unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!((args.group, args.file), (0, 0));
            assert!(!args.last);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put_requires_range() {
        assert!(Cli::try_parse_from(["imgmeta", "put", "/a", "--index", "0"]).is_err());
    }

    #[test]
    fn parse_ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["imgmeta", "ls"]).unwrap();
        if let Command::Ls(args) = cli.command {
            assert_eq!(args.path, "/");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_stat_detail() {
        let cli = Cli::try_parse_from(["imgmeta", "stat", "/img/1", "--detail"]).unwrap();
        if let Command::Stat(args) = cli.command {
            assert!(args.detail);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_locate_range() {
        let cli = Cli::try_parse_from(["imgmeta", "locate", "/img/1", "--start", "120", "--end", "130"]).unwrap();
        if let Command::Locate(args) = cli.command {
            assert_eq!((args.index, args.start, args.end), (0, 120, 130));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_compact() {
        let cli = Cli::try_parse_from(["imgmeta", "compact"]).unwrap();
        assert!(matches!(cli.command, Command::Compact));
    }

    #[test]
    fn parse_global_options() {
        let cli = Cli::try_parse_from([
            "imgmeta", "rm", "/a", "--data-dir", "/tmp/meta", "--config", "m.toml", "-v", "--format", "json",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/meta")));
        assert_eq!(cli.config, Some(PathBuf::from("m.toml")));
        assert!(matches!(cli.command, Command::Rm(_)));
    }
}
