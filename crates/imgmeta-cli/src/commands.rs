use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use imgmeta_store::{DurableMetaDriver, MetaConfig, MetaDriver};
use imgmeta_types::{FragmentRecord, MetaInfo, ObjectSummary};
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.data_dir)?;
    let driver = DurableMetaDriver::open(&config).with_context(|| {
        format!("opening metadata store in {}", config.storage.data_dir.display())
    })?;
    let format = cli.format;

    match cli.command {
        Command::Put(args) => cmd_put(&driver, args, format),
        Command::Mkdir(args) => cmd_mkdir(&driver, args, format),
        Command::Rm(args) => cmd_rm(&driver, args, format),
        Command::Ls(args) => cmd_ls(&driver, args, format),
        Command::Stat(args) => cmd_stat(&driver, args, format),
        Command::Locate(args) => cmd_locate(&driver, args, format),
        Command::Summary(args) => cmd_summary(&driver, args, format),
        Command::Compact => cmd_compact(&driver, format),
    }
}

/// Defaults, then the config file, then the `--data-dir` override.
fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<MetaConfig> {
    let mut config = match path {
        Some(path) => MetaConfig::load(path)?,
        None => MetaConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    Ok(config)
}

fn cmd_put(driver: &dyn MetaDriver, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut record = FragmentRecord::new(args.index, args.start, args.end, args.group, args.file);
    if args.last {
        record = record.into_last();
    }
    let outcome = driver.store_meta_info(&MetaInfo::fragment(args.path.as_str(), record))?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "path": args.path,
            "stored": outcome.is_inserted(),
            "record": record,
        })),
        OutputFormat::Text if outcome.is_inserted() => {
            println!("{} Stored {} {}", "✓".green().bold(), args.path.bold(), fmt_record(&record));
            Ok(())
        }
        OutputFormat::Text => {
            println!("{} already stored", fmt_record(&record));
            Ok(())
        }
    }
}

fn cmd_mkdir(driver: &DurableMetaDriver, args: PathArgs, format: OutputFormat) -> anyhow::Result<()> {
    let codec = driver.codec();
    let dir = codec.normalize(&args.path)?;
    let Some(marker) = codec.marker_for(&dir) else {
        bail!("{} cannot carry a directory marker", dir);
    };
    let outcome = driver.store_meta_info(&MetaInfo::marker(marker.as_str()))?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "directory": dir.as_str(),
            "marker": marker.as_str(),
            "created": outcome.is_inserted(),
        })),
        OutputFormat::Text => {
            if outcome.is_inserted() {
                println!("{} Created directory {}", "✓".green().bold(), dir.as_str().bold());
            } else {
                println!("Directory {} already registered", dir.as_str().bold());
            }
            Ok(())
        }
    }
}

fn cmd_rm(driver: &dyn MetaDriver, args: PathArgs, format: OutputFormat) -> anyhow::Result<()> {
    let removed = driver.delete_file_meta_info(&args.path)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "path": args.path, "removed": removed })),
        OutputFormat::Text => {
            if removed == 0 {
                println!("Nothing stored at {}", args.path.bold());
            } else {
                println!("{} Removed {} entries at {}", "✓".green().bold(), removed, args.path.bold());
            }
            Ok(())
        }
    }
}

fn cmd_ls(driver: &dyn MetaDriver, args: LsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let children = driver.get_directory_info(&args.path)?;
    match format {
        OutputFormat::Json => print_json(&children),
        OutputFormat::Text => {
            for name in &children {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn cmd_stat(driver: &dyn MetaDriver, args: StatArgs, format: OutputFormat) -> anyhow::Result<()> {
    let records = driver.get_file_meta_info(&args.path, args.detail)?;
    match format {
        OutputFormat::Json => print_json(&records),
        OutputFormat::Text => {
            println!("{}", args.path.bold());
            for record in &records {
                println!("  {}", fmt_record(record));
            }
            Ok(())
        }
    }
}

fn cmd_locate(driver: &dyn MetaDriver, args: LocateArgs, format: OutputFormat) -> anyhow::Result<()> {
    let record = driver.get_fragment_meta_info(&args.path, args.index, args.start, args.end)?;
    match format {
        OutputFormat::Json => print_json(&record),
        OutputFormat::Text => {
            println!("{}", fmt_record(&record));
            Ok(())
        }
    }
}

fn cmd_summary(driver: &dyn MetaDriver, args: PathArgs, format: OutputFormat) -> anyhow::Result<()> {
    let summary = driver.get_object_summary(&args.path)?;
    match format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Text => {
            print_summary(&args.path, &summary);
            Ok(())
        }
    }
}

fn cmd_compact(driver: &DurableMetaDriver, format: OutputFormat) -> anyhow::Result<()> {
    let stats = driver.compact()?;
    match format {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Text => {
            println!(
                "{} Compacted log: {} records, {} → {} bytes",
                "✓".green().bold(),
                stats.records,
                stats.bytes_before,
                stats.bytes_after
            );
            Ok(())
        }
    }
}

fn print_summary(path: &str, summary: &ObjectSummary) {
    let state = if summary.is_fully_stored() {
        "complete".green()
    } else if summary.complete {
        "complete, with gaps".yellow()
    } else {
        "incomplete".yellow()
    };
    println!("{} ({})", path.bold(), state);
    println!("  Fragments: {}", summary.fragment_count);
    println!("  Covered: {} bytes", summary.covered_bytes);
    match summary.size {
        Some(size) => println!("  Size: {size} bytes"),
        None => println!("  Size: {}", "unknown".dimmed()),
    }
}

fn fmt_record(record: &FragmentRecord) -> String {
    let mut out = format!(
        "#{} [{}, {}) group {} file {}",
        record.index, record.start, record.end, record.group_id, record.file_id
    );
    if record.is_last {
        out.push_str(&format!(" {}", "last".cyan()));
    }
    out
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run(dir: &Path, args: &[&str]) -> anyhow::Result<()> {
        let mut argv = vec!["imgmeta", "--data-dir", dir.to_str().unwrap()];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn data_dir_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("imgmeta.toml");
        std::fs::write(&file, "[storage]\ndata_dir = \"/from/file\"\n[index]\nshards = 4\n").unwrap();

        let config = load_config(Some(file.as_path()), None).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/from/file"));

        let config = load_config(Some(file.as_path()), Some(dir.path().into())).unwrap();
        assert_eq!(config.storage.data_dir, dir.path());
        assert_eq!(config.index.shards, 4);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(load_config(Some(Path::new("/no/such/imgmeta.toml")), None).is_err());
    }

    #[test]
    fn commands_share_state_through_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        run(d, &["put", "/img/1", "--index", "0", "--start", "0", "--end", "100"]).unwrap();
        run(d, &["put", "/img/1", "--index", "1", "--start", "100", "--end", "200", "--last"]).unwrap();
        run(d, &["mkdir", "/img/empty"]).unwrap();
        run(d, &["--format", "json", "locate", "/img/1", "--start", "150", "--end", "160"]).unwrap();
        run(d, &["compact"]).unwrap();

        let driver = DurableMetaDriver::open(&load_config(None, Some(d.into())).unwrap()).unwrap();
        assert_eq!(driver.get_directory_info("/img").unwrap(), vec!["1", "empty"]);
        assert!(driver.is_complete("/img/1").unwrap());
    }

    #[test]
    fn failing_command_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        run(d, &["put", "/a", "--index", "0", "--start", "0", "--end", "10"]).unwrap();
        assert!(run(d, &["put", "/a", "--index", "1", "--start", "5", "--end", "15"]).is_err());
        assert!(run(d, &["stat", "/missing"]).is_err());
        assert!(run(d, &["mkdir", "/"]).is_err());
    }
}
