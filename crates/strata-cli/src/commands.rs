use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use strata_client::{IoContext, ReadOp, Session};
use strata_cluster::{ClusterConfig, LocalCluster};
use strata_types::{PoolStat, SnapId};
use tracing::debug;

use crate::cli::*;

const DEFAULT_DATA_DIR: &str = ".strata";

/// An open cluster plus the global flags object commands need.
struct Env {
    session: Session,
    format: OutputFormat,
    pool: Option<String>,
    locator: Option<String>,
}

impl Env {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => ClusterConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ClusterConfig::default(),
        };
        if let Some(dir) = &cli.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if config.data_dir.is_none() {
            config.data_dir = Some(PathBuf::from(DEFAULT_DATA_DIR));
        }
        debug!(data_dir = ?config.data_dir, "opening cluster");
        let cluster = Arc::new(LocalCluster::open(config).context("opening cluster")?);
        Ok(Self {
            session: Session::connect(cluster),
            format: cli.format.clone(),
            pool: cli.pool.clone(),
            locator: cli.locator.clone(),
        })
    }

    fn io_context(&self) -> anyhow::Result<IoContext> {
        let Some(pool) = &self.pool else {
            bail!("no pool given; pass --pool");
        };
        let mut ctx = self.session.io_context(pool)?;
        ctx.set_locator_key(self.locator.as_deref());
        Ok(ctx)
    }

    fn json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print `value` as JSON, or run `text` for the human format.
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        if self.json() {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let env = Env::open(&cli)?;
    match cli.command {
        Command::Mkpool(args) => cmd_mkpool(&env, args),
        Command::Rmpool(args) => cmd_rmpool(&env, args),
        Command::Lspools => cmd_lspools(&env),
        Command::Mksnap(args) => cmd_mksnap(&env, args),
        Command::Df => cmd_df(&env),
        Command::Ls => cmd_ls(&env),
        Command::Put(args) => cmd_put(&env, args, false),
        Command::Append(args) => cmd_put(&env, args, true),
        Command::Get(args) => cmd_get(&env, args),
        Command::Rm(args) => {
            env.io_context()?.remove(&args.object)?;
            done(&env, "removed", &args.object)
        }
        Command::Stat(args) => cmd_stat(&env, args),
        Command::Truncate(args) => {
            env.io_context()?.truncate(&args.object, args.size)?;
            done(&env, "truncated", &args.object)
        }
        Command::Setxattr(args) => {
            env.io_context()?
                .set_xattr(&args.object, &args.name, args.value.as_bytes())?;
            done(&env, "set", &format!("{}@{}", args.name, args.object))
        }
        Command::Getxattr(args) => {
            let value = env.io_context()?.get_xattr(&args.object, &args.name)?;
            print_value(&env, &args.name, &value)
        }
        Command::Rmxattr(args) => {
            env.io_context()?.remove_xattr(&args.object, &args.name)?;
            done(&env, "removed", &format!("{}@{}", args.name, args.object))
        }
        Command::Listxattr(args) => cmd_listxattr(&env, args),
        Command::Setomapval(args) => {
            env.io_context()?
                .omap_set(&args.object, [(args.key.as_str(), args.value.as_bytes())])?;
            done(&env, "set", &format!("{}@{}", args.key, args.object))
        }
        Command::Getomapval(args) => cmd_getomapval(&env, args),
        Command::Rmomapkey(args) => {
            env.io_context()?
                .omap_remove_keys(&args.object, [args.key.as_str()])?;
            done(&env, "removed", &format!("{}@{}", args.key, args.object))
        }
        Command::Listomapvals(args) => cmd_listomapvals(&env, args),
        Command::Exec(args) => {
            let output = env.io_context()?.exec(
                &args.object,
                &args.class,
                &args.method,
                args.input.as_bytes(),
            )?;
            print_value(&env, &format!("{}.{}", args.class, args.method), &output)
        }
    }
}

/// Render bytes as text when printable, hex otherwise.
fn render(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if !s.chars().any(|c| c.is_control() && c != '\n' && c != '\t') => s.to_string(),
        _ => format!("0x{}", hex::encode(bytes)),
    }
}

fn done(env: &Env, verb: &str, what: &str) -> anyhow::Result<()> {
    env.emit(&json!({ "status": verb, "target": what }), || {
        println!("{} {} {}", "✓".green().bold(), verb, what.bold());
    })
}

fn print_value(env: &Env, name: &str, value: &[u8]) -> anyhow::Result<()> {
    env.emit(
        &json!({ "name": name, "value": render(value), "hex": hex::encode(value) }),
        || println!("{}", render(value)),
    )
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        std::io::stdin().read_to_end(&mut data)?;
        Ok(data)
    } else {
        fs::read(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn cmd_mkpool(env: &Env, args: PoolArgs) -> anyhow::Result<()> {
    let id = env.session.create_pool(&args.name)?;
    env.emit(&json!({ "pool": args.name, "id": id }), || {
        println!("{} Created pool {} ({})", "✓".green().bold(), args.name.yellow(), id);
    })
}

fn cmd_rmpool(env: &Env, args: PoolArgs) -> anyhow::Result<()> {
    env.session.delete_pool(&args.name)?;
    env.emit(&json!({ "pool": args.name, "deleted": true }), || {
        println!("{} Deleted pool {}", "✓".green().bold(), args.name.yellow());
    })
}

fn cmd_lspools(env: &Env) -> anyhow::Result<()> {
    let pools = env.session.list_pools()?;
    env.emit(&pools, || {
        if pools.is_empty() {
            println!("No pools.");
        }
        for pool in &pools {
            println!("{pool}");
        }
    })
}

fn cmd_mksnap(env: &Env, args: PoolArgs) -> anyhow::Result<()> {
    let snap = env.session.create_snapshot(&args.name)?;
    env.emit(&json!({ "pool": args.name, "snap": snap.get() }), || {
        println!(
            "{} Created snapshot {} in pool {}",
            "✓".green().bold(),
            snap.get().to_string().cyan(),
            args.name.yellow()
        );
    })
}

#[derive(Serialize)]
struct PoolUsage {
    name: String,
    #[serde(flatten)]
    stat: PoolStat,
}

fn cmd_df(env: &Env) -> anyhow::Result<()> {
    let pools = env
        .session
        .list_pools()?
        .into_iter()
        .map(|name| {
            let stat = env.session.pool_stat(&name)?;
            Ok(PoolUsage { name, stat })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let total = env.session.cluster_stat()?;

    env.emit(&json!({ "pools": pools, "total": total }), || {
        println!(
            "{:<16} {:>10} {:>8} {:>7} {:>7} {:>8} {:>8} {:>8} {:>8}",
            "POOL".bold(),
            "KB".bold(),
            "OBJECTS".bold(),
            "CLONES".bold(),
            "COPIES".bold(),
            "RD_OPS".bold(),
            "RD_KB".bold(),
            "WR_OPS".bold(),
            "WR_KB".bold()
        );
        for usage in &pools {
            let s = &usage.stat;
            println!(
                "{:<16} {:>10} {:>8} {:>7} {:>7} {:>8} {:>8} {:>8} {:>8}",
                usage.name,
                s.num_kb,
                s.num_objects,
                s.num_object_clones,
                s.num_object_copies,
                s.num_rd,
                s.num_rd_kb,
                s.num_wr,
                s.num_wr_kb
            );
        }
        println!();
        println!("  total used  {:>12} KB", total.kb_used);
        println!("  total avail {:>12} KB", total.kb_avail);
        println!("  total space {:>12} KB", total.kb);
        println!("  objects     {:>12}", total.num_objects);
    })
}

fn cmd_ls(env: &Env) -> anyhow::Result<()> {
    let entries = env
        .io_context()?
        .list_objects()
        .collect::<Result<Vec<_>, _>>()?;
    env.emit(&entries, || {
        for entry in &entries {
            match &entry.locator {
                Some(locator) => println!("{}\t{}", entry.name, locator.dimmed()),
                None => println!("{}", entry.name),
            }
        }
    })
}

fn cmd_put(env: &Env, args: PutArgs, append: bool) -> anyhow::Result<()> {
    let data = read_input(&args.file)?;
    let ctx = env.io_context()?;
    if append {
        ctx.append(&args.object, &data)?;
    } else {
        ctx.write_full(&args.object, &data)?;
    }
    debug!(object = %args.object, bytes = data.len(), append, "object stored");
    let verb = if append { "appended" } else { "wrote" };
    env.emit(
        &json!({ "object": args.object, "bytes": data.len(), "append": append }),
        || {
            println!(
                "{} {} {} bytes to {}",
                "✓".green().bold(),
                verb,
                data.len(),
                args.object.bold()
            );
        },
    )
}

fn cmd_get(env: &Env, args: GetArgs) -> anyhow::Result<()> {
    let mut ctx = env.io_context()?;
    if let Some(snap) = args.snap {
        ctx.set_read_snapshot(SnapId::new(snap));
    }
    let data = ctx.read(&args.object, args.offset, args.length)?;
    if args.file == Path::new("-") {
        let mut out = std::io::stdout().lock();
        out.write_all(&data)?;
        out.flush()?;
        return Ok(());
    }
    fs::write(&args.file, &data)
        .with_context(|| format!("writing {}", args.file.display()))?;
    env.emit(
        &json!({ "object": args.object, "bytes": data.len(), "file": args.file }),
        || {
            println!(
                "{} read {} bytes into {}",
                "✓".green().bold(),
                data.len(),
                args.file.display()
            );
        },
    )
}

fn cmd_stat(env: &Env, args: ObjectArgs) -> anyhow::Result<()> {
    let stat = env.io_context()?.stat(&args.object)?;
    env.emit(&stat, || {
        println!(
            "{} mtime {}, size {}",
            args.object.bold(),
            stat.mtime.to_rfc3339(),
            stat.size
        );
    })
}

fn cmd_listxattr(env: &Env, args: ObjectArgs) -> anyhow::Result<()> {
    let attrs: Vec<_> = env.io_context()?.xattrs(&args.object)?.collect();
    let listed: Vec<_> = attrs
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": render(value) }))
        .collect();
    env.emit(&listed, || {
        for (name, _) in &attrs {
            println!("{name}");
        }
    })
}

fn cmd_getomapval(env: &Env, args: OmapKeyArgs) -> anyhow::Result<()> {
    let ctx = env.io_context()?;
    let mut op = ReadOp::new();
    let index = op.omap_get_vals_by_keys([args.key.as_str()]);
    let outcome = ctx.operate_read(&args.object, op)?;
    let Some((_, value)) = outcome.omap(index)?.next() else {
        bail!("no omap key {} on {}", args.key, args.object);
    };
    print_value(env, &args.key, &value)
}

fn cmd_listomapvals(env: &Env, args: ListOmapArgs) -> anyhow::Result<()> {
    let iter = env
        .io_context()?
        .omap_get_vals(&args.object, args.start_after.as_deref(), args.max)?;
    let more = iter.more();
    let entries: Vec<_> = iter.collect();
    let listed: Vec<_> = entries
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": render(value) }))
        .collect();
    env.emit(&json!({ "entries": listed, "more": more }), || {
        for (key, value) in &entries {
            println!("{}\t{}", key.cyan(), render(value));
        }
        if more {
            println!("{}", "(more entries; continue with --start-after)".dimmed());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn run(dir: &Path, args: &[&str]) -> anyhow::Result<()> {
        let data_dir = dir.join("cluster");
        let mut argv = vec!["strata", "--data-dir", data_dir.to_str().unwrap()];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv)?)
    }

    #[test]
    fn render_falls_back_to_hex() {
        assert_eq!(render(b"plain text"), "plain text");
        assert_eq!(render(&[0x00, 0xff]), "0x00ff");
    }

    #[test]
    fn put_then_get_round_trips_through_the_journal() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        fs::write(&input, b"object payload").unwrap();

        run(dir.path(), &["mkpool", "data"]).unwrap();
        run(dir.path(), &["-p", "data", "put", "obj", input.to_str().unwrap()]).unwrap();
        run(dir.path(), &["-p", "data", "append", "obj", input.to_str().unwrap()]).unwrap();
        run(dir.path(), &["-p", "data", "get", "obj", output.to_str().unwrap()]).unwrap();

        assert_eq!(fs::read(&output).unwrap(), b"object payloadobject payload");
    }

    #[test]
    fn snapshot_get_reads_old_contents() {
        let dir = TempDir::new().unwrap();
        let v1 = dir.path().join("v1");
        let out = dir.path().join("out");
        fs::write(&v1, b"first").unwrap();

        run(dir.path(), &["mkpool", "data"]).unwrap();
        run(dir.path(), &["-p", "data", "put", "obj", v1.to_str().unwrap()]).unwrap();
        run(dir.path(), &["mksnap", "data"]).unwrap();
        run(dir.path(), &["-p", "data", "get", "obj", out.to_str().unwrap(), "--snap", "1"])
            .unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"first");
    }

    #[test]
    fn attribute_commands() {
        let dir = TempDir::new().unwrap();
        run(dir.path(), &["mkpool", "meta"]).unwrap();
        run(dir.path(), &["-p", "meta", "setxattr", "obj", "owner", "alice"]).unwrap();
        run(dir.path(), &["-p", "meta", "getxattr", "obj", "owner"]).unwrap();
        run(dir.path(), &["-p", "meta", "setomapval", "obj", "k", "v"]).unwrap();
        run(dir.path(), &["-p", "meta", "--format", "json", "listomapvals", "obj"]).unwrap();
        run(dir.path(), &["-p", "meta", "getomapval", "obj", "k"]).unwrap();
        run(dir.path(), &["-p", "meta", "rmomapkey", "obj", "k"]).unwrap();
        assert!(run(dir.path(), &["-p", "meta", "getomapval", "obj", "k"]).is_err());
        run(dir.path(), &["-p", "meta", "rmxattr", "obj", "owner"]).unwrap();
        assert!(run(dir.path(), &["-p", "meta", "getxattr", "obj", "owner"]).is_err());
    }

    #[test]
    fn object_commands_need_a_pool() {
        let dir = TempDir::new().unwrap();
        let err = run(dir.path(), &["stat", "obj"]).unwrap_err();
        assert!(err.to_string().contains("--pool"));
    }

    #[test]
    fn removed_pool_is_gone_after_reopen() {
        let dir = TempDir::new().unwrap();
        run(dir.path(), &["mkpool", "tmp"]).unwrap();
        run(dir.path(), &["rmpool", "tmp"]).unwrap();
        run(dir.path(), &["--format", "json", "df"]).unwrap();
        assert!(run(dir.path(), &["-p", "tmp", "ls"]).is_err());
    }

    #[test]
    fn config_file_supplies_data_dir() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("strata.toml");
        let data_dir = dir.path().join("from-config");
        fs::write(
            &config,
            format!("data_dir = {:?}\nop_shards = 2\n", data_dir.to_str().unwrap()),
        )
        .unwrap();

        let cli = Cli::try_parse_from(["strata", "-c", config.to_str().unwrap(), "mkpool", "x"])
            .unwrap();
        run_command(cli).unwrap();
        assert!(data_dir.join(strata_cluster::JOURNAL_FILE).exists());
    }

    #[test]
    fn exec_runs_class_method() {
        let dir = TempDir::new().unwrap();
        run(dir.path(), &["mkpool", "data"]).unwrap();
        run(dir.path(), &["-p", "data", "exec", "obj", "counter", "inc", "3"]).unwrap();
        run(dir.path(), &["-p", "data", "exec", "obj", "counter", "get"]).unwrap();
        assert!(run(dir.path(), &["-p", "data", "exec", "obj", "nope", "none"]).is_err());
    }
}
