//! storage-access CLI entry point.
//!
//! Usage:
//!   storage-access [--config=<path>] <command> [args...]
//!
//! Every location argument is either an absolute path under the sandbox
//! root or a `content://` document URI.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use serde_json::json;
use storage_access_kernel::{AccessType, Dispatcher, ListDepth, StorageConfig, WorkerPool};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut config_path: Option<PathBuf> = None;
    if let Some(first) = args.first()
        && let Some(path) = first.strip_prefix("--config=")
    {
        config_path = Some(PathBuf::from(path));
        args.remove(0);
    }

    match args.first().map(|s| s.as_str()) {
        None | Some("--help" | "-h" | "help") => {
            print_help();
            return Ok(ExitCode::SUCCESS);
        }
        Some("--version" | "-V") => {
            println!("storage-access {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let config = match &config_path {
        Some(path) => StorageConfig::load_from(path)?,
        None => StorageConfig::load()?,
    };
    let pool = WorkerPool::new(config.worker_threads).context("Failed to start worker pool")?;
    let dispatcher = Dispatcher::from_config(&config, pool).context("Failed to set up storage")?;

    let result = dispatcher.pool().block_on(run_command(&dispatcher, &args));
    dispatcher.shutdown();
    result
}

async fn run_command(d: &Dispatcher, args: &[String]) -> Result<ExitCode> {
    let cmd = args[0].as_str();
    let rest = &args[1..];

    match cmd {
        "type" => {
            println!("{}", d.get_storage_type(rest.first().map(|s| s.as_str())));
        }

        "appdir" => println!("{}", d.get_app_directory()),

        "read" => {
            let loc = arg(rest, 0, "read <location>")?;
            match d.read_file(loc).await? {
                Some(content) => print!("{content}"),
                None => {
                    eprintln!("{loc}: no such file");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }

        "write" => {
            let path = arg(rest, 0, "write <file path> <content>")?;
            let content = arg(rest, 1, "write <file path> <content>")?;
            let (parent, filename, extension) = split_file_path(path);
            let outcome = d.write_file(parent, content, &filename, &extension).await?;
            println!("{}", serde_json::to_string(&outcome)?);
            return Ok(exit_for(outcome.succeeded()));
        }

        "overwrite" => {
            let loc = arg(rest, 0, "overwrite <uri> <content>")?;
            let content = arg(rest, 1, "overwrite <uri> <content>")?;
            println!("{}", d.overwrite_file(loc, content).await?);
        }

        "exists" => {
            let exists = d.file_exists(arg(rest, 0, "exists <location>")?).await?;
            println!("{exists}");
            return Ok(exit_for(exists));
        }

        "rm" => {
            let deleted = d.delete_file(arg(rest, 0, "rm <location>")?).await?;
            return Ok(exit_for(deleted));
        }

        "ls" => {
            let opts = ListOptions::parse(rest)?;
            let listing = d
                .list_files(opts.location.as_deref(), opts.depth, opts.sizes)
                .await?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }

        "mkdir" => {
            let name = arg(rest, 0, "mkdir <name> [parent]")?;
            let outcome = d.create_directory(name, rest.get(1).map(|s| s.as_str())).await?;
            println!("{}", serde_json::to_string(&outcome)?);
            return Ok(exit_for(outcome.succeeded()));
        }

        "rmdir" => {
            let deleted = d.delete_directory(arg(rest, 0, "rmdir <location>")?).await?;
            return Ok(exit_for(deleted));
        }

        "mv" => {
            let source = arg(rest, 0, "mv <source dir> <dest dir>")?;
            let dest = arg(rest, 1, "mv <source dir> <dest dir>")?;
            d.move_directory(source, dest).await?;
        }

        "subdir" => {
            let strict = rest.iter().any(|a| a == "--strict");
            let positional: Vec<&str> = rest
                .iter()
                .map(|s| s.as_str())
                .filter(|a| *a != "--strict")
                .collect();
            let (base, name) = match positional.as_slice() {
                [name] => (None, *name),
                [base, name] => (Some(*base), *name),
                _ => bail!("usage: subdir [base] <name> [--strict]"),
            };
            let uri = if strict {
                d.find_subdirectory_uri(base, name).await?
            } else {
                d.get_subdirectory_uri(base, name).await?
            };
            println!("{uri}");
        }

        "grant" => {
            let uri = arg(rest, 0, "grant <tree uri> [full|directory]")?;
            let access_type = match rest.get(1) {
                Some(raw) => raw.parse::<AccessType>()?,
                None => AccessType::Directory,
            };
            println!("{}", d.record_grant(uri, access_type)?);
        }

        "check" => {
            let granted = d.check_permissions().await?;
            println!("{}", json!({ "granted": granted, "app_directory": d.get_app_directory() }));
            return Ok(exit_for(granted));
        }

        unknown => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run 'storage-access --help' for usage.");
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn arg<'a>(args: &'a [String], index: usize, usage: &str) -> Result<&'a str> {
    args.get(index)
        .map(|s| s.as_str())
        .with_context(|| format!("usage: {usage}"))
}

fn exit_for(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Options of `ls [location] [--depth N] [--sizes]`.
#[derive(Debug, PartialEq)]
struct ListOptions {
    location: Option<String>,
    depth: ListDepth,
    sizes: bool,
}

impl ListOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let mut opts = ListOptions {
            location: None,
            depth: ListDepth::Unbounded,
            sizes: false,
        };
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--sizes" {
                opts.sizes = true;
            } else if arg == "--depth" {
                let raw = iter.next().context("--depth requires a value")?;
                opts.depth = parse_depth(raw)?;
            } else if let Some(raw) = arg.strip_prefix("--depth=") {
                opts.depth = parse_depth(raw)?;
            } else if arg.starts_with("--") {
                bail!("unknown ls option: {arg}");
            } else if opts.location.is_none() {
                opts.location = Some(arg.clone());
            } else {
                bail!("ls takes one location, got another: {arg}");
            }
        }
        Ok(opts)
    }
}

fn parse_depth(raw: &str) -> Result<ListDepth> {
    let n: i32 = raw
        .parse()
        .with_context(|| format!("invalid depth: {raw}"))?;
    Ok(ListDepth::from_raw(n)?)
}

/// Split a full file path into parent, file name and extension.
///
/// The name is the stem before the first dot, the extension what follows
/// the last dot; missing parts default to `newfile` and `txt`.
fn split_file_path(path: &str) -> (&str, String, String) {
    let (parent, last) = path.rsplit_once('/').unwrap_or(("", path));
    let filename = last
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("newfile");
    let extension = last
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|s| !s.is_empty())
        .unwrap_or("txt");
    (parent, filename.to_string(), extension.to_string())
}

fn print_help() {
    println!(
        r#"storage-access v{}

Usage:
  storage-access [--config=<path>] <command> [args...]

Commands:
  type [location]                  Print internal, external or unknown
  appdir                           Print the default location
  read <location>                  Print a file's content
  write <file path> <content>      Create a file
  overwrite <uri> <content>        Replace a document's content
  exists <location>                Print whether a node exists
  rm <location>                    Delete a file
  ls [location] [--depth N] [--sizes]
                                   List a directory as JSON (-1 = unbounded)
  mkdir <name> [parent]            Create a directory
  rmdir <location>                 Delete a directory recursively
  mv <source dir> <dest dir>       Move a document directory
  subdir [base] <name> [--strict]  Print a subdirectory's URI
  grant <tree uri> [full|directory]
                                   Record a granted document tree
  check                            Print whether storage access is granted

Options:
  --config=<path>                  Config file (default: ~/.config/storage-access/storage-access.toml)
  -h, --help                       Show this help
  -V, --version                    Show version

Logging is controlled by RUST_LOG, e.g. RUST_LOG=storage_access_kernel=debug.
"#,
        env!("CARGO_PKG_VERSION")
    );
}
