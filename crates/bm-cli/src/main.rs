//! `batchmerge` - offline tools for batchmerge stores

use anyhow::Context;
use bm_core::{BatchConfig, Recombiner, TaskResult};
use bm_store::{ArtifactStore, ObjectStore};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("batchmerge")
        .version(bm_core::VERSION)
        .about("Merge and inspect batchmerge object stores")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Batch configuration file (TOML)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("merge")
                .about("Recombine existing stores into one, in argument order")
                .arg(
                    Arg::new("into")
                        .long("into")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Destination store (created if missing)"),
                )
                .arg(
                    Arg::new("no-consolidate")
                        .long("no-consolidate")
                        .action(ArgAction::SetTrue)
                        .help("Keep equivalent objects as separate entries"),
                )
                .arg(
                    Arg::new("stores")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf))
                        .help("Stores to merge"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("List the objects and aliases of a store")
                .arg(
                    Arg::new("store")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective batch configuration as TOML"))
}

fn init_tracing(matches: &ArgMatches) {
    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if matches.get_flag("log-json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<BatchConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => BatchConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(BatchConfig::default()),
    }
}

async fn merge(config: &BatchConfig, args: &ArgMatches) -> anyhow::Result<bool> {
    let destination = args
        .get_one::<PathBuf>("into")
        .cloned()
        .context("--into is required")?;
    let consolidate = config.consolidate && !args.get_flag("no-consolidate");
    let results: Vec<TaskResult> = args
        .get_many::<PathBuf>("stores")
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(index, store)| TaskResult::success(index, store, None))
        .collect();

    tracing::info!(
        "Merging {} stores into {} (consolidate: {})",
        results.len(),
        destination.display(),
        consolidate
    );
    let recombiner = Recombiner::<ObjectStore>::new(destination.clone(), consolidate);
    let outcome = tokio::task::spawn_blocking(move || recombiner.recombine(&results))
        .await
        .context("merge thread")??;

    println!("Merged into {}", destination.display());
    println!("  Objects:      {}", outcome.destination_objects);
    println!("  Imported:     {}", outcome.imported);
    println!("  Consolidated: {}", outcome.consolidated);
    for failure in &outcome.merge_failures {
        println!("  Failed store #{}: {}", failure.index, failure.error);
    }
    Ok(outcome.merge_failures.is_empty())
}

fn inspect(path: &Path, json: bool) -> anyhow::Result<()> {
    let store: ObjectStore =
        ObjectStore::open(path).with_context(|| format!("opening {}", path.display()))?;

    if json {
        let document = serde_json::json!({
            "path": path,
            "objects": store.objects().collect::<Vec<_>>(),
            "aliases": store.aliases(),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("{} ({} objects)", path.display(), store.len());
    for object in store.objects() {
        println!("  {} [{}] {}", object.id, object.object_type, object.title);
        for reference in &object.references {
            println!("    -> {reference}");
        }
    }
    if !store.aliases().is_empty() {
        println!("Aliases:");
        for (alias, target) in store.aliases() {
            println!("  {alias} => {target}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(&matches);
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("merge", args)) => {
            let clean = merge(&config, args).await?;
            std::process::exit(if clean { 0 } else { 1 });
        }
        Some(("inspect", args)) => {
            let store = args
                .get_one::<PathBuf>("store")
                .context("store path is required")?;
            inspect(store, args.get_flag("json"))
        }
        Some(("config", _)) => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn merge_arguments_parse() {
        let matches = cli()
            .try_get_matches_from(["batchmerge", "merge", "--into", "out.json", "a.json", "b.json"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "merge");
        assert_eq!(args.get_many::<PathBuf>("stores").unwrap().count(), 2);
        assert!(!args.get_flag("no-consolidate"));
    }

    #[tokio::test]
    async fn merge_consolidates_equivalent_stores() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for name in ["a.json", "b.json"] {
            let path = dir.path().join(name);
            let mut store: ObjectStore = ObjectStore::create(&path).unwrap();
            store
                .insert(bm_store::StoredObject::new("A", "Horizon").with_content(serde_json::json!({"z": 1})))
                .unwrap();
            store.persist().unwrap();
            paths.push(path.display().to_string());
        }
        let into = dir.path().join("out.json").display().to_string();
        let mut argv = vec!["batchmerge".to_string(), "merge".to_string(), "--into".to_string(), into.clone()];
        argv.extend(paths);

        let matches = cli().try_get_matches_from(argv).unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert!(merge(&BatchConfig::default(), args).await.unwrap());
        let merged: ObjectStore = ObjectStore::open(Path::new(&into)).unwrap();
        assert_eq!(merged.len(), 1);
    }
}
