//! Kinship dataset generator.
//!
//! Builds one training set and any number of test sets of kinship puzzles,
//! each from its own stream of random families:
//!
//! ```bash
//! cargo run -p kinship -- --train-task 1.3 --test-tasks 1.2,1.3,2.3 --seed 7
//! ```
//!
//! Set `RUST_LOG` (in the environment or a `.env` file) to adjust logging.

mod args;
mod output;

use args::Cli;
use kinship_core::dataset::split_rows;
use kinship_core::{generate_rows, DatasetRow, RelationStore, RuleBook, RuleStore, TaskSpec};
use output::{file_name, write_manifest, write_rows, Manifest, Split};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type GenerationResult = Result<Vec<DatasetRow>, kinship_core::DatasetError>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kinship=info,kinship_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse_args();
    cli.family_config().validate()?;
    if !(0.0..=1.0).contains(&cli.test_split) {
        return Err(format!("--test-split must be between 0 and 1, got {}", cli.test_split).into());
    }

    let rules = Arc::new(load_rules(cli.rules_store.as_deref()).await?);
    let relations = Arc::new(load_relations(cli.relations_store.as_deref()).await?);
    let missing = relations.missing(rule_labels(rules.store()));
    if !missing.is_empty() {
        warn!(?missing, "relation store has no names for some rule labels");
    }

    let seed = cli.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let (train_rows, test_rows) = split_rows(cli.num_rows, cli.test_split);
    info!(seed, train_rows, test_rows, output = %cli.output.display(), "generating datasets");

    let mut jobs: Vec<(TaskSpec, Split)> = vec![(cli.train_task, Split::Train)];
    jobs.extend(cli.test_tasks.iter().map(|&spec| (spec, Split::Test)));

    // Each job owns its families and RNG; only the rules are shared.
    let handles: Vec<JoinHandle<GenerationResult>> = jobs
        .iter()
        .enumerate()
        .map(|(i, &(spec, split))| {
            let rules = Arc::clone(&rules);
            let relations = Arc::clone(&relations);
            let config = cli.dataset_config(spec.task);
            let rows = match split {
                Split::Train => train_rows,
                Split::Test => test_rows,
            };
            let job_seed = seed.wrapping_add(i as u64);
            tokio::task::spawn_blocking(move || {
                let mut rng = StdRng::seed_from_u64(job_seed);
                generate_rows(&rules, &relations, spec, rows, &config, &mut rng)
            })
        })
        .collect();

    let mut manifest = Manifest {
        seed,
        args: &cli,
        train_task: BTreeMap::new(),
        test_tasks: BTreeMap::new(),
        files: BTreeMap::new(),
    };

    for ((spec, split), handle) in jobs.into_iter().zip(handles) {
        let rows = handle.await??;
        let name = file_name(&spec, split);
        let summary = write_rows(&cli.output, &name, &rows).await?;
        match split {
            Split::Train => manifest.train_task.insert(spec.to_string(), name.clone()),
            Split::Test => manifest.test_tasks.insert(spec.to_string(), name.clone()),
        };
        manifest.files.insert(name, summary);
    }

    let path = write_manifest(&cli.output, &manifest).await?;
    info!(manifest = %path.display(), "dataset complete");
    Ok(())
}

async fn load_rules(path: Option<&Path>) -> Result<RuleBook, Box<dyn std::error::Error>> {
    let store = match path {
        Some(path) => {
            let store = RuleStore::from_json_str(&fs::read_to_string(path).await?)?;
            info!(path = %path.display(), "loaded rule store");
            store
        }
        None => RuleStore::default_family(),
    };
    Ok(RuleBook::new(store))
}

async fn load_relations(path: Option<&Path>) -> Result<RelationStore, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let store = RelationStore::from_json_str(&fs::read_to_string(path).await?)?;
            info!(path = %path.display(), "loaded relation store");
            Ok(store)
        }
        None => Ok(RelationStore::default_family().clone()),
    }
}

/// Every label the rules can put on an edge.
fn rule_labels(store: &RuleStore) -> Vec<&str> {
    let mut labels: Vec<&str> = Vec::new();
    for table in store.compositional.values() {
        for (first, seconds) in table {
            labels.push(first);
            for (second, result) in seconds {
                labels.push(second);
                labels.push(result);
            }
        }
    }
    for table in store
        .inverse_equivalence
        .values()
        .chain(store.symmetric.values())
    {
        for (from, to) in table {
            labels.push(from);
            labels.push(to);
        }
    }
    // Synonyms are rewritten before anything is rendered.
    for table in store.equivalence.values() {
        labels.extend(table.values().map(String::as_str));
    }
    labels.sort_unstable();
    labels.dedup();
    labels
}
