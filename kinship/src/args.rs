//! CLI argument definitions using clap
//!
//! kinship --train-task 1.3 --test-tasks 1.2,1.3,1.4 --num-rows 1000 --output data/

use clap::Parser;
use kinship_core::{DatasetConfig, FamilyConfig, Task, TaskSpec};
use serde::Serialize;
use std::path::PathBuf;

/// Generate kinship reasoning puzzles from random family trees
#[derive(Parser, Debug, Clone, Serialize)]
#[command(name = "kinship")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Generations below the root of each family
    #[arg(long, default_value_t = 3)]
    pub max_levels: usize,

    /// Fewest children per couple
    #[arg(long, default_value_t = 4)]
    pub min_child: usize,

    /// Most children per couple
    #[arg(long, default_value_t = 4)]
    pub max_child: usize,

    /// Probability that a family member marries
    #[arg(long, default_value_t = 1.0)]
    pub p_marry: f64,

    /// Task and story length of the training set, as <task>.<length>
    #[arg(long, default_value = "1.3")]
    pub train_task: TaskSpec,

    /// Comma separated test tasks, each as <task>.<length>
    #[arg(long, value_delimiter = ',', default_value = "1.3")]
    pub test_tasks: Vec<TaskSpec>,

    /// Rows across the train and test split
    #[arg(long, default_value_t = 500)]
    pub num_rows: usize,

    /// Share of rows set aside for each test task
    #[arg(short, long, default_value_t = 0.2)]
    pub test_split: f64,

    /// Keep the pattern distribution flat across families
    #[arg(long)]
    pub equal: bool,

    /// Do not wrap names in [brackets]
    #[arg(long)]
    pub no_boundary: bool,

    /// Seed for every random choice; drawn at random when absent
    #[arg(long)]
    pub seed: Option<u64>,

    /// Rule tables as JSON (built-in kinship rules when absent)
    #[arg(long)]
    pub rules_store: Option<PathBuf>,

    /// Relation names and sentence templates as JSON (built-in English when absent)
    #[arg(long)]
    pub relations_store: Option<PathBuf>,

    /// Directory for the generated files
    #[arg(long, default_value = "data")]
    pub output: PathBuf,

    /// Families to try per task before giving up
    #[arg(long, default_value_t = 1000)]
    pub max_families: usize,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    pub fn family_config(&self) -> FamilyConfig {
        FamilyConfig::new()
            .with_max_levels(self.max_levels)
            .with_children(self.min_child, self.max_child)
            .with_p_marry(self.p_marry)
    }

    pub fn dataset_config(&self, task: Task) -> DatasetConfig {
        DatasetConfig::for_task(task)
            .with_family(self.family_config())
            .with_boundary(!self.no_boundary)
            .with_equal(self.equal)
            .with_max_families(self.max_families)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["kinship"]).unwrap();
        assert_eq!(cli.train_task.to_string(), "1.3");
        assert_eq!(cli.test_tasks.len(), 1);
        assert_eq!(cli.family_config(), FamilyConfig::default());
        assert!(cli.dataset_config(Task::Clean).boundary);
        assert!(cli.seed.is_none());
    }

    #[test]
    fn test_task_list() {
        let cli = Cli::try_parse_from([
            "kinship",
            "--train-task",
            "2.2",
            "--test-tasks",
            "2.2,2.3,7.4",
            "--no-boundary",
            "--seed",
            "9",
        ])
        .unwrap();
        let tests: Vec<String> = cli.test_tasks.iter().map(|t| t.to_string()).collect();
        assert_eq!(tests, vec!["2.2", "2.3", "7.4"]);
        assert_eq!(cli.train_task.task, Task::Supporting);

        let config = cli.dataset_config(cli.test_tasks[2].task);
        assert!(!config.boundary);
        assert_eq!(config.memory, 1.0);
        assert_eq!(cli.seed, Some(9));
    }

    #[test]
    fn test_bad_task_rejected() {
        assert!(Cli::try_parse_from(["kinship", "--train-task", "12"]).is_err());
        assert!(Cli::try_parse_from(["kinship", "--test-tasks", "1.3,nine"]).is_err());
    }
}
