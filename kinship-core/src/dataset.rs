//! Dataset rows: families in, rendered puzzles out.

use crate::completer::GraphCompleter;
use crate::decomposer::{EdgeReuse, ProofDecomposer};
use crate::family::{Family, FamilyConfig, FamilyError};
use crate::noise::{NoiseConfig, NoiseInjector};
use crate::puzzle::{Puzzle, PuzzleError};
use crate::render::{FormattedStep, RelationStore, RenderError, Renderer};
use crate::rules::RuleBook;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors from dataset generation.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Invalid task '{0}': expected <task>.<relation length>, e.g. 1.3")]
    InvalidTask(String),

    #[error("Family error: {0}")]
    Family(#[from] FamilyError),

    #[error("Puzzle error: {0}")]
    Puzzle(#[from] PuzzleError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Only {rows} of {requested} rows after {families} families")]
    Exhausted {
        families: usize,
        rows: usize,
        requested: usize,
    },
}

/// The task catalogue. Tasks differ in noise and in how often the question
/// asks about a story edge instead of the inferred one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Task {
    /// No noise.
    Clean = 1,
    Supporting = 2,
    Irrelevant = 3,
    Disconnected = 4,
    SupportingDisconnected = 5,
    /// Attribute noise. Generated as clean stories.
    Attributes = 6,
    /// Every question is answerable straight from the story.
    Memory = 7,
    /// Half memory questions, half inference.
    Mixed = 8,
}

impl Task {
    pub const ALL: [Task; 8] = [
        Task::Clean,
        Task::Supporting,
        Task::Irrelevant,
        Task::Disconnected,
        Task::SupportingDisconnected,
        Task::Attributes,
        Task::Memory,
        Task::Mixed,
    ];

    pub fn from_number(n: u8) -> Option<Task> {
        Task::ALL.iter().copied().find(|t| t.number() == n)
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    /// Name recorded in every row, e.g. `task_2`.
    pub fn name(self) -> String {
        format!("task_{}", self.number())
    }

    pub fn noise(self) -> NoiseConfig {
        let none = NoiseConfig::none();
        match self {
            Task::Supporting => none.with_supporting(true),
            Task::Irrelevant => none.with_irrelevant(true),
            Task::Disconnected => none.with_disconnected(true),
            Task::SupportingDisconnected => none.with_supporting(true).with_disconnected(true),
            Task::Clean | Task::Attributes | Task::Memory | Task::Mixed => none,
        }
    }

    /// Probability that the query is a story edge rather than the target.
    pub fn memory(self) -> f64 {
        match self {
            Task::Memory => 1.0,
            Task::Mixed => 0.5,
            _ => 0.0,
        }
    }
}

/// A task with the story length to generate, written `"<task>.<length>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task: Task,
    /// Story edges per puzzle.
    pub relation_length: usize,
}

impl TaskSpec {
    pub fn new(task: Task, relation_length: usize) -> Self {
        Self {
            task,
            relation_length,
        }
    }
}

impl FromStr for TaskSpec {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DatasetError::InvalidTask(s.to_string());
        let (task, length) = s.trim().split_once('.').ok_or_else(invalid)?;
        let task = task
            .parse::<u8>()
            .ok()
            .and_then(Task::from_number)
            .ok_or_else(invalid)?;
        let relation_length = length.parse::<usize>().map_err(|_| invalid())?;
        if relation_length == 0 {
            return Err(invalid());
        }
        Ok(TaskSpec::new(task, relation_length))
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.task.number(), self.relation_length)
    }
}

/// Settings for one call to [`generate_rows`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub family: FamilyConfig,
    pub noise: NoiseConfig,
    /// Probability that a row queries a story edge.
    pub memory: f64,
    /// Wrap names in `[...]`.
    pub boundary: bool,
    /// Keep the pattern distribution flat across families too.
    pub equal: bool,
    /// Families to try before giving up.
    pub max_families: usize,
    pub edge_reuse: EdgeReuse,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            family: FamilyConfig::default(),
            noise: NoiseConfig::none(),
            memory: 0.0,
            boundary: true,
            equal: false,
            max_families: 1000,
            edge_reuse: EdgeReuse::default(),
        }
    }
}

impl DatasetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Noise and memory settings of `task`.
    pub fn for_task(task: Task) -> Self {
        Self::new().with_task(task)
    }

    pub fn with_task(mut self, task: Task) -> Self {
        if task == Task::Attributes {
            warn!("attribute noise is not supported; {} stories are clean", task.name());
        }
        self.noise = task.noise();
        self.memory = task.memory();
        self
    }

    pub fn with_family(mut self, family: FamilyConfig) -> Self {
        self.family = family;
        self
    }

    pub fn with_noise(mut self, noise: NoiseConfig) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_memory(mut self, memory: f64) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_boundary(mut self, boundary: bool) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_equal(mut self, equal: bool) -> Self {
        self.equal = equal;
        self
    }

    pub fn with_max_families(mut self, max: usize) -> Self {
        self.max_families = max;
        self
    }

    pub fn with_edge_reuse(mut self, reuse: EdgeReuse) -> Self {
        self.edge_reuse = reuse;
        self
    }
}

/// One generated example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub id: Uuid,
    /// Story and noise sentences, shuffled.
    pub story: String,
    /// `(source name, target name)` of the queried edge.
    pub query: (String, String),
    pub text_query: String,
    /// Relation name of the queried edge.
    pub target: String,
    pub text_target: String,
    /// Story sentences only, in path order.
    pub clean_story: String,
    pub proof_state: Vec<FormattedStep>,
    /// Relation names along the story, e.g. `father-sister`.
    pub f_comb: String,
    pub task_name: String,
}

/// Generate `num_rows` rows for `spec`, drawing fresh families as needed.
///
/// Noise and memory come from `config`; use [`DatasetConfig::for_task`] to
/// take them from the task.
pub fn generate_rows<R: Rng + ?Sized>(
    rules: &RuleBook,
    relations: &RelationStore,
    spec: TaskSpec,
    num_rows: usize,
    config: &DatasetConfig,
    rng: &mut R,
) -> Result<Vec<DatasetRow>, DatasetError> {
    let mut rows: Vec<DatasetRow> = Vec::with_capacity(num_rows);
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut families = 0;

    while rows.len() < num_rows {
        if families >= config.max_families {
            warn!(families, rows = rows.len(), requested = num_rows, "out of families");
            return Err(DatasetError::Exhausted {
                families,
                rows: rows.len(),
                requested: num_rows,
            });
        }
        families += 1;

        let family = Family::generate(&config.family, rng)?;
        let mut graph = family.relation_graph();
        GraphCompleter::new(rules, &mut graph).complete_graph();

        let mut decomposer =
            ProofDecomposer::new(rules, &graph).with_edge_reuse(config.edge_reuse);
        let puzzles = decomposer.build_all(spec.relation_length, rng)?;
        let renderer = Renderer::new(relations, &family, &graph).with_boundary(config.boundary);

        let patterned = puzzles
            .into_iter()
            .map(|p| Ok((renderer.f_comb(&p.story)?, p)))
            .collect::<Result<Vec<_>, RenderError>>()?;
        let running = if config.equal && !seen.is_empty() {
            Some(&seen)
        } else {
            None
        };
        let kept = prune_patterns(patterned, running, rng);

        let injector = NoiseInjector::new(&decomposer);
        let mut added = 0;
        for (f_comb, mut puzzle) in kept {
            if rows.len() >= num_rows {
                break;
            }
            injector.inject(&mut puzzle, &config.noise, rng);
            rows.push(render_row(&renderer, &puzzle, f_comb.clone(), spec, config, rng)?);
            *seen.entry(f_comb).or_default() += 1;
            added += 1;
        }
        debug!(family = families, added, total = rows.len(), "processed family");
    }

    info!(
        task = %spec,
        rows = rows.len(),
        families,
        patterns = seen.len(),
        "generated rows"
    );
    Ok(rows)
}

/// Flatten the pattern distribution of one batch.
///
/// Every pattern keeps as many items as the rarest pattern has. With `running`
/// counts from earlier batches, only patterns at the running minimum (or not
/// seen before) survive. The result is shuffled.
pub fn prune_patterns<T, R: Rng + ?Sized>(
    items: Vec<(String, T)>,
    running: Option<&BTreeMap<String, usize>>,
    rng: &mut R,
) -> Vec<(String, T)> {
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for (pattern, item) in items {
        groups.entry(pattern).or_default().push(item);
    }
    let Some(keep) = groups.values().map(Vec::len).min() else {
        return Vec::new();
    };

    if let Some(running) = running {
        if let Some(&floor) = running.values().min() {
            groups.retain(|pattern, _| running.get(pattern).map_or(true, |&c| c == floor));
        }
    }

    let mut kept = Vec::new();
    for (pattern, mut group) in groups {
        group.shuffle(rng);
        group.truncate(keep);
        kept.extend(group.into_iter().map(|item| (pattern.clone(), item)));
    }
    kept.shuffle(rng);
    kept
}

fn render_row<R: Rng + ?Sized>(
    renderer: &Renderer<'_>,
    puzzle: &Puzzle,
    f_comb: String,
    spec: TaskSpec,
    config: &DatasetConfig,
    rng: &mut R,
) -> Result<DatasetRow, RenderError> {
    let text_story = puzzle
        .story
        .iter()
        .map(|&edge| renderer.stringify(edge, rng))
        .collect::<Result<Vec<_>, _>>()?;
    let clean_story = text_story.concat();

    let query_edge = if rng.gen::<f64>() < config.memory {
        puzzle.story.choose(rng).copied().unwrap_or(puzzle.edge)
    } else {
        puzzle.edge
    };

    let mut sentences = text_story;
    for edge in puzzle.noise_edges() {
        sentences.push(renderer.stringify(edge, rng)?);
    }
    sentences.shuffle(rng);

    let query = renderer.format_edge(query_edge)?;
    let text_query = if config.boundary {
        format!("How is [{}] related to [{}]?", query.1, query.0)
    } else {
        format!("How is {} related to {}?", query.1, query.0)
    };

    Ok(DatasetRow {
        id: puzzle.id,
        story: sentences.concat(),
        query,
        text_query,
        target: renderer.relation_name(query_edge)?.to_string(),
        text_target: renderer.stringify(query_edge, rng)?,
        clean_story,
        proof_state: renderer.format_proof(&puzzle.proof)?,
        f_comb,
        task_name: spec.task.name(),
    })
}

/// Rows per `f_comb` pattern.
pub fn pattern_counts(rows: &[DatasetRow]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(row.f_comb.clone()).or_default() += 1;
    }
    counts
}

/// Split `num_rows` into train and test counts.
pub fn split_rows(num_rows: usize, test_split: f64) -> (usize, usize) {
    let train = (num_rows as f64 * (1.0 - test_split)) as usize;
    (train, num_rows - train.min(num_rows))
}
