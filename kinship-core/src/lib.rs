//! Kinship puzzles generated from random family trees.
//!
//! This crate provides:
//! - Random family trees with gendered, uniquely named members
//! - Closure of a kinship graph under composition, inverse, symmetry and
//!   equivalence rules
//! - Multi-hop proofs: a relation broken back into a chain of simpler ones
//! - Noise facts and English rendering for dataset rows
//!
//! # Quick Start
//!
//! ```ignore
//! use kinship_core::{generate_rows, DatasetConfig, RelationStore, RuleBook, Task, TaskSpec};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let spec: TaskSpec = "1.3".parse()?;
//! let rows = generate_rows(
//!     RuleBook::default_family(),
//!     RelationStore::default_family(),
//!     spec,
//!     100,
//!     &DatasetConfig::for_task(spec.task),
//!     &mut rng,
//! )?;
//! println!("{}", rows[0].story);
//! ```

pub mod completer;
pub mod dataset;
pub mod decomposer;
pub mod entity;
pub mod family;
pub mod graph;
pub mod noise;
pub mod puzzle;
pub mod render;
pub mod rules;
pub mod testing;

// Primary public API
pub use completer::{CompletionStats, GraphCompleter};
pub use dataset::{
    generate_rows, pattern_counts, DatasetConfig, DatasetError, DatasetRow, Task, TaskSpec,
};
pub use decomposer::{EdgeReuse, ProofDecomposer};
pub use entity::{Entity, EntityId, Gender};
pub use family::{Family, FamilyConfig, FamilyError};
pub use graph::{RelationEdge, RelationGraph};
pub use noise::{NoiseConfig, NoiseInjector};
pub use puzzle::{FactKind, ProofStep, ProofTrace, Puzzle, PuzzleError};
pub use render::{RelationStore, RenderError, Renderer};
pub use rules::{RuleBook, RuleError, RuleIndex, RuleStore, FAMILY};
