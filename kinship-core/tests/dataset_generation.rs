//! End-to-end dataset rows from random families.
//!
//! Run with: `cargo test -p kinship-core --test dataset_generation`

use kinship_core::dataset::split_rows;
use kinship_core::{
    generate_rows, pattern_counts, DatasetConfig, DatasetRow, FamilyConfig, RelationStore,
    RuleBook, Task, TaskSpec,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn config(task: Task) -> DatasetConfig {
    DatasetConfig::for_task(task)
        .with_family(FamilyConfig::new().with_max_levels(2).with_children(2, 3))
}

fn rows(spec: &str, num_rows: usize, config: &DatasetConfig, seed: u64) -> Vec<DatasetRow> {
    let spec: TaskSpec = spec.parse().expect("valid task spec");
    generate_rows(
        RuleBook::default_family(),
        RelationStore::default_family(),
        spec,
        num_rows,
        config,
        &mut StdRng::seed_from_u64(seed),
    )
    .expect("rows generate")
}

#[test]
fn test_clean_rows() {
    let rows = rows("1.2", 30, &config(Task::Clean), 1);
    assert_eq!(rows.len(), 30);

    for row in &rows {
        assert_eq!(row.task_name, "task_1");
        // Two story sentences and nothing else.
        assert_eq!(row.clean_story.matches(". ").count(), 2);
        assert_eq!(row.story.len(), row.clean_story.len());
        assert_eq!(row.proof_state.len(), 1);
        let premises = &row.proof_state[0].premises;
        assert_eq!(row.f_comb, format!("{}-{}", premises[0].1, premises[1].1));
        // The query asks about the inferred edge, which is the proof's conclusion.
        let conclusion = &row.proof_state[0].conclusion;
        assert_eq!(row.query, (conclusion.0.clone(), conclusion.2.clone()));
        assert_eq!(row.target, conclusion.1);
        assert!(row.text_query.starts_with("How is ["));
        assert!(row.text_target.contains(&format!("[{}]", row.query.0)));
    }
}

#[test]
fn test_noise_lengthens_story() {
    let rows = rows("4.2", 10, &config(Task::Disconnected), 2);
    assert!(rows.iter().any(|r| r.story.len() > r.clean_story.len()));
    for row in &rows {
        assert!(row.story.len() >= row.clean_story.len());
    }
}

#[test]
fn test_memory_rows_query_story_edges() {
    let rows = rows("7.3", 10, &config(Task::Memory), 3);
    for row in &rows {
        let (from, to) = &row.query;
        let mentioned = row
            .proof_state
            .iter()
            .flat_map(|step| step.premises.iter())
            .any(|p| &p.0 == from && &p.2 == to);
        assert!(mentioned, "{from} -> {to} is not a story edge");
        assert_eq!(row.task_name, "task_7");
    }
}

#[test]
fn test_without_boundary() {
    let config = config(Task::Clean).with_boundary(false);
    let rows = rows("1.2", 5, &config, 4);
    for row in &rows {
        assert!(!row.story.contains('['));
        assert!(!row.text_query.contains('['));
    }
}

#[test]
fn test_pattern_counts_cover_every_row() {
    let config = config(Task::Clean).with_equal(true);
    let rows = rows("1.2", 40, &config, 5);
    let counts = pattern_counts(&rows);

    assert_eq!(rows.len(), 40);
    assert!(counts.len() > 1);
    assert_eq!(counts.values().sum::<usize>(), rows.len());
    for row in &rows {
        assert!(counts.contains_key(&row.f_comb));
    }
}

#[test]
fn test_seeded_rows_match() {
    let config = config(Task::SupportingDisconnected);
    assert_eq!(rows("5.2", 8, &config, 6), rows("5.2", 8, &config, 6));
}

#[test]
fn test_rows_serialize_as_json_lines() {
    let rows = rows("2.2", 3, &config(Task::Supporting), 7);
    for row in &rows {
        let line = serde_json::to_string(row).unwrap();
        assert!(!line.contains('\n'));
        let back: DatasetRow = serde_json::from_str(&line).unwrap();
        assert_eq!(&back, row);
    }
    assert_eq!(split_rows(rows.len(), 0.0), (3, 0));
}
