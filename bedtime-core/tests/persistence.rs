//! Story history on a real SQLite file.

use bedtime_core::persist::{SqliteStore, StoryStore};
use bedtime_core::testing::{judge_response, text_response, ScriptedLocalModel, ScriptedModel};
use bedtime_core::{GenerationPath, Orchestrator, PipelineConfig, StoryRequest};
use std::sync::Arc;
use tempfile::TempDir;

fn orchestrator(store: SqliteStore, story: &str, score: f32) -> Orchestrator {
    Orchestrator::new(
        Arc::new(ScriptedModel::replies([text_response(story)])),
        Arc::new(ScriptedLocalModel::unreachable()),
        PipelineConfig::default(),
    )
    .expect("valid config")
    .with_judge_model(Arc::new(ScriptedModel::replies([judge_response(
        score, "Lovely",
    )])))
    .with_store(Arc::new(store))
}

#[tokio::test]
async fn test_history_survives_reopening_the_database() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("stories.db");

    {
        let store = SqliteStore::open(&db_path).unwrap();
        orchestrator(store.clone(), "The Whale Who Sang", 8.0)
            .generate(&StoryRequest::new("a singing whale"))
            .await
            .unwrap();
        orchestrator(store, "The Sleepy Dinosaur", 9.0)
            .generate(&StoryRequest::new("a sleepy triceratops"))
            .await
            .unwrap();
    }

    let store = SqliteStore::open(&db_path).unwrap();
    let history = store.recent(10, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].record.story, "The Sleepy Dinosaur");
    assert_eq!(history[0].record.grounding, vec!["triceratops".to_string()]);
    assert_eq!(history[1].record.path, GenerationPath::Primary);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_stories, 2);
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.successful_runs, 2);
    assert_eq!(stats.average_score, Some(8.5));
}

#[tokio::test]
async fn test_store_is_shared_across_tasks() {
    let store = SqliteStore::open_in_memory().unwrap();

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let run = bedtime_core::persist::RunRecord {
                    request_id: uuid::Uuid::new_v4(),
                    created_at: chrono::Utc::now(),
                    prompt: format!("prompt {i}"),
                    success: i % 2 == 0,
                    path: None,
                    model: None,
                    error: None,
                    elapsed_secs: 0.1,
                    tools_enabled: true,
                };
                store.append_run(&run).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_runs, 5);
    assert_eq!(stats.successful_runs, 3);
    assert_eq!(stats.failed_runs, 2);
}
