use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::support::{StubEmbedder, StubIndex, chunk};
use crate::constants::CONTEXT_PLACEHOLDER;
use crate::model::{Message, Role};
use crate::prompt::PromptAugmenter;
use crate::retrieval::{RetrievalCoordinator, RetrievalOptions};

fn options(top_k: usize, threshold: f32) -> RetrievalOptions {
    RetrievalOptions {
        top_k,
        threshold,
        source_filter: None,
    }
}

#[tokio::test]
async fn empty_corpus_short_circuits_with_zero_timings() {
    for (top_k, threshold) in [(0, 0.0), (5, 0.3), (1000, 42.0)] {
        let embedder = Arc::new(StubEmbedder::returning(vec![1.0]));
        let index = Arc::new(StubIndex::new(0, vec![chunk("unused", 0.9)]));
        let coordinator = RetrievalCoordinator::new(embedder.clone(), index.clone());

        let result = coordinator
            .retrieve("question", "sys", "embed", &options(top_k, threshold), &CancellationToken::new())
            .await
            .expect("retrieval");

        assert!(result.chunks.is_empty());
        assert_eq!(result.embedding_time_ms, 0);
        assert_eq!(result.search_time_ms, 0);
        assert_eq!(result.messages, PromptAugmenter::build("sys", "question", &[]));
        assert!(embedder.seen_texts.lock().await.is_empty());
        assert_eq!(index.searches.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn embeds_raw_prompt_and_injects_hits() {
    let prompt = format!("Answer from: {}", CONTEXT_PLACEHOLDER);
    let embedder = Arc::new(StubEmbedder::returning(vec![0.1, 0.2]));
    let index = Arc::new(StubIndex::new(3, vec![chunk("alpha", 0.91), chunk("beta", 0.5)]));
    let coordinator = RetrievalCoordinator::new(embedder.clone(), index.clone());

    let result = coordinator
        .retrieve(&prompt, "", "embed", &options(2, 0.4), &CancellationToken::new())
        .await
        .expect("retrieval");

    assert_eq!(*embedder.seen_texts.lock().await, vec![prompt.clone()]);
    assert_eq!(result.chunks.len(), 2);
    assert_eq!(
        result.messages,
        vec![Message::user(
            "Answer from: [1] (relevance: 91%) alpha\n\n[2] (relevance: 50%) beta"
        )]
    );
}

#[tokio::test]
async fn empty_vector_skips_search() {
    let embedder = Arc::new(StubEmbedder::returning(Vec::new()));
    let index = Arc::new(StubIndex::new(3, vec![chunk("alpha", 0.9)]));
    let coordinator = RetrievalCoordinator::new(embedder, index.clone());

    let result = coordinator
        .retrieve("q", "sys", "embed", &options(5, 0.3), &CancellationToken::new())
        .await
        .expect("retrieval");

    assert!(result.chunks.is_empty());
    assert_eq!(result.search_time_ms, 0);
    assert_eq!(index.searches.load(Ordering::SeqCst), 0);
    assert_eq!(result.messages[0].role, Role::System);
    assert_eq!(result.messages[0].content, "sys");
}

#[tokio::test]
async fn out_of_range_options_are_passed_through() {
    let embedder = Arc::new(StubEmbedder::returning(vec![1.0]));
    let index = Arc::new(StubIndex::new(1, Vec::new()));
    let coordinator = RetrievalCoordinator::new(embedder, index.clone());
    let opts = RetrievalOptions {
        top_k: 0,
        threshold: -3.0,
        source_filter: Some(vec!["a.md".to_string()]),
    };

    coordinator
        .retrieve("q", "", "embed", &opts, &CancellationToken::new())
        .await
        .expect("retrieval");

    assert_eq!(
        *index.last_args.lock().await,
        Some((0, -3.0, Some(vec!["a.md".to_string()])))
    );
}

#[tokio::test]
async fn cancellation_during_embedding_propagates() {
    let embedder = Arc::new(StubEmbedder::blocking());
    let index = Arc::new(StubIndex::new(1, vec![chunk("alpha", 0.9)]));
    let coordinator = RetrievalCoordinator::new(embedder, index.clone());
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = coordinator
        .retrieve("q", "", "embed", &options(5, 0.3), &token)
        .await
        .expect_err("cancelled");

    assert!(err.is_cancelled());
    assert_eq!(index.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn embedding_failure_is_returned_to_caller() {
    let coordinator = RetrievalCoordinator::new(
        Arc::new(StubEmbedder::failing()),
        Arc::new(StubIndex::new(1, Vec::new())),
    );

    let err = coordinator
        .retrieve("q", "", "embed", &options(5, 0.3), &CancellationToken::new())
        .await
        .expect_err("embedding fails");

    assert!(!err.is_cancelled());
}

#[tokio::test]
async fn stop_interrupts_an_embedder_that_ignores_the_token() {
    let index = Arc::new(StubIndex::new(1, vec![chunk("alpha", 0.9)]));
    let coordinator = RetrievalCoordinator::new(Arc::new(StubEmbedder::hanging()), index.clone());
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator.retrieve("q", "", "embed", &options(5, 0.3), &token),
    )
    .await
    .expect("retrieve returns once the token fires")
    .expect_err("cancelled");

    assert!(err.is_cancelled());
    assert_eq!(index.searches.load(Ordering::SeqCst), 0);
}
