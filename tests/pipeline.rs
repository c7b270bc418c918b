//! End-to-end tests of the ingestion and retrieval pipeline against the
//! in-memory index, with a deterministic embedder.

mod common;

use std::sync::Arc;

use common::*;
use local_brain::ask::{cli_system_prompt, AskRequest, Assistant};
use local_brain::context::{assemble_context, ContextAssembler, CONTEXT_HEADER};
use local_brain::cursor::{CursorStore, IngestCursor, MemoryCursorStore};
use local_brain::error::{EmbedError, IngestError};
use local_brain::ingest::Ingestor;
use local_brain::interaction_log::InteractionLog;
use local_brain::models::{Role, Source};
use local_brain::progress::{IngestPhase, IngestProgressEvent};
use local_brain::store::memory::InMemoryStore;
use local_brain::store::IndexStore;
use tempfile::TempDir;

struct Harness {
    _tmp: TempDir,
    config: local_brain::config::Config,
    store: Arc<InMemoryStore>,
    embedder: Arc<LetterEmbedder>,
    cursor: Arc<MemoryCursorStore>,
}

impl Harness {
    fn new(export_batch: usize, live_batch: usize) -> Self {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path(), export_batch, live_batch);
        Self {
            _tmp: tmp,
            config,
            store: Arc::new(InMemoryStore::new()),
            embedder: Arc::new(LetterEmbedder::new()),
            cursor: Arc::new(MemoryCursorStore::default()),
        }
    }

    fn ingestor(&self) -> Ingestor {
        self.ingestor_with(self.embedder.clone())
    }

    fn ingestor_with(&self, embedder: Arc<LetterEmbedder>) -> Ingestor {
        Ingestor::new(
            &self.config,
            self.store.clone(),
            embedder,
            self.cursor.clone(),
        )
    }

    fn ingestor_on(&self, store: Arc<dyn IndexStore>) -> Ingestor {
        Ingestor::new(&self.config, store, self.embedder.clone(), self.cursor.clone())
    }

    fn write_sample_export(&self) {
        write_export(
            &self.config,
            &[
                conversation(
                    "NFS",
                    &[
                        ("user", "How do I mount an NFS share?"),
                        (
                            "assistant",
                            "Use mount -t nfs server:/export /mnt\nThen add it to fstab for boot.",
                        ),
                    ],
                ),
                conversation("Pasta", &[("user", "Best carbonara recipe?")]),
            ],
        );
    }
}

fn live_lines(n: usize) -> Vec<String> {
    (1..=n)
        .map(|i| live_line(&format!("question {}", i), &format!("answer {}", i)))
        .collect()
}

#[tokio::test]
async fn rebuild_indexes_export_in_batches() {
    let h = Harness::new(3, 64);
    h.write_sample_export();

    let report = h.ingestor().rebuild_index().await.unwrap();

    assert_eq!(report.records, 3);
    assert_eq!(report.entries, 4);
    assert_eq!(report.batches, 2);
    assert_eq!(h.embedder.batch_sizes(), vec![3, 1]);
    assert_eq!(
        h.store.ids().unwrap(),
        vec!["export-0", "export-1", "export-2", "export-3"]
    );

    let first = h.store.get("export-0").unwrap().unwrap();
    assert_eq!(first.document, "How do I mount an NFS share?");
    assert_eq!(first.metadata.source, Source::BulkExport);
    assert_eq!(first.metadata.conversation_title.as_deref(), Some("NFS"));
    assert_eq!(first.metadata.role, Some(Role::User));

    let split = h.store.get("export-2").unwrap().unwrap();
    assert_eq!(split.document, "Then add it to fstab for boot.");
    assert_eq!(split.metadata.role, Some(Role::Assistant));
}

#[tokio::test]
async fn rebuild_is_idempotent_and_leaves_live_partition() {
    let h = Harness::new(128, 64);
    h.write_sample_export();
    write_live_log(&h.config, &live_lines(2));

    let ingestor = h.ingestor();
    ingestor.ingest_live().await.unwrap();
    ingestor.rebuild_index().await.unwrap();
    let first_ids = h.store.ids().unwrap();

    let report = ingestor.rebuild_index().await.unwrap();
    assert_eq!(report.deleted, Some(4));

    assert_eq!(h.store.count(Some(Source::Live)).await.unwrap(), 2);
    assert_eq!(h.store.count(Some(Source::BulkExport)).await.unwrap(), 4);
    assert_eq!(h.store.count(None).await.unwrap(), 6);

    let mut a = first_ids;
    let mut b = h.store.ids().unwrap();
    a.sort();
    b.sort();
    assert_eq!(a, b);
    assert!(h.store.get("live-1").unwrap().is_some());
}

#[tokio::test]
async fn rebuild_continues_when_clearing_fails() {
    let h = Harness::new(128, 64);
    h.write_sample_export();

    let store = Arc::new(FlakyStore::new(true, None));
    let report = h.ingestor_on(store.clone()).rebuild_index().await.unwrap();

    assert_eq!(report.deleted, None);
    assert_eq!(report.entries, 4);
    assert_eq!(store.count(Some(Source::BulkExport)).await.unwrap(), 4);
}

#[tokio::test]
async fn rebuild_fails_when_store_add_fails() {
    let h = Harness::new(2, 64);
    h.write_sample_export();

    let store = Arc::new(FlakyStore::new(false, Some(1)));
    let err = h.ingestor_on(store.clone()).rebuild_index().await.unwrap_err();

    assert!(matches!(err, IngestError::Store(_)));
    assert_eq!(store.inner.ids().unwrap(), vec!["export-0", "export-1"]);
}

#[tokio::test]
async fn rebuild_of_missing_export_is_empty() {
    let h = Harness::new(128, 64);
    let report = h.ingestor().rebuild_index().await.unwrap();
    assert_eq!(report.entries, 0);
    assert_eq!(h.embedder.calls(), 0);
}

#[tokio::test]
async fn live_ingest_resumes_after_cursor() {
    let h = Harness::new(128, 64);
    write_live_log(&h.config, &live_lines(8));

    let report = h.ingestor().ingest_new(IngestCursor::new(5)).await.unwrap();

    assert_eq!(report.entries, 3);
    assert_eq!(report.cursor, IngestCursor::new(8));
    assert_eq!(h.store.ids().unwrap(), vec!["live-6", "live-7", "live-8"]);
    assert_eq!(h.cursor.history(), vec![8]);

    let entry = h.store.get("live-7").unwrap().unwrap();
    assert_eq!(
        entry.document,
        "[2025-05-01T09:00:00+00:00] (cli, model=gpt-oss, used_rag=false)\n\
         User:\nquestion 7\n\nAssistant:\nanswer 7"
    );
    assert_eq!(entry.metadata.source, Source::Live);
    assert_eq!(entry.metadata.model.as_deref(), Some("gpt-oss"));
}

#[tokio::test]
async fn second_ingest_adds_nothing() {
    let h = Harness::new(128, 64);
    write_live_log(&h.config, &live_lines(3));
    let ingestor = h.ingestor();

    let first = ingestor.ingest_live().await.unwrap();
    assert_eq!(first.cursor.last_line, 3);
    let calls = h.embedder.calls();

    let second = ingestor.ingest_live().await.unwrap();
    assert_eq!(second.entries, 0);
    assert_eq!(second.cursor.last_line, 3);
    assert_eq!(h.embedder.calls(), calls);
    assert_eq!(h.store.count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn malformed_and_empty_lines_are_skipped_but_consumed() {
    let h = Harness::new(128, 64);
    write_live_log(
        &h.config,
        &[
            live_line("first", "one"),
            "{not json".to_string(),
            String::new(),
            live_line("  ", ""),
            live_line("fifth", "five"),
            "[1, 2, 3]".to_string(),
        ],
    );

    let report = h.ingestor().ingest_live().await.unwrap();

    assert_eq!(report.entries, 2);
    assert_eq!(report.skipped_noise, 1);
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[0].location.ends_with(":2"));
    assert!(report.warnings[1].location.ends_with(":6"));
    assert_eq!(report.cursor.last_line, 6);
    assert_eq!(h.store.ids().unwrap(), vec!["live-1", "live-5"]);
}

#[tokio::test]
async fn invalid_utf8_line_is_skipped() {
    let h = Harness::new(128, 64);
    let mut bytes = Vec::new();
    bytes.extend_from_slice(live_line("first", "one").as_bytes());
    bytes.extend_from_slice(b"\n{\"user_prompt\": \"\xff\xfe bad\"}\n");
    bytes.extend_from_slice(live_line("third", "three").as_bytes());
    bytes.push(b'\n');
    std::fs::create_dir_all(h.config.paths.live_log.parent().unwrap()).unwrap();
    std::fs::write(&h.config.paths.live_log, bytes).unwrap();

    let report = h.ingestor().ingest_live().await.unwrap();

    assert_eq!(report.entries, 2);
    assert_eq!(report.lines_scanned, 3);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].location.ends_with(":2"));
    assert_eq!(report.cursor.last_line, 3);
    assert_eq!(h.store.ids().unwrap(), vec!["live-1", "live-3"]);
}

#[tokio::test]
async fn failed_batch_keeps_cursor_at_last_commit() {
    let h = Harness::new(128, 2);
    write_live_log(&h.config, &live_lines(5));

    let failing = Arc::new(LetterEmbedder::failing_from(1));
    let err = h.ingestor_with(failing).ingest_live().await.unwrap_err();
    assert!(matches!(err, IngestError::Embed(EmbedError::Timeout(_))));

    assert_eq!(h.cursor.history(), vec![2]);
    assert_eq!(h.cursor.load().unwrap().last_line, 2);
    assert_eq!(h.store.ids().unwrap(), vec!["live-1", "live-2"]);

    let report = h.ingestor().ingest_live().await.unwrap();
    assert_eq!(report.previous.last_line, 2);
    assert_eq!(report.cursor.last_line, 5);
    assert_eq!(h.cursor.history(), vec![2, 4, 5]);
    assert_eq!(
        h.store.ids().unwrap(),
        vec!["live-1", "live-2", "live-3", "live-4", "live-5"]
    );
}

#[tokio::test]
async fn failed_store_add_keeps_cursor_at_last_commit() {
    let h = Harness::new(128, 2);
    write_live_log(&h.config, &live_lines(5));

    let store = Arc::new(FlakyStore::new(false, Some(1)));
    let err = h
        .ingestor_on(store.clone())
        .ingest_new(IngestCursor::default())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Store(_)));
    assert_eq!(h.cursor.history(), vec![2]);
    assert_eq!(store.inner.ids().unwrap(), vec!["live-1", "live-2"]);
}

#[tokio::test]
async fn final_partial_live_batch_reports_progress() {
    let h = Harness::new(128, 64);
    write_live_log(&h.config, &live_lines(3));

    let progress = RecordingProgress::default();
    let report = h
        .ingestor()
        .with_progress(Box::new(progress.clone()))
        .ingest_live()
        .await
        .unwrap();
    assert_eq!(report.batches, 1);

    let events = progress.events.lock().unwrap();
    let batches: Vec<_> = events
        .iter()
        .map(|e| match e {
            IngestProgressEvent::BatchAdded {
                phase,
                batch,
                entries,
                cursor,
            } => (*phase, *batch, *entries, *cursor),
        })
        .collect();
    assert_eq!(batches, vec![(IngestPhase::Live, 1, 3, Some(3))]);
}

#[tokio::test]
async fn missing_log_leaves_cursor() {
    let h = Harness::new(128, 64);
    let report = h.ingestor().ingest_new(IngestCursor::new(4)).await.unwrap();
    assert_eq!(report.cursor.last_line, 4);
    assert!(h.cursor.history().is_empty());
}

#[tokio::test]
async fn log_shorter_than_cursor_leaves_cursor() {
    let h = Harness::new(128, 64);
    write_live_log(&h.config, &live_lines(3));
    let report = h.ingestor().ingest_new(IngestCursor::new(10)).await.unwrap();
    assert_eq!(report.cursor.last_line, 10);
    assert_eq!(report.entries, 0);
}

#[tokio::test]
async fn context_prefers_related_conversation() {
    let h = Harness::new(128, 64);
    h.write_sample_export();
    h.ingestor().rebuild_index().await.unwrap();

    let context = assemble_context(
        h.store.as_ref(),
        h.embedder.as_ref(),
        "mount nfs share",
        1,
        8000,
    )
    .await
    .unwrap();

    assert!(context.starts_with(CONTEXT_HEADER));
    assert!(context.contains("[NFS] (user):\nHow do I mount an NFS share?\n"));
    assert!(!context.contains("carbonara"));
}

#[tokio::test]
async fn context_is_empty_without_hits_or_budget() {
    let h = Harness::new(128, 64);
    let empty = assemble_context(h.store.as_ref(), h.embedder.as_ref(), "anything", 8, 8000)
        .await
        .unwrap();
    assert_eq!(empty, "");

    h.write_sample_export();
    h.ingestor().rebuild_index().await.unwrap();
    let tiny = assemble_context(h.store.as_ref(), h.embedder.as_ref(), "nfs", 8, 10)
        .await
        .unwrap();
    assert_eq!(tiny, "");

    let calls = h.embedder.calls();
    let blank = assemble_context(h.store.as_ref(), h.embedder.as_ref(), "   ", 8, 8000)
        .await
        .unwrap();
    assert_eq!(blank, "");
    assert_eq!(h.embedder.calls(), calls);
}

#[tokio::test]
async fn answered_prompt_flows_back_into_index() {
    let h = Harness::new(128, 64);
    h.write_sample_export();
    h.ingestor().rebuild_index().await.unwrap();

    let chat = Arc::new(EchoChat::new());
    let assistant = Assistant::new(
        ContextAssembler::new(h.store.clone(), h.embedder.clone(), &h.config.retrieval),
        chat.clone(),
        InteractionLog::new(&h.config.paths.live_log),
    );

    let outcome = assistant
        .ask(&AskRequest {
            prompt: "mount nfs share".to_string(),
            system_prompt: cli_system_prompt(None),
            use_rag: true,
            model: None,
            source: "cli".to_string(),
        })
        .await
        .unwrap();

    assert!(outcome.used_rag);
    assert!(outcome.logged);
    assert_eq!(outcome.model, "echo-model");
    assert!(outcome
        .sent_prompt
        .starts_with("Use the following retrieved context"));
    assert!(outcome.sent_prompt.ends_with("### Question\nmount nfs share"));
    assert_eq!(*chat.last_user.lock().unwrap(), outcome.sent_prompt);
    assert_eq!(outcome.reply, "echo: mount nfs share");

    let report = h.ingestor().ingest_live().await.unwrap();
    assert_eq!(report.entries, 1);
    let entry = h.store.get("live-1").unwrap().unwrap();
    assert!(entry.document.contains("used_rag=true"));
    assert!(entry.document.contains("User:\nmount nfs share"));
    assert!(entry.document.ends_with("Assistant:\necho: mount nfs share"));
}

#[tokio::test]
async fn ask_without_rag_sends_prompt_verbatim() {
    let h = Harness::new(128, 64);
    h.write_sample_export();
    h.ingestor().rebuild_index().await.unwrap();
    let calls = h.embedder.calls();

    let assistant = Assistant::new(
        ContextAssembler::new(h.store.clone(), h.embedder.clone(), &h.config.retrieval),
        Arc::new(EchoChat::new()),
        InteractionLog::new(&h.config.paths.live_log),
    );
    let outcome = assistant
        .ask(&AskRequest {
            prompt: "plain question".to_string(),
            system_prompt: String::new(),
            use_rag: false,
            model: Some("other".to_string()),
            source: "cli".to_string(),
        })
        .await
        .unwrap();

    assert!(!outcome.used_rag);
    assert_eq!(outcome.sent_prompt, "plain question");
    assert_eq!(outcome.context, "");
    assert_eq!(outcome.model, "other");
    assert_eq!(h.embedder.calls(), calls);
}
