//! Store contract tests: the properties every backend must hold, exercised
//! against the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};

use clusterq_core::model::{
    Job, JobStatus, Node, NodeStatus, Processor, ProcessorStatus, ResultMetadata,
};
use clusterq_core::store::{QueueStore, DEFAULT_PENDING_LIMIT};
use clusterq_testing::MemoryStore;

fn pending(payload: &str, tags: Option<Vec<String>>) -> Job {
    Job::pending(payload, tags, None, None, Utc::now().naive_utc()).unwrap()
}

fn sample_result(returncode: i32) -> ResultMetadata {
    let ts = Utc::now().naive_utc();
    ResultMetadata {
        returncode,
        start_timestamp: ts,
        end_timestamp: ts,
        duration_s: 0.0,
    }
}

async fn register(store: &MemoryStore, hostname: &str, tags: &[&str]) {
    let node = Node::new(
        hostname,
        NodeStatus::Started,
        tags.iter().map(|s| s.to_string()).collect(),
        8,
        Utc::now().naive_utc(),
    )
    .unwrap();
    store.register_node(&node).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_claims_have_exactly_one_winner() {
    let store = Arc::new(MemoryStore::new());
    register(&store, "host-A", &["cpu"]).await;

    let job_id = store.submit_job(&pending("sleep 1", None)).await.unwrap();

    // Eight processors race for one job.
    let claims = (0..8).map(|processor_id| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            // Jitter so the interleaving differs from run to run.
            tokio::time::sleep(Duration::from_millis(fastrand::u64(0..5))).await;
            let won = store.claim_job(job_id, "host-A", processor_id).await.unwrap();
            (processor_id, won)
        })
    });

    let outcomes: Vec<(i32, bool)> = futures::future::join_all(claims)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners: Vec<i32> = outcomes
        .iter()
        .filter(|(_, won)| *won)
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(winners.len(), 1, "claims: {outcomes:?}");

    let job = store.fetch_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Claimed);
    assert_eq!(job.assigned_node.as_deref(), Some("host-A"));
    assert_eq!(job.assigned_node_processor, Some(winners[0]));
}

#[tokio::test]
async fn reclaiming_with_the_winning_identity_still_reads_back_true() {
    // The read-back makes the claim idempotent for the winner: a retried
    // update cannot produce a phantom failure.
    let store = MemoryStore::new();
    register(&store, "host-A", &[]).await;
    let job_id = store.submit_job(&pending("true", None)).await.unwrap();

    assert!(store.claim_job(job_id, "host-A", 0).await.unwrap());
    assert!(store.claim_job(job_id, "host-A", 0).await.unwrap());
    assert!(!store.claim_job(job_id, "host-A", 1).await.unwrap());
    assert!(!store.claim_job(job_id, "host-B", 0).await.unwrap());
}

#[tokio::test]
async fn claiming_a_missing_job_fails() {
    let store = MemoryStore::new();
    assert!(!store.claim_job(999, "host-A", 0).await.unwrap());
}

#[tokio::test]
async fn eligibility_follows_tag_compatibility() {
    let store = MemoryStore::new();

    let untagged = store.submit_job(&pending("true", None)).await.unwrap();
    let gpu = store
        .submit_job(&pending("true", Some(vec!["gpu".into()])))
        .await
        .unwrap();
    let gpu_cpu = store
        .submit_job(&pending("true", Some(vec!["gpu".into(), "cpu".into()])))
        .await
        .unwrap();

    let ids = |jobs: Vec<Job>| -> Vec<i64> { jobs.iter().filter_map(|j| j.job_id).collect() };

    // Untagged node: only untagged jobs.
    let seen = ids(store.pending_jobs(&[], 10).await.unwrap());
    assert_eq!(seen, vec![untagged]);

    // gpu node: untagged + gpu, but not gpu+cpu (missing cpu).
    let seen = ids(store.pending_jobs(&["gpu".to_string()], 10).await.unwrap());
    assert_eq!(seen, vec![untagged, gpu]);

    // gpu+cpu node: everything.
    let seen = ids(
        store
            .pending_jobs(&["gpu".to_string(), "cpu".to_string()], 10)
            .await
            .unwrap(),
    );
    assert_eq!(seen, vec![untagged, gpu, gpu_cpu]);

    // cpu node: the gpu job never shows up (scenario S2).
    let seen = ids(store.pending_jobs(&["cpu".to_string()], 10).await.unwrap());
    assert_eq!(seen, vec![untagged]);
    let job = store.fetch_job(gpu).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
}

#[tokio::test]
async fn empty_tag_list_is_stored_as_untagged() {
    let store = MemoryStore::new();
    let id = store
        .submit_job(&pending("true", Some(vec![])))
        .await
        .unwrap();

    let job = store.fetch_job(id).await.unwrap().unwrap();
    assert_eq!(job.tags, None);

    // Visible even to a node with unrelated tags.
    let seen = store
        .pending_jobs(&["weird".to_string()], 10)
        .await
        .unwrap();
    assert_eq!(seen.len(), 1);
}

#[tokio::test]
async fn poll_is_fifo_by_submission_then_id() {
    let store = MemoryStore::new();

    let mut base = pending("true", None);
    let t0 = Utc::now().naive_utc();

    // Same submission time for the last two, so the id breaks the tie.
    base.submission_time = t0;
    let j1 = store.submit_job(&base).await.unwrap();
    base.submission_time = t0 + chrono::Duration::seconds(1);
    let j2 = store.submit_job(&base).await.unwrap();
    let j3 = store.submit_job(&base).await.unwrap();

    let seen: Vec<i64> = store
        .pending_jobs(&[], DEFAULT_PENDING_LIMIT)
        .await
        .unwrap()
        .iter()
        .filter_map(|j| j.job_id)
        .collect();
    assert_eq!(seen, vec![j1, j2, j3]);
}

#[tokio::test]
async fn successive_polls_drain_in_submission_order() {
    // Scenario S6: one worker, three untagged jobs, three polls.
    let store = MemoryStore::new();
    register(&store, "host-A", &["gpu"]).await;

    let mut base = pending("true", None);
    let t0 = Utc::now().naive_utc();
    let mut expected = Vec::new();
    for offset in 0..3 {
        base.submission_time = t0 + chrono::Duration::seconds(offset);
        expected.push(store.submit_job(&base).await.unwrap());
    }

    for expected_id in expected {
        let batch = store.pending_jobs(&["gpu".to_string()], 1).await.unwrap();
        let job_id = batch[0].job_id.unwrap();
        assert_eq!(job_id, expected_id);

        assert!(store.claim_job(job_id, "host-A", 0).await.unwrap());
        store.mark_running(job_id).await.unwrap();
        assert!(store.complete_job(job_id, &sample_result(0)).await.unwrap());
    }

    assert!(store.pending_jobs(&["gpu".to_string()], 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn poll_limit_is_clamped_to_at_least_one() {
    let store = MemoryStore::new();
    store.submit_job(&pending("true", None)).await.unwrap();
    store.submit_job(&pending("true", None)).await.unwrap();

    assert_eq!(store.pending_jobs(&[], 0).await.unwrap().len(), 1);
    assert_eq!(store.pending_jobs(&[], -5).await.unwrap().len(), 1);
}

#[tokio::test]
async fn submitted_jobs_round_trip() {
    let store = MemoryStore::new();

    let mut env = HashMap::new();
    env.insert("TEST_VAR_1".to_string(), "Hello World".to_string());
    let mut meta = Map::new();
    meta.insert("CWD".to_string(), Value::String("/tmp".to_string()));
    meta.insert("batch".to_string(), Value::from(7));

    let job = Job::pending(
        "echo $TEST_VAR_1",
        Some(vec!["gpu".into(), "bigmem".into()]),
        Some(env.clone()),
        Some(meta.clone()),
        Utc::now().naive_utc(),
    )
    .unwrap();

    let id = store.submit_job(&job).await.unwrap();
    let back = store.fetch_job(id).await.unwrap().unwrap();

    assert_eq!(back.payload, "echo $TEST_VAR_1");
    assert_eq!(back.status, JobStatus::Pending);
    assert_eq!(back.tags, Some(vec!["gpu".to_string(), "bigmem".to_string()]));
    assert_eq!(back.env_variables, Some(env));
    assert_eq!(back.metadata, Some(meta));
    assert_eq!(back.submission_time, job.submission_time);
    assert_eq!(back.result_metadata, None);
}

#[tokio::test]
async fn interrupted_jobs_swallow_late_completions() {
    // A node stop beats the worker's COMPLETED write; the terminal
    // INTERRUPTED status must stand.
    let store = MemoryStore::new();
    register(&store, "host-A", &[]).await;

    let job_id = store.submit_job(&pending("sleep 30", None)).await.unwrap();
    assert!(store.claim_job(job_id, "host-A", 0).await.unwrap());
    store.mark_running(job_id).await.unwrap();

    let interrupted = store.stop_node("host-A").await.unwrap();
    assert_eq!(interrupted, 1);
    assert_eq!(
        store.node("host-A").unwrap().status,
        NodeStatus::Stopped
    );

    // The still-living child finishes and its worker reports completion.
    let landed = store.complete_job(job_id, &sample_result(0)).await.unwrap();
    assert!(!landed);

    let job = store.fetch_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Interrupted);
    assert_eq!(job.result_metadata, None);
}

#[tokio::test]
async fn stop_node_leaves_other_nodes_jobs_alone() {
    let store = MemoryStore::new();
    register(&store, "host-A", &[]).await;
    register(&store, "host-B", &[]).await;

    let a = store.submit_job(&pending("true", None)).await.unwrap();
    let b = store.submit_job(&pending("true", None)).await.unwrap();
    assert!(store.claim_job(a, "host-A", 0).await.unwrap());
    assert!(store.claim_job(b, "host-B", 0).await.unwrap());
    store.mark_running(a).await.unwrap();
    store.mark_running(b).await.unwrap();

    assert_eq!(store.stop_node("host-A").await.unwrap(), 1);

    let job = store.fetch_job(b).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(store.node("host-B").unwrap().status, NodeStatus::Started);
}

#[tokio::test]
async fn stop_node_skips_non_running_jobs() {
    let store = MemoryStore::new();
    register(&store, "host-A", &[]).await;

    let claimed = store.submit_job(&pending("true", None)).await.unwrap();
    assert!(store.claim_job(claimed, "host-A", 0).await.unwrap());

    let done = store.submit_job(&pending("true", None)).await.unwrap();
    assert!(store.claim_job(done, "host-A", 1).await.unwrap());
    store.mark_running(done).await.unwrap();
    assert!(store.complete_job(done, &sample_result(0)).await.unwrap());

    assert_eq!(store.stop_node("host-A").await.unwrap(), 0);
    assert_eq!(
        store.fetch_job(claimed).await.unwrap().unwrap().status,
        JobStatus::Claimed
    );
    assert_eq!(
        store.fetch_job(done).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn heartbeat_is_idempotent_up_to_last_seen() {
    let store = MemoryStore::new();
    register(&store, "host-A", &[]).await;

    let first = Processor::new("host-A", 0, ProcessorStatus::Idle, Utc::now().naive_utc()).unwrap();
    store.upsert_processor(&first).await.unwrap();

    let later = Utc::now().naive_utc() + chrono::Duration::seconds(5);
    let second = Processor::new("host-A", 0, ProcessorStatus::Idle, later).unwrap();
    store.upsert_processor(&second).await.unwrap();

    let row = store.processor("host-A", 0).unwrap();
    assert_eq!(row.processor_id, first.processor_id);
    assert_eq!(row.parent_node, first.parent_node);
    assert_eq!(row.status, first.status);
    assert_eq!(row.last_seen, later);

    // The parent node's last_seen rides along with the heartbeat.
    assert_eq!(store.node("host-A").unwrap().last_seen, later);
}

#[tokio::test]
async fn heartbeat_requires_a_registered_parent() {
    let store = MemoryStore::new();
    let orphan =
        Processor::new("ghost-host", 0, ProcessorStatus::Idle, Utc::now().naive_utc()).unwrap();
    assert!(store.upsert_processor(&orphan).await.is_err());
}

#[tokio::test]
async fn node_registration_is_an_upsert() {
    let store = MemoryStore::new();
    register(&store, "host-A", &["cpu"]).await;

    let node = Node::new(
        "host-A",
        NodeStatus::Started,
        vec!["cpu".into(), "gpu".into()],
        16,
        Utc::now().naive_utc(),
    )
    .unwrap();
    store.register_node(&node).await.unwrap();

    let row = store.node("host-A").unwrap();
    assert_eq!(row.tags, vec!["cpu".to_string(), "gpu".to_string()]);
    assert_eq!(row.num_parallel_jobs, 16);
}
