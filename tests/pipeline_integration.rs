//! End-to-end pipeline tests
//!
//! Each test lays out real archive pairs in a temporary directory, runs the
//! pipeline against the in-memory historian, and inspects the write calls the
//! historian received.

mod common;

use common::{
    connect, corrupt_float_record, pipeline, truncate_tag_file, ts, write_pair, Gate,
    GatedHistorian,
};
use datalog_convert::dat::encode::FloatSample;
use datalog_convert::dat::{ArchiveNaming, DatDirectory};
use datalog_convert::historian::memory::MemoryHistorian;
use datalog_convert::historian::PointKind;
use datalog_convert::pipeline::{PairStatus, PipelineOptions};
use datalog_convert::tag_map::TagMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn corrupt_tag_file_does_not_block_other_pair() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 08:00:00.000");
    let tags = [("AI101", 1), ("AI102", 2)];
    let samples = [FloatSample::new(t, 1, 1.5), FloatSample::new(t, 2, 2.5)];

    let a = write_pair(dir.path(), "2024 03 01 0000", &tags, &samples);
    let b = write_pair(dir.path(), "2024 03 02 0000", &tags, &samples);
    truncate_tag_file(&a.tag_path, &tags);

    let historian = Arc::new(
        MemoryHistorian::new()
            .with_point("AI101", 10, PointKind::Real)
            .with_point("AI102", 20, PointKind::Real),
    );
    let connection = connect(historian.clone()).await;
    let summary = pipeline(connection, None, PipelineOptions::default())
        .run(vec![a.clone(), b.clone()])
        .await;

    assert!(matches!(
        summary.outcome_for(&a),
        Some(PairStatus::Failed { .. })
    ));
    assert_eq!(
        summary.outcome_for(&b),
        Some(&PairStatus::Written {
            records: 2,
            benign: 0
        })
    );
    assert_eq!(historian.write_calls(), 1);
    assert_eq!(summary.failed(), 1);
}

#[tokio::test]
async fn missing_tag_file_fails_pair() {
    let dir = TempDir::new().unwrap();
    let pair = write_pair(dir.path(), "orphan", &[("AI101", 1)], &[]);
    std::fs::remove_file(&pair.tag_path).unwrap();

    let connection = connect(Arc::new(MemoryHistorian::accepting_all())).await;
    let summary = pipeline(connection, None, PipelineOptions::default())
        .run(vec![pair.clone()])
        .await;

    assert!(matches!(
        summary.outcome_for(&pair),
        Some(PairStatus::Failed { reason }) if reason.contains("orphan (Tagname).DAT")
    ));
}

// =============================================================================
// Record filtering
// =============================================================================

#[tokio::test]
async fn invalid_records_are_excluded() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 13:45:22.123");
    let pair = write_pair(
        dir.path(),
        "2024 03 01 0000",
        &[("AI101", 42)],
        &[
            FloatSample::new(t, 42, 98.6),
            FloatSample::new(t, 42, 11.0),
            FloatSample::new(t, 42, 98.7),
        ],
    );
    corrupt_float_record(&pair.float_path, 1);

    let historian = Arc::new(MemoryHistorian::new().with_point("AI101", 7, PointKind::Real));
    let connection = connect(historian.clone()).await;
    let summary = pipeline(connection, None, PipelineOptions::default())
        .run(vec![pair.clone()])
        .await;

    assert_eq!(summary.records_written(), 2);
    let writes = historian.writes();
    assert_eq!(writes.len(), 1);
    let values: Vec<f64> = writes[0].iter().map(|s| s.value).collect();
    assert_eq!(values, vec![98.6, 98.7]);
    assert!(writes[0].iter().all(|s| s.timestamp == t && s.point_id == 7));
}

#[tokio::test]
async fn rename_table_maps_and_drops_tags() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 00:00:01.000");
    let pair = write_pair(
        dir.path(),
        "2024 03 01 0000",
        &[("AI101", 1), ("AI999", 2)],
        &[
            FloatSample::new(t, 1, 300.0),
            FloatSample::new(t, 2, 1.0),
            FloatSample::new(t, 1, 301.0),
        ],
    );
    let tag_map = TagMap::from_reader("AI101,Reactor.Temp\n".as_bytes()).unwrap();

    let historian = Arc::new(
        MemoryHistorian::new()
            .with_point("Reactor.Temp", 17, PointKind::Real)
            .with_point("AI999", 99, PointKind::Real),
    );
    let connection = connect(historian.clone()).await;
    pipeline(connection, Some(tag_map), PipelineOptions::default())
        .run(vec![pair])
        .await;

    let writes = historian.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), 2);
    assert!(writes[0].iter().all(|s| s.point_id == 17));
    // AI999 is never looked up
    assert_eq!(historian.find_calls(), 1);
}

#[tokio::test]
async fn pair_without_resolvable_points_is_skipped() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 00:00:00.000");
    let pair = write_pair(
        dir.path(),
        "2024 03 01 0000",
        &[("Unknown.Tag", 1)],
        &[FloatSample::new(t, 1, 1.0)],
    );

    let historian = Arc::new(MemoryHistorian::new());
    let connection = connect(historian.clone()).await;
    let summary = pipeline(connection, None, PipelineOptions::default())
        .run(vec![pair.clone()])
        .await;

    assert_eq!(summary.outcome_for(&pair), Some(&PairStatus::Skipped));
    assert_eq!(historian.write_calls(), 0);
    assert_eq!(summary.failed(), 0);
}

// =============================================================================
// Write grouping and historian codes
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_pair_is_written_in_one_call() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 00:00:00.000");
    let mut pairs = Vec::new();
    for (day, count) in [(1, 3usize), (2, 5), (3, 7)] {
        let samples: Vec<_> = (0..count)
            .map(|i| FloatSample::new(t, 1, i as f64))
            .collect();
        pairs.push(write_pair(
            dir.path(),
            &format!("2024 03 0{day} 0000"),
            &[("AI101", 1)],
            &samples,
        ));
    }

    let historian = Arc::new(MemoryHistorian::new().with_point("AI101", 5, PointKind::Real));
    let connection = connect(historian.clone()).await;
    let summary = pipeline(connection, None, PipelineOptions::default())
        .run(pairs)
        .await;

    let mut sizes: Vec<usize> = historian.writes().iter().map(Vec::len).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![3, 5, 7]);
    assert_eq!(summary.records_written(), 15);
    assert_eq!(summary.outcomes.len(), 3);
}

#[tokio::test]
async fn benign_item_codes_do_not_fail_pair() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 00:00:00.000");
    let pair = write_pair(
        dir.path(),
        "2024 03 01 0000",
        &[("A", 1), ("B", 2)],
        &[FloatSample::new(t, 1, 1.0), FloatSample::new(t, 2, 2.0)],
    );

    let historian = Arc::new(
        MemoryHistorian::new()
            .with_point("A", 10, PointKind::Real)
            .with_point("B", 20, PointKind::Real)
            .with_item_code(20, -109),
    );
    let connection = connect(historian).await;
    let summary = pipeline(connection, None, PipelineOptions::default())
        .run(vec![pair.clone()])
        .await;

    assert_eq!(
        summary.outcome_for(&pair),
        Some(&PairStatus::Written {
            records: 2,
            benign: 1
        })
    );
}

#[tokio::test]
async fn failing_historian_writes_fail_each_pair() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 00:00:00.000");
    let a = write_pair(dir.path(), "a", &[("A", 1)], &[FloatSample::new(t, 1, 1.0)]);
    let b = write_pair(dir.path(), "b", &[("A", 1)], &[FloatSample::new(t, 1, 1.0)]);

    let historian = Arc::new(
        MemoryHistorian::new()
            .with_point("A", 10, PointKind::Real)
            .failing_writes(),
    );
    let connection = connect(historian).await;
    let summary = pipeline(connection, None, PipelineOptions::default())
        .run(vec![a, b])
        .await;

    assert_eq!(summary.failed(), 2);
    assert_eq!(summary.records_written(), 0);
}

// =============================================================================
// Point resolution across pairs
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_tags_are_resolved_once_per_run() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 00:00:00.000");
    let pairs: Vec<_> = (1..=6)
        .map(|day| {
            write_pair(
                dir.path(),
                &format!("2024 03 0{day} 0000"),
                &[("AI101", 1), ("AI102", 2)],
                &[FloatSample::new(t, 1, 1.0), FloatSample::new(t, 2, 2.0)],
            )
        })
        .collect();

    let historian = Arc::new(
        MemoryHistorian::new()
            .with_point("AI101", 10, PointKind::Real)
            .with_point("AI102", 20, PointKind::Integer)
            .with_latency(Duration::from_millis(5)),
    );
    let connection = connect(historian.clone()).await;
    let pipeline = pipeline(connection, None, PipelineOptions::default());
    let summary = pipeline.run(pairs).await;

    assert_eq!(historian.find_calls(), 2);
    assert_eq!(historian.type_calls(), 2);
    assert_eq!(pipeline.resolver().stats().requests, 12);
    assert_eq!(summary.records_written(), 12);
}

// =============================================================================
// Backpressure and discovery
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_writer_with_small_queue_still_writes_everything() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 00:00:00.000");
    for i in 0..8 {
        write_pair(
            dir.path(),
            &format!("2024 03 01 {i:04}"),
            &[("AI101", 1)],
            &[FloatSample::new(t, 1, f64::from(i))],
        );
    }
    let listing = DatDirectory::scan(dir.path(), &ArchiveNaming::default()).unwrap();
    assert_eq!(listing.pairs().len(), 8);

    let historian = Arc::new(
        MemoryHistorian::new()
            .with_point("AI101", 1, PointKind::Real)
            .with_latency(Duration::from_millis(10)),
    );
    let connection = connect(historian.clone()).await;
    let options = PipelineOptions {
        decode_workers: 2,
        writer_workers: 1,
        queue_capacity: 1,
    };
    let summary = pipeline(connection, None, options)
        .run(listing.into_pairs())
        .await;

    assert_eq!(historian.write_calls(), 8);
    assert_eq!(summary.records_written(), 8);
    let names: Vec<_> = summary.outcomes.iter().map(|o| o.pair.name()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn decoding_pairs_never_exceed_decode_workers() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 00:00:00.000");
    let mut memory = MemoryHistorian::new();
    let mut pairs = Vec::new();
    for day in 1..=5 {
        let tag = format!("AI10{day}");
        memory = memory.with_point(&tag, day, PointKind::Real);
        pairs.push(write_pair(
            dir.path(),
            &format!("2024 03 0{day} 0000"),
            &[(tag.as_str(), day)],
            &[FloatSample::new(t, day, 1.0)],
        ));
    }

    let historian = Arc::new(GatedHistorian::new(memory, Gate::FindPoint));
    let connection = connect(historian.clone()).await;
    let options = PipelineOptions {
        decode_workers: 2,
        writer_workers: 2,
        queue_capacity: 4,
    };
    let pipeline = Arc::new(pipeline(connection, None, options));
    let run = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run(pairs).await }
    });

    for _ in 0..10 {
        sleep(Duration::from_millis(10)).await;
        assert!(pipeline.resolver().stats().requests <= 2);
    }
    assert_eq!(pipeline.resolver().stats().requests, 2);

    historian.open();
    let summary = run.await.unwrap();
    assert_eq!(summary.records_written(), 5);
    assert_eq!(historian.inner.write_calls(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_queue_holds_decode_permit() {
    let dir = TempDir::new().unwrap();
    let t = ts("2024-03-01 00:00:00.000");
    let pairs: Vec<_> = (1..=4)
        .map(|day| {
            write_pair(
                dir.path(),
                &format!("2024 03 0{day} 0000"),
                &[("AI101", 1)],
                &[FloatSample::new(t, 1, f64::from(day))],
            )
        })
        .collect();

    let memory = MemoryHistorian::new().with_point("AI101", 1, PointKind::Real);
    let historian = Arc::new(GatedHistorian::new(memory, Gate::PutSnapshots));
    let connection = connect(historian.clone()).await;
    let options = PipelineOptions {
        decode_workers: 1,
        writer_workers: 1,
        queue_capacity: 1,
    };
    let pipeline = Arc::new(pipeline(connection, None, options));
    let run = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run(pairs).await }
    });

    // one pair in the blocked write, one in the queue, one decoded and waiting
    // to be queued; the fourth must not start decoding
    for _ in 0..20 {
        sleep(Duration::from_millis(10)).await;
        assert!(pipeline.resolver().stats().requests <= 3);
    }
    assert_eq!(pipeline.resolver().stats().requests, 3);
    assert_eq!(historian.inner.write_calls(), 0);

    historian.open();
    let summary = run.await.unwrap();
    assert_eq!(summary.records_written(), 4);
    assert_eq!(historian.inner.write_calls(), 4);
}
