//! End-to-end tests for block-paginator.
//!
//! These drive a real `Paginator` (runtime, worker pool and dispatcher
//! thread) and observe it only through the listener, the way a host would.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use block_paginator::{
    event_channel, paginate, split_blocks, Block, BlockError, BlockPages, CancelToken,
    CharWindowSlicer, NoopListener, PageSlicer, PagedDocument, Paginator, PaginatorConfig,
    PagingError, PagingEvent, PagingListener, RunState,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// ── Test helpers ─────────────────────────────────────────────────────────────

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

/// Deterministic text mixing ASCII and multi-byte characters.
fn sample_text(len: usize) -> String {
    const ALPHABET: [char; 8] = ['a', 'b', 'c', ' ', '\n', 'é', '页', '😀'];
    (0..len).map(|i| ALPHABET[(i * 7 + i / 3) % ALPHABET.len()]).collect()
}

fn config(chars_per_page: usize, block_size: usize, workers: usize) -> PaginatorConfig {
    PaginatorConfig::builder()
        .chars_per_page(chars_per_page)
        .block_size(block_size)
        .worker_count(workers)
        .build()
        .expect("valid config")
}

/// Records every event with the name of the thread that delivered it.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<PagingEvent>>,
    threads: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    overlapped: AtomicUsize,
}

impl Recorder {
    fn events(&self) -> Vec<PagingEvent> {
        self.events.lock().unwrap().clone()
    }

    fn block_order(&self) -> Vec<usize> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                PagingEvent::BlockReady(b) => Some(b.block_index),
                _ => None,
            })
            .collect()
    }

    fn wait_for_events(&self, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.events.lock().unwrap().len() < n {
            assert!(Instant::now() < deadline, "timed out waiting for {n} events");
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl PagingListener for Recorder {
    fn on_event(&self, event: PagingEvent) {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.fetch_add(1, Ordering::SeqCst);
        }
        let name = thread::current().name().unwrap_or_default().to_string();
        self.threads.lock().unwrap().push(name);
        self.events.lock().unwrap().push(event);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sleeps before slicing, in short steps so cancellation is noticed.
struct SlowSlicer {
    delay: Duration,
    /// Blocks that skip the delay.
    fast: Vec<usize>,
}

impl PageSlicer for SlowSlicer {
    fn slice(
        &self,
        block: &Block,
        chars_per_page: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<String>, BlockError> {
        if !self.fast.contains(&block.index()) {
            let until = Instant::now() + self.delay;
            while Instant::now() < until {
                if cancel.is_cancelled() {
                    return Err(BlockError::Cancelled {
                        block: block.index(),
                    });
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
        CharWindowSlicer.slice(block, chars_per_page, cancel)
    }
}

/// Fails (or panics) on one block, pages the rest normally.
struct FaultySlicer {
    bad_block: usize,
    panic: bool,
}

impl PageSlicer for FaultySlicer {
    fn slice(
        &self,
        block: &Block,
        chars_per_page: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<String>, BlockError> {
        if block.index() == self.bad_block {
            if self.panic {
                panic!("slicer exploded on block {}", block.index());
            }
            return Err(BlockError::SliceFailed {
                block: block.index(),
                detail: "simulated".into(),
            });
        }
        CharWindowSlicer.slice(block, chars_per_page, cancel)
    }
}

fn final_document(events: &[PagingEvent]) -> &PagedDocument {
    match events.last() {
        Some(PagingEvent::AllBlocksReady(doc)) => doc,
        other => panic!("expected AllBlocksReady last, got {other:?}"),
    }
}

// ── Concrete scenarios ───────────────────────────────────────────────────────

#[test]
fn test_reference_scenario_3500_chars() {
    let text = sample_text(3500);
    let cfg = PaginatorConfig::builder()
        .chars_per_page(100)
        .block_size(1000)
        .worker_count(2)
        .priority_block(2)
        .build()
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    // Non-priority blocks take a little longer so the priority block's
    // head start is observable even with two workers.
    let paginator = Paginator::new(text.clone(), cfg, recorder.clone())
        .unwrap()
        .with_slicer(Arc::new(SlowSlicer {
            delay: Duration::from_millis(30),
            fast: vec![2],
        }));

    paginator.start_paging().unwrap();
    let stats = paginator.wait(WAIT).unwrap();

    let events = recorder.events();
    assert_eq!(events.len(), 5, "4 BlockReady + 1 AllBlocksReady");

    match &events[0] {
        PagingEvent::BlockReady(b) => {
            assert_eq!(b.block_index, 2);
            assert!(b.is_priority);
            assert_eq!(b.pages.len(), 10);
            let block_text: String = text.chars().skip(2000).take(1000).collect();
            assert_eq!(b.pages.concat(), block_text);
        }
        other => panic!("expected BlockReady first, got {other:?}"),
    }

    let mut seen = recorder.block_order();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);

    let doc = final_document(&events);
    assert_eq!(doc.total_pages(), 35);
    assert_eq!(doc.pages, paginate(&text, 100).unwrap());
    assert_eq!(doc.pages[34].chars().count(), 100);
    assert_eq!(stats.total_blocks, 4);
    assert_eq!(stats.total_pages, 35);
    assert_eq!(stats.priority_block, Some(2));
}

#[test]
fn test_empty_text_fires_only_all_blocks_ready() {
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new("", config(100, 1000, 3), recorder.clone()).unwrap();

    paginator.start_paging().unwrap();
    let stats = paginator.wait(WAIT).unwrap();

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    let doc = final_document(&events);
    assert!(doc.is_empty());
    assert_eq!(stats.total_blocks, 0);
    assert_eq!(stats.total_pages, 0);
}

#[test]
fn test_priority_block_first_with_single_worker() {
    let text = sample_text(2500);
    for k in 0..5 {
        let cfg = PaginatorConfig::builder()
            .chars_per_page(50)
            .block_size(500)
            .worker_count(1)
            .priority_block(k)
            .build()
            .unwrap();
        let recorder = Arc::new(Recorder::default());
        let paginator = Paginator::new(text.clone(), cfg, recorder.clone()).unwrap();
        paginator.start_paging().unwrap();
        paginator.wait(WAIT).unwrap();

        let order = recorder.block_order();
        assert_eq!(order[0], k, "priority {k}: order {order:?}");
        let rest: Vec<usize> = (0..5).filter(|&i| i != k).collect();
        assert_eq!(&order[1..], rest.as_slice(), "single worker keeps submission order");
    }
}

#[test]
fn test_out_of_range_priority_means_none() {
    let cfg = PaginatorConfig::builder()
        .chars_per_page(10)
        .block_size(100)
        .worker_count(1)
        .priority_block(99)
        .build()
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(sample_text(300), cfg, recorder.clone()).unwrap();
    paginator.start_paging().unwrap();
    let stats = paginator.wait(WAIT).unwrap();

    assert_eq!(stats.priority_block, None);
    assert_eq!(recorder.block_order(), vec![0, 1, 2]);
    assert!(recorder.events().iter().all(|e| match e {
        PagingEvent::BlockReady(b) => !b.is_priority,
        _ => true,
    }));
}

// ── Aggregation properties ───────────────────────────────────────────────────

#[test]
fn test_aggregate_matches_whole_text_when_block_is_page_multiple() {
    let text = sample_text(12_345);
    for (cpp, multiple, workers) in [(7, 3, 4), (100, 10, 2), (1, 50, 3), (64, 1, 8)] {
        let recorder = Arc::new(Recorder::default());
        let paginator =
            Paginator::new(text.clone(), config(cpp, cpp * multiple, workers), recorder.clone())
                .unwrap();
        paginator.start_paging().unwrap();
        paginator.wait(WAIT).unwrap();

        let events = recorder.events();
        let doc = final_document(&events);
        assert_eq!(doc.pages, paginate(&text, cpp).unwrap(), "cpp={cpp} x{multiple}");
    }
}

#[test]
fn test_misaligned_blocks_follow_block_boundary_policy() {
    let text = sample_text(1000);
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(text.clone(), config(30, 100, 3), recorder.clone()).unwrap();
    paginator.start_paging().unwrap();
    paginator.wait(WAIT).unwrap();

    let events = recorder.events();
    let doc = final_document(&events);
    // Each 100-char block gives pages of 30, 30, 30, 10.
    assert_eq!(doc.total_pages(), 40);
    let expected: Vec<String> = split_blocks(&text, 100)
        .unwrap()
        .iter()
        .flat_map(|b| paginate(b.text(), 30).unwrap())
        .collect();
    assert_eq!(doc.pages, expected);
    assert_eq!(doc.pages.concat(), text);
    assert_ne!(doc.pages, paginate(&text, 30).unwrap());
}

#[test]
fn test_block_events_precede_final_event_and_sum_up() {
    let text = sample_text(9_999);
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(text, config(33, 330, 4), recorder.clone()).unwrap();
    paginator.start_paging().unwrap();
    paginator.wait(WAIT).unwrap();

    let events = recorder.events();
    let (last, blocks) = events.split_last().unwrap();
    assert!(blocks.iter().all(|e| matches!(e, PagingEvent::BlockReady(_))));
    assert_eq!(blocks.len(), 31);

    let mut per_block: Vec<&BlockPages> = blocks
        .iter()
        .map(|e| match e {
            PagingEvent::BlockReady(b) => b,
            _ => unreachable!(),
        })
        .collect();
    per_block.sort_by_key(|b| b.block_index);
    let stitched: Vec<String> = per_block.iter().flat_map(|b| b.pages.iter().cloned()).collect();

    match last {
        PagingEvent::AllBlocksReady(doc) => assert_eq!(doc.pages, stitched),
        other => panic!("unexpected final event {other:?}"),
    }
}

// ── Delivery contract ────────────────────────────────────────────────────────

#[test]
fn test_events_delivered_on_one_thread_never_concurrently() {
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(sample_text(20_000), config(10, 100, 4), recorder.clone())
        .unwrap();
    paginator.start_paging().unwrap();
    paginator.wait(WAIT).unwrap();

    let threads = recorder.threads.lock().unwrap();
    assert_eq!(threads.len(), 201);
    assert!(threads.iter().all(|t| t == "paginator-dispatch"));
    assert_eq!(recorder.overlapped.load(Ordering::SeqCst), 0);
}

#[test]
fn test_start_paging_returns_immediately() {
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(sample_text(1000), config(10, 100, 2), recorder.clone())
        .unwrap()
        .with_slicer(Arc::new(SlowSlicer {
            delay: Duration::from_millis(100),
            fast: vec![],
        }));

    let started = Instant::now();
    paginator.start_paging().unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(paginator.state().is_running());
    paginator.wait(WAIT).unwrap();
}

#[test]
fn test_second_start_while_running_is_rejected() {
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(sample_text(400), config(10, 100, 1), recorder.clone())
        .unwrap()
        .with_slicer(Arc::new(SlowSlicer {
            delay: Duration::from_millis(20),
            fast: vec![],
        }));

    let run_id = paginator.start_paging().unwrap();
    assert_eq!(
        paginator.start_paging(),
        Err(PagingError::AlreadyRunning { run_id })
    );

    let stats = paginator.wait(WAIT).unwrap();
    assert_eq!(stats.run_id, run_id);
    assert_eq!(stats.total_pages, 40);
    assert_eq!(recorder.block_order().len(), 4);
}

#[test]
fn test_wait_timeout_leaves_the_run_alone() {
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(sample_text(1000), config(10, 100, 1), recorder.clone())
        .unwrap()
        .with_slicer(Arc::new(SlowSlicer {
            delay: Duration::from_millis(20),
            fast: vec![],
        }));

    let run_id = paginator.start_paging().unwrap();
    match paginator.wait(Some(Duration::from_millis(10))) {
        Err(PagingError::WaitTimeout { run_id: id, elapsed_ms }) => {
            assert_eq!(id, run_id);
            assert!(elapsed_ms >= 10, "elapsed {elapsed_ms}ms");
        }
        other => panic!("expected WaitTimeout, got {other:?}"),
    }
    assert!(paginator.state().is_running());

    let stats = paginator.wait(None).unwrap();
    assert_eq!(stats.run_id, run_id);
    assert_eq!(stats.total_pages, 100);
    assert!(matches!(recorder.events().last(), Some(PagingEvent::AllBlocksReady(_))));
}

#[test]
fn test_concurrent_waiters_see_the_same_result() {
    let paginator = Arc::new(
        Paginator::new(sample_text(600), config(10, 100, 2), Arc::new(NoopListener))
            .unwrap()
            .with_slicer(Arc::new(SlowSlicer {
                delay: Duration::from_millis(10),
                fast: vec![],
            })),
    );
    paginator.start_paging().unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let p = Arc::clone(&paginator);
            thread::spawn(move || p.wait(WAIT))
        })
        .collect();
    let results: Vec<_> = waiters.into_iter().map(|w| w.join().unwrap()).collect();
    let first = results[0].clone().unwrap();
    assert_eq!(first.total_pages, 60);
    assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[test]
fn test_slicer_error_fails_the_run_without_aborting_siblings() {
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(sample_text(500), config(10, 100, 2), recorder.clone())
        .unwrap()
        .with_slicer(Arc::new(FaultySlicer {
            bad_block: 1,
            panic: false,
        }));

    paginator.start_paging().unwrap();
    let err = paginator.wait(WAIT).unwrap_err();
    match &err {
        PagingError::WorkerFailure {
            failed,
            total,
            first_error,
        } => {
            assert_eq!((*failed, *total), (1, 5));
            assert!(first_error.contains("simulated"), "got: {first_error}");
        }
        other => panic!("expected WorkerFailure, got {other:?}"),
    }

    let mut order = recorder.block_order();
    order.sort_unstable();
    assert_eq!(order, vec![0, 2, 3, 4]);
    assert!(matches!(recorder.events().last(), Some(PagingEvent::RunFailed(e)) if *e == err));
    assert!(matches!(paginator.state(), RunState::Failed { .. }));
}

#[test]
fn test_worker_panic_is_reported_not_swallowed() {
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(sample_text(300), config(10, 100, 3), recorder.clone())
        .unwrap()
        .with_slicer(Arc::new(FaultySlicer {
            bad_block: 0,
            panic: true,
        }));

    paginator.start_paging().unwrap();
    match paginator.wait(WAIT) {
        Err(PagingError::WorkerFailure { first_error, .. }) => {
            assert!(first_error.contains("slicer exploded"), "got: {first_error}");
        }
        other => panic!("expected WorkerFailure, got {other:?}"),
    }
    assert!(!recorder
        .events()
        .iter()
        .any(|e| matches!(e, PagingEvent::AllBlocksReady(_))));
}

#[test]
fn test_barrier_timeout_is_the_last_event() {
    let cfg = PaginatorConfig::builder()
        .chars_per_page(10)
        .block_size(100)
        .worker_count(2)
        .barrier_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(sample_text(1000), cfg, recorder.clone())
        .unwrap()
        .with_slicer(Arc::new(SlowSlicer {
            delay: Duration::from_millis(500),
            fast: vec![],
        }));

    paginator.start_paging().unwrap();
    let err = paginator.wait(WAIT).unwrap_err();
    assert!(matches!(err, PagingError::BarrierTimeout { total: 10, .. }), "got {err:?}");

    // Let the in-flight workers notice the cancellation.
    thread::sleep(Duration::from_millis(100));
    let events = recorder.events();
    assert!(matches!(events.last(), Some(PagingEvent::RunFailed(_))));
}

// ── Shutdown ─────────────────────────────────────────────────────────────────

#[test]
fn test_no_events_after_shutdown_returns() {
    let recorder = Arc::new(Recorder::default());
    let paginator = Paginator::new(sample_text(2000), config(10, 100, 1), recorder.clone())
        .unwrap()
        .with_slicer(Arc::new(SlowSlicer {
            delay: Duration::from_millis(20),
            fast: vec![],
        }));

    paginator.start_paging().unwrap();
    recorder.wait_for_events(1);
    paginator.shutdown();
    let seen_at_shutdown = recorder.events().len();

    thread::sleep(Duration::from_millis(200));
    let events = recorder.events();
    assert_eq!(events.len(), seen_at_shutdown);
    assert!(seen_at_shutdown < 20);
    assert!(!events.iter().any(PagingEvent::is_terminal));
    assert_eq!(paginator.state(), RunState::ShutDown);
    assert_eq!(paginator.wait(WAIT), Err(PagingError::ShutDown));
    assert_eq!(paginator.start_paging(), Err(PagingError::ShutDown));
}

#[test]
fn test_shutdown_from_inside_a_callback() {
    struct ShutdownOnFirstBlock {
        paginator: Mutex<Option<Arc<Paginator>>>,
        calls: AtomicUsize,
    }
    impl PagingListener for ShutdownOnFirstBlock {
        fn on_block_ready(&self, _block: &BlockPages) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(p) = self.paginator.lock().unwrap().take() {
                p.shutdown();
            }
        }
    }

    let listener = Arc::new(ShutdownOnFirstBlock {
        paginator: Mutex::new(None),
        calls: AtomicUsize::new(0),
    });
    let paginator = Arc::new(
        Paginator::new(sample_text(5000), config(10, 100, 2), listener.clone())
            .unwrap()
            .with_slicer(Arc::new(SlowSlicer {
                delay: Duration::from_millis(5),
                fast: vec![],
            })),
    );
    *listener.paginator.lock().unwrap() = Some(Arc::clone(&paginator));

    paginator.start_paging().unwrap();
    assert_eq!(paginator.wait(WAIT), Err(PagingError::ShutDown));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_channel_is_empty_once_shutdown_returns() {
    let (listener, mut events) = event_channel();
    let paginator = Paginator::new(sample_text(500), config(10, 10, 1), Arc::new(listener))
        .unwrap()
        .with_slicer(Arc::new(SlowSlicer {
            delay: Duration::from_millis(10),
            fast: vec![],
        }));

    paginator.start_paging().unwrap();
    thread::sleep(Duration::from_millis(60));
    paginator.shutdown();
    assert_eq!(paginator.state(), RunState::ShutDown);

    assert!(events.is_closed());
    assert!(events.drain_ready().is_empty());
    assert!(events.try_recv().is_none());
    assert!(events.recv_blocking().is_none());

    thread::sleep(Duration::from_millis(50));
    assert!(events.drain_ready().is_empty());
}

#[test]
fn test_shutdown_releases_a_host_blocked_on_the_channel() {
    let (listener, events) = event_channel();
    let paginator = Paginator::new(sample_text(2000), config(10, 100, 1), Arc::new(listener))
        .unwrap()
        .with_slicer(Arc::new(SlowSlicer {
            delay: Duration::from_millis(20),
            fast: vec![],
        }));
    paginator.start_paging().unwrap();

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let host = thread::spawn(move || {
        let mut events = events;
        let run = events.collect_run_blocking();
        let _ = done_tx.send(());
        run
    });

    thread::sleep(Duration::from_millis(50));
    paginator.shutdown();
    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("host thread should be released by shutdown");
    let run = host.join().unwrap();
    assert!(run.len() < 20);
    assert!(!run.iter().any(PagingEvent::is_terminal));
}

// ── Host-drained channel ─────────────────────────────────────────────────────

#[test]
fn test_channel_listener_collects_a_run() {
    let (listener, mut events) = event_channel();
    let paginator = Paginator::new(sample_text(1500), config(50, 500, 2), Arc::new(listener))
        .unwrap();
    paginator.start_paging().unwrap();

    let run = events.collect_run_blocking();
    assert_eq!(run.len(), 4);
    assert_eq!(final_document(&run).total_pages(), 30);
}

#[tokio::test]
async fn test_event_stream_in_async_host() {
    let (listener, events) = event_channel();
    let paginator = Paginator::new(sample_text(800), config(40, 200, 2), Arc::new(listener))
        .unwrap();
    paginator.start_paging().unwrap();

    let mut stream = events.into_stream();
    let mut block_events = 0;
    let doc = loop {
        match tokio::time::timeout(Duration::from_secs(10), stream.next()).await {
            Ok(Some(PagingEvent::BlockReady(_))) => block_events += 1,
            Ok(Some(PagingEvent::AllBlocksReady(doc))) => break doc,
            other => panic!("unexpected {other:?}"),
        }
    };
    assert_eq!(block_events, 4);
    assert_eq!(doc.total_pages(), 20);
}

#[test]
fn test_paged_document_resume_lookup() {
    let text = sample_text(1000);
    let doc = block_paginator::paginate_text(text, config(30, 100, 2)).unwrap();
    // Offset 95 sits in the short last page of block 0 (chars 90..100).
    assert_eq!(doc.page_index_for_offset(95), Some(3));
    assert_eq!(doc.page_index_for_offset(100), Some(4));
    assert_eq!(doc.offset_of_page(4), Some(100));
}
