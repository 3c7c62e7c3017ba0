//! Integration tests for the scheduler kernel and the I/O reactor.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use weft::Scheduler;
use weft_core::Pipe;

#[test]
fn test_single_worker_single_thread() {
    let scheduler = Scheduler::new(1);
    let counter = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&counter);
    scheduler
        .add_thread(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    scheduler.join_all();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(!scheduler.joinable());
}

#[test]
fn test_multi_worker_many_threads() {
    let scheduler = Scheduler::new(4);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..1000 {
        let c = Arc::clone(&counter);
        scheduler
            .add_thread(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    scheduler.join_all();

    assert_eq!(counter.load(Ordering::SeqCst), 1000);
    assert!(!scheduler.joinable());
}

#[test]
fn test_yielding_threads_complete_exactly_once() {
    let scheduler = Scheduler::new(4);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let c = Arc::clone(&counter);
        scheduler
            .add_thread(move || {
                for _ in 0..5 {
                    weft::yield_now();
                }
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    scheduler.join_all();

    assert_eq!(counter.load(Ordering::SeqCst), 100);
}

/// With one worker and the FIFO strategy, two yielding threads alternate
/// strictly: A,B,A,B,A,B,A_done,B_done.
///
/// A gate thread occupies the single worker until both tagged threads are
/// enqueued, so the pool order is fixed before either runs.
#[test]
fn test_cooperative_yield_interleaving() {
    let scheduler = Scheduler::new(1);
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let released = Arc::new(AtomicBool::new(false));

    let gate = Arc::clone(&released);
    scheduler
        .add_thread(move || {
            while !gate.load(Ordering::Acquire) {
                thread::yield_now();
            }
        })
        .unwrap();

    for (tag, done_tag) in [("A", "A_done"), ("B", "B_done")] {
        let log = Arc::clone(&log);
        scheduler
            .add_thread(move || {
                for _ in 0..3 {
                    log.lock().unwrap().push(tag);
                    weft::yield_now();
                }
                log.lock().unwrap().push(done_tag);
            })
            .unwrap();
    }

    released.store(true, Ordering::Release);
    scheduler.join_all();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["A", "B", "A", "B", "A", "B", "A_done", "B_done"]
    );
}

#[test]
fn test_reactor_wakes_parked_thread() {
    let scheduler = Scheduler::new(1);
    let pipe = Pipe::new().unwrap();
    let read_fd = pipe.read_fd();
    let done = Arc::new(AtomicBool::new(false));

    let d = Arc::clone(&done);
    scheduler
        .add_thread(move || {
            assert!(weft::io::wait_readable(read_fd));
            d.store(true, Ordering::Release);
        })
        .unwrap();

    // Let the thread reach the reactor before making the fd ready.
    while scheduler.parked_count() == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(!done.load(Ordering::Acquire));
    assert!(scheduler.joinable());

    pipe.wake();
    scheduler.join_all();

    assert!(done.load(Ordering::Acquire));
    assert_eq!(scheduler.parked_count(), 0);
    assert!(!scheduler.joinable());
}

#[test]
fn test_reactor_wakes_multiple_parked_threads() {
    let scheduler = Scheduler::new(2);
    let completions = Arc::new(AtomicUsize::new(0));
    let mut pipes = Vec::new();

    for _ in 0..4 {
        let pipe = Pipe::new().unwrap();
        let read_fd = pipe.read_fd();
        let c = Arc::clone(&completions);
        scheduler
            .add_thread(move || {
                assert!(weft::io::wait_readable(read_fd));
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        pipes.push(pipe);
    }

    while scheduler.parked_count() < 4 {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(completions.load(Ordering::SeqCst), 0);

    for pipe in &pipes {
        pipe.wake();
    }
    scheduler.join_all();

    assert_eq!(completions.load(Ordering::SeqCst), 4);
}

#[test]
fn test_writable_descriptor_resumes_immediately() {
    let scheduler = Scheduler::new(1);
    let pipe = Pipe::new().unwrap();
    let write_fd = pipe.write_fd();
    let done = Arc::new(AtomicBool::new(false));

    let d = Arc::clone(&done);
    scheduler
        .add_thread(move || {
            // An empty pipe is writable, so the park is transparent.
            assert!(weft::io::wait_writable(write_fd));
            d.store(true, Ordering::Release);
        })
        .unwrap();
    scheduler.join_all();

    assert!(done.load(Ordering::Acquire));
}

#[test]
fn test_idle_teardown_joins_reactor() {
    let scheduler = Scheduler::new(2);
    assert!(!scheduler.joinable());
    drop(scheduler);
}

#[test]
fn test_teardown_after_join_all() {
    let scheduler = Scheduler::new(2);
    for _ in 0..10 {
        scheduler.add_thread(|| {}).unwrap();
    }
    scheduler.join_all();
    drop(scheduler);
}

#[test]
fn test_repeated_join_all() {
    let scheduler = Scheduler::new(2);
    let counter = Arc::new(AtomicUsize::new(0));

    for round in 1..=3 {
        for _ in 0..20 {
            let c = Arc::clone(&counter);
            scheduler
                .add_thread(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        scheduler.join_all();
        assert_eq!(counter.load(Ordering::SeqCst), round * 20);
    }
}

#[test]
fn test_yield_now_outside_user_thread_is_a_noop() {
    weft::yield_now();
}
