//! Integration tests for worker start/stop/reset.
//!
//! NOTE: These tests use #[serial] because several of them hold the worker
//! inside a slow callback and assert on queue lengths; running them next to
//! each other makes those timings noisy.

use event_relay::{api, DispatchError, Dispatcher, DispatcherConfig, Handler, RunState};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn counting(hits: &Arc<AtomicUsize>) -> Handler {
    let hits = hits.clone();
    Handler::string(move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[test]
#[serial]
fn test_queue_survives_stop_and_reset() {
    let dispatcher = Dispatcher::default();
    let hits = Arc::new(AtomicUsize::new(0));
    dispatcher.register("email", counting(&hits));

    dispatcher.start().unwrap();
    dispatcher.stop();
    assert_eq!(dispatcher.run_state(), RunState::Stopped);

    // admitted while stopped, nothing drains them
    let handles: Vec<_> = (0..3)
        .map(|i| dispatcher.invoke("email", format!("mail {i}")).unwrap())
        .collect();
    assert_eq!(dispatcher.calls_count(), 3);
    assert!(handles[0].wait_timeout(Duration::from_millis(50)).is_none());

    dispatcher.reset();
    dispatcher.start().unwrap();
    for handle in &handles {
        assert_eq!(handle.wait_timeout(WAIT).unwrap().unwrap().successes, 1);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(dispatcher.calls_count(), 0);
}

#[test]
#[serial]
fn test_stop_leaves_undrained_work_queued() {
    let dispatcher = Dispatcher::default();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);

    dispatcher.register(
        "slow",
        Handler::string(move |_| {
            entered_tx.send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
            Ok(())
        }),
    );
    dispatcher.start().unwrap();

    let first = dispatcher.invoke("slow", "1").unwrap();
    let second = dispatcher.invoke("slow", "2").unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();

    // stop joins the worker, so the callback is released from another thread
    // once the stop request is visible
    thread::scope(|s| {
        let observed = &dispatcher;
        let release = release_tx.clone();
        s.spawn(move || {
            while observed.run_state() != RunState::Stopped {
                thread::sleep(Duration::from_millis(1));
            }
            release.send(()).unwrap();
        });
        dispatcher.stop();
    });

    assert!(first.is_complete());
    assert!(!second.is_complete());
    assert_eq!(dispatcher.calls_count(), 1);

    dispatcher.reset();
    dispatcher.start().unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();
    release_tx.send(()).unwrap();
    assert_eq!(second.wait_timeout(WAIT).unwrap().unwrap().successes, 1);
    dispatcher.stop();
}

#[test]
#[serial]
fn test_admission_rejects_while_worker_is_busy() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_max_capacity(2));
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);

    dispatcher.register(
        "slow",
        Handler::string(move |_| {
            entered_tx.send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
            Ok(())
        }),
    );
    dispatcher.start().unwrap();

    // the first invocation occupies the worker and leaves the queue
    let running = dispatcher.invoke("slow", "0").unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();

    let queued: Vec<_> = (1..=2)
        .map(|i| dispatcher.invoke("slow", i.to_string()).unwrap())
        .collect();
    assert_eq!(
        dispatcher.invoke("slow", "3").unwrap_err(),
        DispatchError::QueueFull { capacity: 2 }
    );
    assert_eq!(
        dispatcher.invoke("unknown", "3").unwrap_err(),
        DispatchError::UnknownCallback {
            name: "unknown".into()
        }
    );

    for _ in 0..3 {
        release_tx.send(()).unwrap();
    }
    assert!(running.wait_timeout(WAIT).is_some());
    for handle in queued {
        assert_eq!(handle.wait_timeout(WAIT).unwrap().unwrap().successes, 1);
    }
    dispatcher.stop();
}

#[test]
#[serial]
fn test_no_callback_runs_after_stop_returns() {
    let dispatcher = Dispatcher::default();
    let hits = Arc::new(AtomicUsize::new(0));
    dispatcher.register("email", counting(&hits));
    dispatcher.start().unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| dispatcher.invoke("email", "x").unwrap())
        .collect();
    dispatcher.stop();

    let observed = hits.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::SeqCst), observed);

    let completed = handles.iter().filter(|h| h.is_complete()).count();
    assert_eq!(completed, observed);
    assert_eq!(dispatcher.calls_count(), 20 - observed);
}

#[test]
#[serial]
fn test_stop_from_inside_a_callback() {
    let dispatcher = Arc::new(Dispatcher::default());
    let (done_tx, done_rx) = mpsc::channel();

    let inner = Arc::downgrade(&dispatcher);
    dispatcher.register(
        "shutdown",
        Handler::void(move || {
            if let Some(dispatcher) = inner.upgrade() {
                dispatcher.stop();
            }
            done_tx.send(()).unwrap();
            Ok(())
        }),
    );
    dispatcher.start().unwrap();

    let handle = dispatcher.invoke("shutdown", ()).unwrap();
    done_rx.recv_timeout(WAIT).unwrap();
    assert!(handle.wait_timeout(WAIT).unwrap().is_ok());
    assert_eq!(dispatcher.run_state(), RunState::Stopped);
}

#[test]
#[serial]
fn test_restart_after_stop_inside_a_callback_keeps_one_worker() {
    let dispatcher = Arc::new(Dispatcher::default());
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);

    let inner = Arc::downgrade(&dispatcher);
    dispatcher.register(
        "shutdown",
        Handler::void(move || {
            if let Some(dispatcher) = inner.upgrade() {
                dispatcher.stop();
            }
            entered_tx.send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
            Ok(())
        }),
    );

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    for name in ["a", "b"] {
        let running = running.clone();
        let peak = peak.clone();
        dispatcher.register(
            name,
            Handler::void(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }),
        );
    }
    dispatcher.start().unwrap();

    let shutdown = dispatcher.invoke("shutdown", ()).unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(dispatcher.run_state(), RunState::Stopped);

    // the stopped worker is still inside its callback
    dispatcher.reset();
    assert_eq!(
        dispatcher.start().unwrap_err(),
        DispatchError::WorkerAlreadyRunning
    );

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let name = if i % 2 == 0 { "a" } else { "b" };
            dispatcher.invoke(name, ()).unwrap()
        })
        .collect();
    release_tx.send(()).unwrap();
    assert!(shutdown.wait_timeout(WAIT).unwrap().is_ok());

    // the retired worker exits without draining; a fresh one takes over
    let deadline = Instant::now() + WAIT;
    loop {
        match dispatcher.start() {
            Ok(()) => break,
            Err(DispatchError::WorkerAlreadyRunning) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(err) => panic!("worker did not restart: {err}"),
        }
    }
    for handle in &handles {
        assert_eq!(handle.wait_timeout(WAIT).unwrap().unwrap().successes, 1);
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    dispatcher.stop();
}

#[test]
#[serial]
fn test_block_does_not_affect_dequeued_invocation() {
    let dispatcher = Dispatcher::default();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let second_member = Arc::new(AtomicUsize::new(0));

    dispatcher.register(
        "email",
        Handler::string(move |_| {
            entered_tx.send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
            Ok(())
        }),
    );
    dispatcher.register("email", counting(&second_member));
    dispatcher.start().unwrap();

    let in_flight = dispatcher.invoke("email", "before block").unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();
    dispatcher.block_event("email", true).unwrap();
    let later = dispatcher.invoke("email", "after block").unwrap();
    release_tx.send(()).unwrap();

    let report = in_flight.wait_timeout(WAIT).unwrap().unwrap();
    assert_eq!(report.successes, 2);
    assert_eq!(report.skipped, 0);

    let report = later.wait_timeout(WAIT).unwrap().unwrap();
    assert_eq!(report.successes, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(second_member.load(Ordering::SeqCst), 1);
    dispatcher.stop();
}

#[test]
#[serial]
fn test_worker_thread_uses_configured_name() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_worker_name("mail-relay"));
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    dispatcher.register(
        "email",
        Handler::void(move || {
            *sink.lock().unwrap() = thread::current().name().map(str::to_string);
            Ok(())
        }),
    );
    dispatcher.start().unwrap();
    dispatcher.invoke("email", ()).unwrap().wait().unwrap();
    dispatcher.stop();

    assert_eq!(seen.lock().unwrap().as_deref(), Some("mail-relay"));
}

#[test]
#[serial]
fn test_api_restart_cycle() {
    let bus = Dispatcher::default();
    let hits = Arc::new(AtomicUsize::new(0));

    assert!(api::register(&bus, "email", counting(&hits), true, 1));
    assert!(api::start(&bus));
    assert!(api::stop(&bus));
    assert_eq!(api::invoke(&bus, "email", "queued while stopped", true, 1), 1);

    assert!(api::reset(&bus));
    let handle = bus.invoke("email", "after restart").unwrap();
    assert!(handle.wait_timeout(WAIT).unwrap().is_ok());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(api::stop(&bus));
}
