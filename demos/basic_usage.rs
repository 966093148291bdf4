//! Basic usage example for event-relay.
//!
//! Demonstrates:
//! - Registering several callbacks under one name
//! - Invoking a name with a string and an integer argument
//! - Waiting for the per-invocation report
//! - Admission rejections for unknown names
//!
//! Run with: `RUST_LOG=event_relay=debug cargo run --example basic_usage`

use event_relay::{Dispatcher, DispatcherConfig, Handler};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== event-relay: Basic Usage ===\n");

    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_max_capacity(16));

    // -------------------------------------------------------------------------
    // 1. Register subscribers
    // -------------------------------------------------------------------------
    println!("1. Registering subscribers...");

    dispatcher.register(
        "email",
        Handler::string(|body| {
            println!("   [smtp]    sending: {body}");
            Ok(())
        }),
    );
    dispatcher.register(
        "email",
        Handler::string(|body| {
            println!("   [archive] storing: {body}");
            Ok(())
        }),
    );

    let total = Arc::new(AtomicI64::new(0));
    let counter = total.clone();
    dispatcher.register(
        "count",
        Handler::integer(move |n| {
            counter.fetch_add(n, Ordering::SeqCst);
            Ok(())
        }),
    );

    println!("   Registered names: {}", dispatcher.callbacks_count());

    // -------------------------------------------------------------------------
    // 2. Invoke with a string
    // -------------------------------------------------------------------------
    println!("\n2. Invoking `email`...");

    dispatcher.start()?;
    let report = dispatcher.invoke("email", "our email to be sent")?.wait()?;
    println!(
        "   successes: {}, failures: {}",
        report.successes,
        report.failures.len()
    );

    // -------------------------------------------------------------------------
    // 3. Invoke with integers
    // -------------------------------------------------------------------------
    println!("\n3. Invoking `count`...");

    let handles = (1..=4)
        .map(|n| dispatcher.invoke("count", n as i64))
        .collect::<Result<Vec<_>, _>>()?;
    for handle in handles {
        handle.wait()?;
    }
    println!("   total: {}", total.load(Ordering::SeqCst));

    // -------------------------------------------------------------------------
    // 4. Unknown names are rejected at admission
    // -------------------------------------------------------------------------
    println!("\n4. Invoking an unknown name...");

    match dispatcher.invoke("sms", "hello") {
        Ok(_) => println!("   unexpectedly admitted"),
        Err(err) => println!("   rejected: {err}"),
    }

    dispatcher.stop();
    println!("\n=== Done ===");
    Ok(())
}
