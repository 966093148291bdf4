//! Cancellation example for event-relay.
//!
//! Demonstrates:
//! - `FanOutMode::FirstSuccessWins`: a failing fallback chain
//! - Blocking and unblocking a whole name with `block_event`
//! - Blocking a single queued invocation with `set_block_state`
//! - Observing the dispatcher through a trace callback
//!
//! Run with: `cargo run --example cancellation`

use event_relay::{Dispatcher, FanOutMode, Handler};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== event-relay: Cancellation ===\n");

    let dispatcher = Dispatcher::default();
    dispatcher.set_trace_callback(|event| println!("   trace: {event}"));

    // -------------------------------------------------------------------------
    // 1. First success wins
    // -------------------------------------------------------------------------
    println!("1. Delivering through a fallback chain...");

    dispatcher.register(
        "notify",
        Handler::string(|_| anyhow::bail!("push gateway unavailable")),
    );
    dispatcher.register(
        "notify",
        Handler::string(|msg| {
            println!("   [email] {msg}");
            Ok(())
        }),
    );
    dispatcher.register(
        "notify",
        Handler::string(|msg| {
            println!("   [sms]   {msg} (never printed)");
            Ok(())
        }),
    );
    dispatcher.set_fan_out("notify", FanOutMode::FirstSuccessWins)?;
    dispatcher.start()?;

    let report = dispatcher.invoke("notify", "build finished")?.wait()?;
    println!(
        "   successes: {}, failures: {}, cancelled: {}",
        report.successes,
        report.failures.len(),
        report.cancelled
    );
    for failure in &report.failures {
        println!("   failure: {failure}");
    }

    // -------------------------------------------------------------------------
    // 2. Block a whole name
    // -------------------------------------------------------------------------
    println!("\n2. Blocking `notify`...");

    dispatcher.block_event("notify", true)?;
    let report = dispatcher.invoke("notify", "held back")?.wait()?;
    println!("   skipped: {}", report.skipped);
    dispatcher.block_event("notify", false)?;

    // -------------------------------------------------------------------------
    // 3. Block one queued invocation
    // -------------------------------------------------------------------------
    println!("\n3. Cancelling a queued invocation...");

    dispatcher.pause();
    let cancelled = dispatcher.invoke("notify", "cancelled before dispatch")?;
    let delivered = dispatcher.invoke("notify", "delivered after resume")?;
    cancelled.set_block_state();
    dispatcher.resume();

    match cancelled.wait() {
        Ok(_) => println!("   unexpectedly dispatched"),
        Err(err) => println!("   first: {err}"),
    }
    println!("   second: {} success", delivered.wait()?.successes);

    dispatcher.stop();
    println!("\n=== Done ===");
    Ok(())
}
