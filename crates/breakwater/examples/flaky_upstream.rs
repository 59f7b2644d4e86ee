//! Example: riding out a flaky upstream with a composed policy
//!
//! Simulates a dependency that refuses connections for its first few calls,
//! then recovers. The composed policy keeps retrying through the circuit
//! breaker until the dependency comes back, and every retry and state
//! transition is reported through notification hooks.
//!
//! Run this example: ```bash cargo run -p breakwater --example
//! flaky_upstream ```

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use breakwater::{wrap, CircuitBreaker, CircuitBreakerConfig, PolicyHooks, Retry, RetryConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("Flaky Upstream Example");
    println!("======================\n");

    let hooks = PolicyHooks::new()
        .with_on_retry(|error, delay, attempt| {
            println!("  - attempt {attempt} failed ({error}), retrying in {delay:?}");
        })
        .with_on_break(|error, break_duration| {
            println!("  - circuit opened for {break_duration:?} after: {error}");
        })
        .with_on_half_open(|| println!("  - circuit half-open, probing"))
        .with_on_reset(|| println!("  - circuit closed"));

    // Unbounded fixed-delay retry paired with a breaker: the breaker bounds
    // the damage, the retry rides out the break
    let retry = Retry::new(RetryConfig::fixed_unbounded(Duration::from_millis(50)))?
        .with_hooks(hooks.clone());
    let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(3, Duration::from_millis(200)))?
        .with_hooks(hooks);
    let policy = wrap(retry, breaker);

    // Refuses the first 4 connections: enough to trip the breaker and fail
    // the first probe before recovering
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in_op = Arc::clone(&calls);

    println!("Invoking through retry + circuit breaker...");
    let served = policy
        .execute(move || {
            let calls = Arc::clone(&calls_in_op);
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= 4 {
                    Err(io::Error::other("connection refused"))
                } else {
                    Ok(format!("payload served on call {call}"))
                }
            }
        })
        .await?;

    println!("\n{served}");
    println!("upstream was invoked {} times in total", calls.load(Ordering::SeqCst));

    Ok(())
}
