// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A chat handler protected by an `ai-service` breaker.
//!
//! The simulated inference service times out on most requests. The breaker opens after a
//! few failed questions and the handler answers with a static apology until the service
//! is probed again.
//!
//! Run with `cargo run -p airbag --example ai_service --features logs,tokio`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use airbag::retry::{RetryOptions, predicates};
use airbag::{BreakerOptions, BreakerRegistry, Context, Error, Resilient};
use tick::Clock;

const FALLBACK_REPLY: &str = "I'm sorry, I can't answer right now. Your question has not been lost, please try again in a minute.";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let clock = Clock::new_tokio();
    let context = Context::new(&clock).name("chat_handler").enable_logs();

    let registry = Arc::new(BreakerRegistry::new(&context));
    let _ = registry.get_with(
        "ai-service",
        &BreakerOptions::default()
            .failure_threshold(3)
            .success_threshold(1)
            .timeout(Duration::from_millis(500)),
    );
    let resilient = Resilient::with_registry(&context, Arc::clone(&registry));

    let service = FlakyInference::default();
    let options = RetryOptions::default()
        .max_attempts(2)
        .initial_delay(Duration::from_millis(50))
        .should_retry(predicates::network_error);

    let questions = [
        "Which aid can my child receive at school?",
        "How do I renew the disability card?",
        "Is there a deadline for the allowance request?",
        "Can I appeal a rejected request?",
        "Where do I send the medical certificate?",
        "Who reviews the application?",
    ];

    for question in questions {
        let reply = ask(&resilient, &service, &options, question).await;
        println!("Q: {question}\nA: {reply}\n");
    }

    clock.delay(Duration::from_millis(600)).await;
    service.recover();

    let reply = ask(&resilient, &service, &options, "Is the assistant back?").await;
    println!("A: {reply}\n");

    for (name, stats) in registry.stats() {
        println!(
            "{name}: state={} failures={} total_calls={} total_failures={}",
            stats.state, stats.failures, stats.total_calls, stats.total_failures
        );
    }
}

async fn ask(resilient: &Resilient, service: &FlakyInference, options: &RetryOptions<io::Error>, question: &str) -> String {
    let result = resilient
        .execute_with_fallback(
            "ai-service",
            || service.answer(question),
            || async { Ok(FALLBACK_REPLY.to_string()) },
            Some(options),
        )
        .await;

    match result {
        Ok(reply) => reply,
        Err(Error::Canceled { .. }) => "The request was canceled.".to_string(),
        Err(error) => format!("unexpected failure: {error}"),
    }
}

/// Inference service that times out until `recover` is called.
#[derive(Debug, Default)]
struct FlakyInference {
    requests: AtomicU32,
    healthy: AtomicBool,
}

impl FlakyInference {
    fn recover(&self) {
        self.healthy.store(true, Ordering::SeqCst);
    }

    async fn answer(&self, question: &str) -> Result<String, io::Error> {
        let request = self.requests.fetch_add(1, Ordering::SeqCst);

        if self.healthy.load(Ordering::SeqCst) || request == 0 {
            Ok(format!("Here is what I found about \"{question}\"."))
        } else {
            Err(io::Error::new(io::ErrorKind::TimedOut, "inference timed out"))
        }
    }
}
