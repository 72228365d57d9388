//! Built-in demo run: a fixed five-boundary workload used by one-shot
//! recording and the determinism test suite. Content derives only from the
//! seed and the pinned clock; no OS entropy, no wall time.

use std::path::Path;

use serde_json::{json, Map};

use rpk_core::policy::{InterceptionPolicy, RedactionPolicy};
use rpk_core::rng::ReplayRng;
use rpk_core::run::Run;
use rpk_io::signature::SigningKey;

use crate::scope::CaptureScope;
use crate::CaptureError;

const DEMO_CLOCK: &str = "2026-02-22T00:00:00Z";

const DEMO_TOPICS: &[&str] = &["tides", "glaciers", "auroras", "monsoons"];
const DEMO_ANSWERS: &[&str] = &[
    "They follow the moon.",
    "They carve the valleys slowly.",
    "Charged particles paint the sky.",
    "Seasonal winds carry the rain.",
];

/// Record the demo workload with the default redaction policy.
pub fn record_demo(
    out: &Path,
    seed: u64,
    fixed_clock: Option<&str>,
    key: Option<&SigningKey>,
) -> Result<Run, CaptureError> {
    record_demo_with_policy(out, seed, fixed_clock, &RedactionPolicy::default(), key)
}

/// Record the demo workload under a caller-supplied redaction policy.
pub fn record_demo_with_policy(
    out: &Path,
    seed: u64,
    fixed_clock: Option<&str>,
    redaction: &RedactionPolicy,
    key: Option<&SigningKey>,
) -> Result<Run, CaptureError> {
    let clock = fixed_clock.unwrap_or(DEMO_CLOCK);
    let mut rng = ReplayRng::from_seed_u64(seed);
    let pick = rng.choose_index(DEMO_TOPICS.len()).unwrap_or(0);
    let topic = DEMO_TOPICS[pick];
    let answer = DEMO_ANSWERS[pick];
    let latency = 40 + rng.gen_range(200).unwrap_or(0);

    let mut scope_metadata = Map::new();
    scope_metadata.insert("workload".to_string(), json!("demo"));
    scope_metadata.insert("seed".to_string(), json!(seed));

    let scope = CaptureScope::open_at(
        clock,
        scope_metadata,
        InterceptionPolicy::default(),
        redaction,
    )?;

    scope.record_prompt_render(
        json!({"template": "Explain {{topic}} in one sentence.", "vars": {"topic": topic}}),
        json!({"text": format!("Explain {topic} in one sentence.")}),
        json!({"prompt_name": "explainer"}),
    )?;

    // Streamed model response: assembled_text is what replay and diff consume.
    let deltas: Vec<String> = split_into_deltas(answer);
    scope.record_model_stream(
        json!({
            "messages": [{"role": "user", "content": format!("Explain {topic} in one sentence.")}],
            "max_tokens": 64,
            "temperature": 0.0
        }),
        &deltas,
        true,
        json!({
            "model": "demo-model",
            "provider": "demo",
            "temperature": 0.0,
            "max_tokens": 64,
            "latency_ms": latency
        }),
    )?;

    scope.record_tool_call(
        json!({"tool": "lookup", "args": {"topic": topic}}),
        json!({"summary": format!("{topic}: reference entry")}),
        json!({"tool": "lookup", "duration_ms": latency / 2}),
    )?;

    scope.record_http_call(
        "GET",
        &format!("https://kb.internal.example/entries/{topic}"),
        json!({}),
        json!({"status": 200}),
        json!({"status": 200}),
    )?;

    scope.record_final_output(
        json!({"assistant_message": answer}),
        json!({"finish_reason": "stop"}),
    )?;

    scope.close_and_write(out, key)
}

fn split_into_deltas(text: &str) -> Vec<String> {
    // Split on word boundaries, keeping separators attached.
    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split_inclusive(' ') {
        current.push_str(word);
        if current.len() >= 8 {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
