//! Benchmarks for reply parsing and stream reconciliation.
//!
//! Parsing runs once per finished reply and reconciliation once per chunk,
//! so both sit on the path between the last streamed byte and the final
//! render.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use mentor_chat::intent::classify;
use mentor_chat::parser::ResponseParser;
use mentor_chat::stream::StreamReconciler;

/// A tutoring reply (~150 words) with every extractable section.
///
/// The confidence label format varies by index to exercise each pattern.
fn generate_structured_reply(index: usize) -> String {
    let confidence = match index % 4 {
        0 => "Confidence: High".to_string(),
        1 => "**Confidence level:** medium".to_string(),
        2 => "\u{2705} High Confidence".to_string(),
        _ => "Confidence: \u{26a0}\u{fe0f}".to_string(),
    };

    format!(
        "Photosynthesis is the process plants use to turn light into food. \
         Chlorophyll in the leaves absorbs sunlight, and that energy splits \
         water into hydrogen and oxygen. The oxygen leaves through tiny pores \
         called stomata, while the hydrogen is combined with carbon dioxide \
         from the air to build glucose. Plants store that glucose as starch \
         and burn it later for growth.\n\n\
         Example: a potted plant kept in a dark cupboard for a week turns \
         pale because it cannot make new glucose.\n\n\
         {}\n\n\
         Your Turn: Why do you think leaves are usually flat and wide?\n\n\
         Suggested Actions:\n\
         - \u{1f50d} Go Deeper\n\
         - \u{2702}\u{fe0f} Simplify More\n\
         - \u{1f4dd} Quiz Me\n\
         Reply {}.",
        confidence, index
    )
}

/// A reply with no extractable sections (baseline).
fn generate_plain_reply(index: usize) -> String {
    format!(
        "Photosynthesis is the process plants use to turn light into food. \
         Chlorophyll in the leaves absorbs sunlight, and that energy splits \
         water into hydrogen and oxygen. The oxygen leaves through tiny pores \
         called stomata, while the hydrogen is combined with carbon dioxide \
         from the air to build glucose. Plants store that glucose as starch \
         and burn it later for growth. Building confidence with this topic \
         takes a few worked examples, so try sketching the cycle yourself \
         and compare it with the diagram in your textbook. Reply {}.",
        index
    )
}

fn bench_parse(c: &mut Criterion) {
    let parser = ResponseParser::new();

    // Pre-generate replies to exclude formatting time from measurements.
    let structured: Vec<String> = (0..1000).map(generate_structured_reply).collect();
    let plain: Vec<String> = (0..1000).map(generate_plain_reply).collect();

    let mut group = c.benchmark_group("reply_parsing");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("structured_reply", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let reply = &structured[idx % structured.len()];
            let parsed = parser.parse(reply);
            idx += 1;
            parsed
        });
    });

    group.bench_function("plain_reply", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let reply = &plain[idx % plain.len()];
            let parsed = parser.parse(reply);
            idx += 1;
            parsed
        });
    });

    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let reply = generate_structured_reply(0);
    // Small chunks, as a token-level stream delivers them.
    let chunks: Vec<String> = reply
        .chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|c| c.iter().collect())
        .collect();

    let mut group = c.benchmark_group("stream_reconcile");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("accumulate_reply", |b| {
        b.iter(|| {
            let mut reconciler = StreamReconciler::new(1);
            for chunk in &chunks {
                reconciler.push(chunk);
            }
            reconciler.into_text()
        });
    });

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let utterances = [
        "hello mentor",
        "Explain in 2 minutes: osmosis",
        "mujhe tension ho rahi hai exam ki",
        "what is the difference between speed and velocity",
    ];

    let mut group = c.benchmark_group("intent_classify");
    group.sample_size(200);

    group.bench_function("mixed_utterances", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let intent = classify(utterances[idx % utterances.len()]);
            idx += 1;
            intent
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_reconcile, bench_classify);
criterion_main!(benches);
