use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chatgate::config::ThinkMode;
use chatgate::normalize::{PhaseNormalizer, ToolCallAssembler};
use chatgate::protocol::zai::ZaiEventData;

fn thinking_event(delta: &str) -> ZaiEventData {
    ZaiEventData {
        phase: "thinking".to_string(),
        delta_content: delta.to_string(),
        ..ZaiEventData::default()
    }
}

fn bench_phase_normalizer(c: &mut Criterion) {
    let markup = "<details open>\n<summary>Thinking…</summary>\n> step one\n> step two\n> step three</details>";
    let plain = "Most deltas look like this: a short run of plain answer text with no markup at all.";

    c.bench_function("normalize_thinking_markup", |b| {
        b.iter(|| {
            let mut normalizer = PhaseNormalizer::new(ThinkMode::Reasoning);
            black_box(normalizer.apply(&thinking_event(black_box(markup))))
        });
    });

    c.bench_function("normalize_plain_answer", |b| {
        let event = ZaiEventData {
            phase: "answer".to_string(),
            delta_content: plain.to_string(),
            ..ZaiEventData::default()
        };
        b.iter(|| {
            let mut normalizer = PhaseNormalizer::new(ThinkMode::Details);
            black_box(normalizer.apply(black_box(&event)))
        });
    });
}

fn bench_tool_call_assembly(c: &mut Criterion) {
    let block = concat!(
        r#"<glm_block view="card" tool_call_name="search">"#,
        r#"{"type": "mcp", "data": {"metadata": {"id": "call_1", "name": "search", "#,
        r#""arguments": "{\"query\":\"streaming protocol normalization\"}"}}}"#,
        r#"</glm_block>"#
    );

    c.bench_function("assemble_split_tool_call", |b| {
        b.iter(|| {
            let mut assembler = ToolCallAssembler::new(256 * 1024);
            let mut result = None;
            for piece in block.as_bytes().chunks(24) {
                let piece = std::str::from_utf8(piece).unwrap();
                if let Ok(Some(call)) = assembler.feed(piece) {
                    result = Some(call);
                }
            }
            black_box(result)
        });
    });
}

criterion_group!(benches, bench_phase_normalizer, bench_tool_call_assembly);
criterion_main!(benches);
