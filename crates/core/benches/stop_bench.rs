//! Criterion benchmarks for stop-sequence classification.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use specedit_core::stop::{stream_stop, StopMatcher};

fn make_text(len: usize) -> String {
    "fn main() { println!(\"hello\"); }\n"
        .chars()
        .cycle()
        .take(len)
        .collect()
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("stop_classify");
    let literal = StopMatcher::new(["</answer>", "\n\n\n"]);
    let regex = StopMatcher::new([r"r/\n\s*```$/", r"r/\d{3}$/"]);

    for &len in &[64usize, 1_024] {
        let text = make_text(len);
        group.bench_with_input(BenchmarkId::new("literal", len), &text, |b, text| {
            b.iter(|| black_box(literal.classify(black_box(text))));
        });
        group.bench_with_input(BenchmarkId::new("regex", len), &text, |b, text| {
            b.iter(|| black_box(regex.classify(black_box(text))));
        });
    }
    group.finish();
}

fn bench_stream(c: &mut Criterion) {
    let text = make_text(4_096);
    let fragments: Vec<String> = text
        .as_bytes()
        .chunks(3)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();
    let patterns = ["</answer>", r"r/\n\s*```$/"];

    c.bench_function("stop_stream_4k", |b| {
        b.iter(|| {
            let emitted: usize = stream_stop(fragments.iter().cloned(), &patterns)
                .map(|fragment| fragment.len())
                .sum();
            black_box(emitted)
        });
    });
}

criterion_group!(benches, bench_classify, bench_stream);
criterion_main!(benches);
