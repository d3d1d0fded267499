use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rehearse::lipsync::{CueTimeline, LipSyncEngine, MorphTable, MouthCue, Viseme};
use rehearse::payload::decode_base64;
use std::time::Duration;

/// A timeline of `count` back-to-back cues with every fifth one overlapping
/// its successor, like Rhubarb output for a long reply.
fn timeline(count: usize) -> CueTimeline {
    let cues = (0..count)
        .map(|i| {
            let start = i as f64 * 0.08;
            let end = if i % 5 == 0 { start + 0.12 } else { start + 0.08 };
            MouthCue::new(start, end, Viseme::ALL[i % Viseme::ALL.len()])
        })
        .collect();
    CueTimeline::new(cues)
}

fn bench_viseme_at(c: &mut Criterion) {
    let mut group = c.benchmark_group("viseme_at");
    for count in [100usize, 1_000, 10_000] {
        let cues = timeline(count);
        let end = cues.duration();
        group.bench_with_input(BenchmarkId::from_parameter(count), &cues, |b, cues| {
            let mut t = 0.0;
            b.iter(|| {
                t = (t + 0.0167) % end;
                black_box(cues.viseme_at(black_box(t)))
            })
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let engine = LipSyncEngine::new(MorphTable::default(), 60);
    let cues = timeline(1_000);
    c.bench_function("render_1000_cues_60hz", |b| {
        b.iter(|| black_box(engine.render(black_box(&cues))))
    });
    c.bench_function("frame_at", |b| {
        b.iter(|| black_box(engine.frame_at(&cues, black_box(Duration::from_millis(12_345)))))
    });
}

fn bench_decode(c: &mut Criterion) {
    // ~30 s of 16 kHz mono PCM, URL-safe and unpadded.
    let raw = vec![0x5au8; 960_000];
    let encoded = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, &raw);
    c.bench_function("decode_base64_960k", |b| {
        b.iter(|| black_box(decode_base64(black_box(&encoded))))
    });
}

criterion_group!(benches, bench_viseme_at, bench_render, bench_decode);
criterion_main!(benches);
