//! Benchmarks for pipeline execution.

use cmdflow::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    c.bench_function("single_stage", |b| {
        b.iter(|| {
            runtime
                .block_on(run(black_box(&[CommandSpec::new("true")])))
                .unwrap();
        });
    });

    let input: Vec<u8> = (0..10_000u32)
        .flat_map(|i| format!("line {i}\n").into_bytes())
        .collect();

    c.bench_function("three_stage_stream", |b| {
        b.iter(|| {
            let output = runtime
                .block_on(
                    Pipeline::new([
                        CommandSpec::new("cat"),
                        CommandSpec::new("grep").arg("line"),
                        CommandSpec::new("wc").arg("-l"),
                    ])
                    .stdin(InputMode::Bytes(input.clone()))
                    .stdout(OutputMode::Capture)
                    .run(),
                )
                .unwrap();
            black_box(output.stdout)
        });
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
