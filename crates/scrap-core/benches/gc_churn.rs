//! Benchmark suite for compiled Scrap programs
//!
//! - compile: lowering a program with many chains through the JIT
//! - gc_churn: short-lived strings allocated in a tight loop
//! - list_growth: a live list growing past several collection thresholds

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use scrap_core::ast::Blockdef;
use scrap_core::config::ScrapConfig;
use scrap_core::{Block, Chain, Executor, OutputBuffer, Program};

fn churn_program(iterations: u64) -> Program {
    Program::new().chain(Chain::on_start(vec![
        Block::new("repeat").text(iterations.to_string()),
        Block::new("join")
            .text("scrap")
            .block(Block::new("convert_str").block(Block::new("random").text("0").text("1000"))),
        Block::new("end"),
    ]))
}

fn list_program(items: u64) -> Program {
    Program::new().chain(Chain::on_start(vec![
        Block::new("decl_var").text("l").block(Block::new("create_list")),
        Block::new("repeat").text(items.to_string()),
        Block::new("list_add")
            .block(Block::new("get_var").text("l"))
            .block(
                Block::new("join")
                    .text("list-item-")
                    .block(Block::new("random").text("0").text("9")),
            ),
        Block::new("end"),
    ]))
}

/// `chains` user blocks, each called once from `on_start`
fn wide_program(chains: usize) -> Program {
    let mut program = Program::new();
    let mut calls = Vec::with_capacity(chains);
    for i in 0..chains {
        let id = format!("f{}", i);
        let param = format!("f{}_x", i);
        program = program
            .chain(Chain::define(
                id.clone(),
                vec![Block::new("return")
                    .block(Block::new("plus").block(Block::new(param.clone())).text("1"))],
            ))
            .blockdef(Blockdef::new(id.clone()).text(id.clone()).arg(param));
        calls.push(Block::new(id).text(i.to_string()));
    }
    program.chain(Chain::on_start(calls))
}

fn run(executor: &Executor, program: &Program) {
    let compiled = executor.compile(program).expect("Failed to compile benchmark program");
    executor
        .start(compiled, OutputBuffer::new().sink())
        .expect("Failed to start benchmark program")
        .join()
        .expect("Benchmark program panicked");
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let executor = Executor::new(ScrapConfig::default());

    for chains in [10, 100, 500].iter() {
        let program = wide_program(*chains);
        group.throughput(Throughput::Elements(*chains as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chains), &program, |b, program| {
            b.iter(|| black_box(executor.compile(program).expect("Failed to compile")));
        });
    }

    group.finish();
}

fn bench_gc_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_churn");
    group.sample_size(20);

    let mut config = ScrapConfig::default();
    config.gc.min_memory = 4 * 1024;
    let executor = Executor::new(config).with_seed(1);

    for iterations in [10_000u64, 100_000].iter() {
        let program = churn_program(*iterations);
        group.throughput(Throughput::Elements(*iterations));
        group.bench_with_input(BenchmarkId::from_parameter(iterations), &program, |b, program| {
            b.iter(|| run(&executor, program));
        });
    }

    group.finish();
}

fn bench_list_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_growth");
    group.sample_size(20);

    let executor = Executor::new(ScrapConfig::default()).with_seed(1);

    for items in [1_000u64, 50_000].iter() {
        let program = list_program(*items);
        group.throughput(Throughput::Elements(*items));
        group.bench_with_input(BenchmarkId::from_parameter(items), &program, |b, program| {
            b.iter(|| run(&executor, program));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_gc_churn, bench_list_growth);
criterion_main!(benches);
