//! Performance benchmarks for missionctl.
//!
//! This module contains benchmarks for:
//! - Task index construction and the ready queue
//! - Transitive dependency collection on chains and cycles
//! - Dependency tree rendering
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use missionctl::task::graph::{build_index, collect_deps, queue, render_tree};
use missionctl::{Stage, Task, TaskStatus};

// ============================================================================
// Fixtures
// ============================================================================

mod fixtures {
    use super::*;

    /// `n` tasks where each depends on the previous one. Every other task is done.
    pub fn chain(n: usize) -> Vec<Task> {
        let mut tasks: Vec<Task> = Vec::with_capacity(n);
        for i in 0..n {
            let mut task = Task::new(format!("task {i}"), Stage::Implement, "core", "developer");
            if let Some(prev) = tasks.last() {
                task = task.with_depends_on([prev.id.clone()]);
            }
            if i % 2 == 0 {
                task.set_status(TaskStatus::Done);
            }
            tasks.push(task);
        }
        tasks
    }

    /// A chain whose first task depends on the last one.
    pub fn cycle(n: usize) -> Vec<Task> {
        let mut tasks = chain(n);
        if let Some(last_id) = tasks.last().map(|t| t.id.clone()) {
            tasks[0].depends_on.push(last_id);
        }
        tasks
    }

    /// `n` independent tasks, each depending on a handful of earlier ones.
    pub fn fan(n: usize) -> Vec<Task> {
        let mut tasks: Vec<Task> = Vec::with_capacity(n);
        for i in 0..n {
            let deps: Vec<String> = tasks.iter().rev().step_by(7).take(4).map(|t| t.id.clone()).collect();
            let mut task = Task::new(format!("fan {i}"), Stage::Implement, "", "").with_depends_on(deps);
            if i % 3 == 0 {
                task.set_status(TaskStatus::Done);
            }
            tasks.push(task);
        }
        tasks
    }
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_build_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_index");

    for size in [100, 1_000, 10_000] {
        let tasks = fixtures::fan(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &tasks, |b, tasks| {
            b.iter(|| build_index(black_box(tasks)));
        });
    }

    group.finish();
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");

    for size in [100, 1_000, 10_000] {
        let tasks = fixtures::fan(size);
        let index = build_index(&tasks);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &tasks, |b, tasks| {
            b.iter(|| queue(black_box(tasks), &index).len());
        });
    }

    group.finish();
}

fn bench_collect_deps(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect_deps");

    for size in [100, 1_000] {
        let chain = fixtures::chain(size);
        let index = build_index(&chain);
        let tail = &chain[size - 1];
        group.bench_with_input(BenchmarkId::new("chain", size), tail, |b, task| {
            b.iter(|| collect_deps(black_box(task), &index).len());
        });

        let cycle = fixtures::cycle(size);
        let index = build_index(&cycle);
        let head = &cycle[0];
        group.bench_with_input(BenchmarkId::new("cycle", size), head, |b, task| {
            b.iter(|| collect_deps(black_box(task), &index).len());
        });
    }

    group.finish();
}

fn bench_render_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_tree");

    for size in [50, 500] {
        let chain = fixtures::chain(size);
        let index = build_index(&chain);
        group.bench_with_input(BenchmarkId::new("chain", size), &chain[size - 1], |b, task| {
            b.iter(|| render_tree(black_box(task), &index));
        });

        let fan = fixtures::fan(size);
        let index = build_index(&fan);
        group.bench_with_input(BenchmarkId::new("fan", size), &fan[size - 1], |b, task| {
            b.iter(|| render_tree(black_box(task), &index));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_index, bench_queue, bench_collect_deps, bench_render_tree);
criterion_main!(benches);
