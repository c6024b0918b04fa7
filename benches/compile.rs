//! Benchmarks for protocol compilation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};

use labgraph::action::Action;
use labgraph::compiler::Compiler;
use labgraph::entity::{Container, Matter};
use labgraph::graph::ProtocolGraph;
use labgraph::ir;
use labgraph::plan::ProtocolPlan;
use labgraph::robustness::{SweepConfig, robustness_sweep};
use labgraph::units::{Mass, Temperature, Volume};

const TUBES: usize = 8;

/// A ring of small transfers that always validates.
fn ring_plan(steps: usize) -> ProtocolPlan {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let mut plan = ProtocolPlan::new(format!("ring-{steps}"));
    for i in 0..TUBES {
        plan = plan.with_container(
            Container::new(
                format!("T{i}"),
                Volume::milliliters(5.0),
                Temperature::celsius(4.0),
                Temperature::celsius(100.0),
            )
            .with_matter(Matter::liquid(
                "buffer",
                Mass::milligrams(1000.0),
                Volume::microliters(1000.0),
            )),
        );
    }
    for i in 0..steps {
        let ul = rng.gen_range(1.0..10.0);
        plan = plan.with_step(Action::transfer(
            format!("T{}", i % TUBES),
            format!("T{}", (i + 1) % TUBES),
            Volume::microliters(ul),
        ));
    }
    plan
}

fn bench_dry_run(c: &mut Criterion) {
    let compiler = Compiler::default();
    let graph: ProtocolGraph = compiler.build(&ring_plan(200)).unwrap();

    c.bench_function("dry_run_200_steps", |bench| {
        bench.iter(|| black_box(graph.dry_run(None).unwrap()))
    });
}

fn bench_export(c: &mut Criterion) {
    let validated = Compiler::default().validate(&ring_plan(200), None).unwrap();

    c.bench_function("export_hash_200_steps", |bench| {
        bench.iter(|| black_box(ir::serialize(&validated)))
    });
}

fn bench_proposals(c: &mut Criterion) {
    let compiler = Compiler::default();
    let plans: Vec<_> = (0..32).map(|i| ring_plan(50 + i)).collect();

    c.bench_function("evaluate_32_proposals", |bench| {
        bench.iter(|| black_box(compiler.evaluate_proposals(&plans, None)))
    });
}

fn bench_sweep(c: &mut Criterion) {
    let graph = Compiler::default().build(&ring_plan(50)).unwrap();
    let config = SweepConfig {
        trials: 64,
        noise_level: 0.1,
        seed: 0,
    };

    c.bench_function("robustness_sweep_64", |bench| {
        bench.iter(|| black_box(robustness_sweep(&graph, None, &config)))
    });
}

criterion_group!(benches, bench_dry_run, bench_export, bench_proposals, bench_sweep);
criterion_main!(benches);
