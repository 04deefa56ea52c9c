//! Criterion benchmarks for model construction.
//!
//! Run with: cargo bench -p spins-ltsmin

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use spins_ast::{Action, Expr, Identifier, ScalarType, SpecBuilder, Specification, VarType, Variable};
use spins_ltsmin::{build_model, Aggressiveness, Options};

/// `n` symmetric clients passing a token through a shared buffered channel
/// while bumping a guarded counter.
fn clients(n: usize) -> Specification {
    let mut b = SpecBuilder::new();
    let count = b.global(Variable::new("count", VarType::byte()));
    let token = b.global(Variable::new("token", VarType::channel(2, vec![ScalarType::Byte])));
    let flags = b.global(Variable::new("flag", VarType::bool()).with_array(n));
    for i in 0..n {
        b.process(&format!("client{i}"), |p| {
            let mine = p.local(Variable::new("held", VarType::byte()));
            let states = p.sequence(vec![
                Action::receive(Identifier::new(token), vec![Expr::var(mine)]),
                Action::assign(Identifier::indexed(flags, Expr::constant(i as i32)), Expr::constant(1)),
                Action::expr(Expr::lt(Expr::var(count), Expr::constant(n as i32))),
                Action::incr(Identifier::new(count)),
                Action::assign(Identifier::indexed(flags, Expr::constant(i as i32)), Expr::constant(0)),
                Action::send(Identifier::new(token), vec![Expr::var(mine)]),
            ]);
            p.set_atomic(states[2]);
            p.set_atomic(states[3]);
        });
    }
    b.build()
}

fn benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_model");
    for n in [2, 4, 8] {
        let spec = clients(n);
        for level in [Aggressiveness::Weak, Aggressiveness::High, Aggressiveness::Highest] {
            let options = Options {
                aggressiveness: level,
                ..Options::default()
            };
            group.bench_with_input(BenchmarkId::new(format!("{level:?}"), n), &spec, |b, spec| {
                b.iter(|| build_model(spec, &options).unwrap())
            });
        }
        let options = Options {
            no_gm: true,
            ..Options::default()
        };
        group.bench_with_input(BenchmarkId::new("no_gm", n), &spec, |b, spec| {
            b.iter(|| build_model(spec, &options).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);
