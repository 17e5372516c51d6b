use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use matchday::tournament::{Match, MatchResult, PlayoffEngine, StandingsEngine};
use std::collections::BTreeSet;
use std::hint::black_box;

/// Full round robin between `n` teams with deterministic scores
fn round_robin(n: usize) -> (BTreeSet<String>, Vec<Match>) {
    let names: Vec<String> = (0..n).map(|i| format!("Team {i:02}")).collect();
    let mut matches = Vec::new();
    for i in 0..n {
        for j in i + 1..n {
            let score1 = ((i * 7 + j * 3) % 5) as i32;
            let score2 = ((i * 2 + j * 5) % 4) as i32;
            matches.push(Match::from_result(&MatchResult::new(
                names[i].clone(),
                names[j].clone(),
                score1,
                score2,
            )));
        }
    }
    (names.into_iter().collect(), matches)
}

/// Benchmark standings recomputation for growing groups
fn bench_standings_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("standings_compute");

    for n in [6, 12, 24, 48] {
        let (teams, matches) = round_robin(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| StandingsEngine::compute(black_box(&matches), black_box(&teams)))
        });
    }

    group.finish();
}

/// Benchmark seeding an eight-team bracket from a computed table
fn bench_playoff_seed(c: &mut Criterion) {
    let (teams, matches) = round_robin(12);
    let table = StandingsEngine::compute(&matches, &teams).unwrap();

    c.bench_function("playoff_seed_8", |b| {
        b.iter(|| PlayoffEngine::seed(black_box(&table), 8))
    });
}

criterion_group!(benches, bench_standings_compute, bench_playoff_seed);
criterion_main!(benches);
