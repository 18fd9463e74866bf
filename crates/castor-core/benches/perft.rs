use criterion::{black_box, criterion_group, criterion_main, Criterion};

use castor_core::board::Board;

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("perft start 3", |b| {
        let board = Board::starting_position();

        b.iter(|| black_box(board.perft(3)))
    });
    c.bench_function("perft start 5", |b| {
        let board = Board::starting_position();

        b.iter(|| black_box(board.perft(5)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
