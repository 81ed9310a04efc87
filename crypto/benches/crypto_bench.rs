use criterion::{black_box, criterion_group, criterion_main, Criterion};
use meridian_types::{Address, Timestamp, Transaction, TxKind};

fn sample_tx(keys: &meridian_types::KeyPair) -> Transaction {
    let mut tx = Transaction::new(
        TxKind::plain_transfer(),
        1,
        Address::from_public_key(&keys.public),
        Address::new([2; 32]),
        500_000,
        Timestamp::new(1_700_000_000),
    );
    meridian_crypto::sign_transaction(&mut tx, keys);
    tx
}

fn transaction_sign_bench(c: &mut Criterion) {
    let kp = meridian_crypto::keypair_from_seed(&[1u8; 32]);
    let tx = sample_tx(&kp);

    c.bench_function("transaction_sign", |b| {
        b.iter(|| {
            let mut t = tx.clone();
            meridian_crypto::sign_transaction(black_box(&mut t), &kp)
        })
    });
}

fn transaction_verify_bench(c: &mut Criterion) {
    let kp = meridian_crypto::keypair_from_seed(&[1u8; 32]);
    let tx = sample_tx(&kp);

    c.bench_function("transaction_verify", |b| {
        b.iter(|| meridian_crypto::verify_transaction(black_box(&tx)))
    });
}

fn blake2b_256_1kb_bench(c: &mut Criterion) {
    let data = vec![0xCDu8; 1024];

    c.bench_function("blake2b_256_1KB", |b| {
        b.iter(|| meridian_crypto::blake2b_256(black_box(&data)))
    });
}

fn merkle_500_txs_bench(c: &mut Criterion) {
    let kp = meridian_crypto::keypair_from_seed(&[1u8; 32]);
    let txs: Vec<Transaction> = (0..500).map(|_| sample_tx(&kp)).collect();

    c.bench_function("transactions_root_500", |b| {
        b.iter(|| meridian_crypto::transactions_root(black_box(&txs)))
    });
}

criterion_group!(
    benches,
    transaction_sign_bench,
    transaction_verify_bench,
    blake2b_256_1kb_bench,
    merkle_500_txs_bench,
);
criterion_main!(benches);
