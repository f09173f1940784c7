//! # did:sol Registry Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | Codec | Encode / tolerant decode of stored records |
//! | Size | Storage accounting per record |
//! | Addressing | Record address derivation |
//! | Signing | Eth personal-message sign and recover |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use did_registry::domain::{derive_address, encode_account, size_of_record};
use did_registry::{
    decode_account, recover_signer, AddressScheme, DidRecord, EthSigner, Pubkey, Service,
    VerificationMethod, VerificationMethodType, VmFlag, VmFlags,
};
use std::time::Duration;

fn record_with(methods: usize, services: usize) -> DidRecord {
    let authority = Pubkey::new([7u8; 32]);
    let mut record = DidRecord::generative(&authority, 255);
    for i in 0..methods {
        record.methods.push(VerificationMethod {
            fragment: format!("key-{}", i),
            flags: VmFlags::from_array(&[VmFlag::Authentication]),
            method_type: VerificationMethodType::NativeEd25519,
            key_data: vec![i as u8; 32],
        });
    }
    for i in 0..services {
        record.services.push(Service {
            fragment: format!("svc-{}", i),
            service_type: "LinkedDomains".to_string(),
            service_endpoint: format!("https://svc-{}.example.com", i),
        });
    }
    record
}

fn bench_record_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("record-codec");
    group.measurement_time(Duration::from_secs(5));

    for entries in [0usize, 8, 64] {
        let record = record_with(entries, entries);
        let mut encoded = encode_account(&record);
        // Stored accounts carry trailing zero padding.
        encoded.resize(encoded.len() + 256, 0);

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", entries), &record, |b, r| {
            b.iter(|| black_box(encode_account(r)))
        });
        group.bench_with_input(BenchmarkId::new("decode", entries), &encoded, |b, data| {
            b.iter(|| black_box(decode_account(data).is_ok()))
        });
        group.bench_with_input(BenchmarkId::new("size", entries), &record, |b, r| {
            b.iter(|| black_box(size_of_record(r)))
        });
    }

    group.finish();
}

fn bench_address_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("address-derivation");
    let authority = Pubkey::new([42u8; 32]);

    for scheme in [AddressScheme::Current, AddressScheme::Legacy] {
        let program = scheme.default_program_id();
        group.bench_function(format!("{:?}", scheme), |b| {
            b.iter(|| black_box(derive_address(&authority, scheme, &program).is_ok()))
        });
    }

    group.finish();
}

fn bench_eth_signing(c: &mut Criterion) {
    let mut group = c.benchmark_group("eth-signing");
    let signer = EthSigner::new(k256::ecdsa::SigningKey::random(&mut rand::thread_rng()));
    let message = b"instruction data followed by nonce";
    let signature = signer.sign_message(message).unwrap();

    group.bench_function("sign", |b| {
        b.iter(|| black_box(signer.sign_message(message).is_ok()))
    });
    group.bench_function("recover", |b| {
        b.iter(|| black_box(recover_signer(message, &signature).is_ok()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_record_codec,
    bench_address_derivation,
    bench_eth_signing
);
criterion_main!(benches);
