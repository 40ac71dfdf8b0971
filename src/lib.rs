pub mod bench_support;
