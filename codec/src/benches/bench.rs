use criterion::criterion_main;

mod deserialize;
mod serialize;
mod utils;

criterion_main!(serialize::benches, deserialize::benches);
