#![allow(dead_code)]
use rand::RngCore;

// Deterministic pseudo random data, stable across platforms.
pub fn pseudo_random(length: usize) -> Vec<u8> {
    let mut seed: usize = 0xa3;
    (0..length)
        .map(|v| {
            seed ^= seed.wrapping_mul(4);
            (seed ^ v) as u8
        })
        .collect()
}

pub fn random_data(length: usize) -> Vec<u8> {
    let mut data = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut data);
    data
}
