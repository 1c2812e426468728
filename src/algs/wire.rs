//! Fixed, little-endian wire types for setup-time exchanges.
//!
//! All multi-byte integers in these structs are **little-endian** on the wire.
//! We store them pre-LE with `.to_le()` and decode with `.from_le()`.
//! Angular-flux payloads are plain `f64` slices and are not wrapped here.

use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Count of following records.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// One element of a compact cell-view stream.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireI64 {
    pub v_le: i64,
}

impl WireI64 {
    pub fn of(v: i64) -> Self {
        Self { v_le: v.to_le() }
    }
    pub fn get(&self) -> i64 {
        i64::from_le(self.v_le)
    }
}

/// Encode a list of `i64` as wire records.
pub fn encode_i64s(values: &[i64]) -> Vec<WireI64> {
    values.iter().map(|&v| WireI64::of(v)).collect()
}

/// Decode raw bytes into `i64`s; the length must be a multiple of 8.
pub fn decode_i64s(bytes: &[u8]) -> Result<Vec<i64>, String> {
    if bytes.len() % size_of::<WireI64>() != 0 {
        return Err(format!(
            "{} bytes is not a whole number of {}-byte records",
            bytes.len(),
            size_of::<WireI64>()
        ));
    }
    // Copy into aligned storage; received byte buffers carry no alignment.
    let mut out = vec![WireI64::zeroed(); bytes.len() / size_of::<WireI64>()];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out.iter().map(WireI64::get).collect())
}

/// Encode a list of `u32` as little-endian counts.
pub fn encode_u32s(values: &[u32]) -> Vec<WireCount> {
    values.iter().map(|&v| WireCount::new(v as usize)).collect()
}

pub fn decode_u32s(bytes: &[u8]) -> Result<Vec<u32>, String> {
    if bytes.len() % size_of::<WireCount>() != 0 {
        return Err(format!(
            "{} bytes is not a whole number of {}-byte records",
            bytes.len(),
            size_of::<WireCount>()
        ));
    }
    let mut out = vec![WireCount::zeroed(); bytes.len() / size_of::<WireCount>()];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out.iter().map(|c| c.get() as u32).collect())
}

// Compile-time layout checks
static_assertions::const_assert_eq!(size_of::<WireCount>(), 4);
static_assertions::const_assert_eq!(size_of::<WireI64>(), 8);
static_assertions::const_assert!(align_of::<WireI64>() <= 8);
