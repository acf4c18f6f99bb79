//! Fallible scratch allocation.
//!
//! Every per-run buffer is reserved once, up front, through these helpers so an out-of-memory
//! condition surfaces as [`Error::Allocation`] instead of aborting the process. The buffers are
//! owned by the optimizer and released when it is dropped, on success and failure alike.

use crate::error::{Error, Result};

pub(crate) fn filled<T: Clone>(len: usize, value: T, what: &'static str) -> Result<Vec<T>> {
    let mut v = reserve(len, what)?;
    v.resize(len, value);
    Ok(v)
}

pub(crate) fn filled_with<T>(
    len: usize,
    what: &'static str,
    mut make: impl FnMut() -> T,
) -> Result<Vec<T>> {
    let mut v = reserve(len, what)?;
    v.extend((0..len).map(|_| make()));
    Ok(v)
}

pub(crate) fn reserve<T>(len: usize, what: &'static str) -> Result<Vec<T>> {
    let mut v: Vec<T> = Vec::new();
    v.try_reserve_exact(len).map_err(|_| Error::Allocation {
        what,
        bytes: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    Ok(v)
}
