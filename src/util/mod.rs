pub mod simba;
mod stats;

pub use stats::Stats;

/// Iterates over indices of set bits in a lane mask, lowest first.
pub fn set_bits(mask: u64) -> impl Iterator<Item = usize> {
    let mut remaining = mask;
    std::iter::from_fn(move || {
        if remaining == 0 {
            return None;
        }
        let index = remaining.trailing_zeros() as usize;
        remaining &= remaining - 1;
        Some(index)
    })
}
