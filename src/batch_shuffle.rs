use std::ops::Range;

use log::trace;
use rand::{rngs::StdRng, seq::SliceRandom};

/// Splits `len` items into contiguous batches and shuffles the batch order.
///
/// Items are expected to be sorted by history length, so each batch pads to
/// a similar length while the order the optimizer sees them in still varies
/// from one pass to the next.
pub(crate) fn shuffled_batches(len: usize, batch_size: usize, rng: &mut StdRng) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    let mut batches: Vec<_> = (0..len.div_ceil(batch_size))
        .map(|batch_index| {
            let start_index = batch_index * batch_size;
            start_index..(start_index + batch_size).min(len)
        })
        .collect();
    batches.shuffle(rng);
    trace!("batch order: {:?}", &batches);
    batches
}
