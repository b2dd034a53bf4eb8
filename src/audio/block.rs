//! Re-blocking of hardware callbacks into fixed-size taps

/// Collects mono samples into blocks of exactly `block_size` frames.
///
/// The block storage is allocated once up front, so pushing from the
/// capture callback never reallocates.
pub struct BlockAccumulator {
    block: Vec<f32>,
    block_size: usize,
    next_sample_time: u64,
}

impl BlockAccumulator {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block: Vec::with_capacity(block_size),
            block_size,
            next_sample_time: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples waiting for the current block to fill
    pub fn pending(&self) -> usize {
        self.block.len()
    }

    /// Append samples, calling `emit(block, sample_time)` for every block
    /// that fills up. `sample_time` is the index of the block's first frame.
    pub fn push<I, F>(&mut self, samples: I, mut emit: F)
    where
        I: IntoIterator<Item = f32>,
        F: FnMut(&[f32], u64),
    {
        for sample in samples {
            self.block.push(sample);
            if self.block.len() == self.block_size {
                emit(&self.block, self.next_sample_time);
                self.next_sample_time += self.block_size as u64;
                self.block.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BlockAccumulator;

    #[test]
    fn emits_exact_blocks_across_uneven_pushes() {
        let mut acc = BlockAccumulator::new(4);
        let mut blocks: Vec<(Vec<f32>, u64)> = Vec::new();

        acc.push([1.0, 2.0, 3.0], |b, t| blocks.push((b.to_vec(), t)));
        assert!(blocks.is_empty());
        assert_eq!(acc.pending(), 3);

        acc.push([4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |b, t| {
            blocks.push((b.to_vec(), t))
        });

        assert_eq!(
            blocks,
            vec![
                (vec![1.0, 2.0, 3.0, 4.0], 0),
                (vec![5.0, 6.0, 7.0, 8.0], 4),
            ]
        );
        assert_eq!(acc.pending(), 1);
    }

    #[test]
    fn block_storage_does_not_grow() {
        let mut acc = BlockAccumulator::new(8);
        let capacity = acc.block.capacity();

        for _ in 0..10 {
            acc.push(std::iter::repeat(0.5).take(13), |_, _| {});
        }

        assert_eq!(acc.block.capacity(), capacity);
    }

    #[test]
    fn zero_block_size_is_clamped() {
        let mut acc = BlockAccumulator::new(0);
        let mut count = 0;

        acc.push([0.1, 0.2], |b, _| {
            assert_eq!(b.len(), 1);
            count += 1;
        });

        assert_eq!(acc.block_size(), 1);
        assert_eq!(count, 2);
    }
}
