//! Uniform-grid broadphase.

use glam::Vec2;
use rayon::prelude::*;

use crate::particle::ParticleId;

/// A fixed grid of particle-id buckets covering the world rectangle.
///
/// Buckets are allocated once; [`SpatialHashGrid::clear`] only resets their
/// lengths so steady-state ticks never touch the allocator. Cell coordinates
/// are signed because particles are free to leave the world rectangle; a
/// hash computed from out-of-range coordinates simply fails the bounds check
/// in [`SpatialHashGrid::bucket_mut`] and the entry is skipped.
#[derive(Clone)]
pub struct SpatialHashGrid {
    cell_size: f32,
    num_cols: i64,
    buckets: Vec<Vec<ParticleId>>,
}

impl SpatialHashGrid {
    pub fn new(width: f32, height: f32, cell_size: f32) -> Self {
        let num_cols = (width / cell_size).floor() as i64 + 1;
        let num_rows = (height / cell_size).floor() as i64 + 1;
        Self {
            cell_size,
            num_cols,
            buckets: vec![Vec::new(); (num_cols * num_rows) as usize],
        }
    }

    /// Resets every bucket to empty, keeping its allocation. Buckets are
    /// independent so the reset fans out.
    pub fn clear(&mut self) {
        self.buckets.par_iter_mut().for_each(|bucket| bucket.clear());
    }

    /// Column/row span of the axis-aligned box `[pos - r, pos + r]`,
    /// as `(min_col, max_col, min_row, max_row)`.
    pub fn cell_range(&self, pos: Vec2, r: f32) -> (i64, i64, i64, i64) {
        let min_col = ((pos.x - r) / self.cell_size).floor() as i64;
        let max_col = ((pos.x + r) / self.cell_size).floor() as i64;
        let min_row = ((pos.y - r) / self.cell_size).floor() as i64;
        let max_row = ((pos.y + r) / self.cell_size).floor() as i64;
        (min_col, max_col, min_row, max_row)
    }

    #[inline]
    pub fn hash(&self, col: i64, row: i64) -> i64 {
        col + row * self.num_cols
    }

    pub fn bucket_mut(&mut self, hash: i64) -> Option<&mut Vec<ParticleId>> {
        if hash < 0 || hash as usize >= self.buckets.len() {
            return None;
        }
        Some(&mut self.buckets[hash as usize])
    }

    pub fn buckets(&self) -> impl Iterator<Item = &[ParticleId]> {
        self.buckets.iter().map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec2;

    #[test]
    fn cell_range_covers_the_aabb() {
        let grid = SpatialHashGrid::new(100.0, 100.0, 10.0);
        let (min_col, max_col, min_row, max_row) = grid.cell_range(vec2(25.0, 35.0), 6.0);
        assert_eq!((min_col, max_col), (1, 3));
        assert_eq!((min_row, max_row), (2, 4));
    }

    #[test]
    fn off_world_hashes_are_rejected() {
        let mut grid = SpatialHashGrid::new(100.0, 100.0, 10.0);
        let (min_col, _, min_row, _) = grid.cell_range(vec2(-50.0, -50.0), 1.0);
        assert!(min_col < 0);
        let hash = grid.hash(min_col, min_row);
        assert!(grid.bucket_mut(hash).is_none());
        let far = grid.hash(0, 1_000);
        assert!(grid.bucket_mut(far).is_none());
    }

    #[test]
    fn clear_keeps_bucket_allocations() {
        let mut grid = SpatialHashGrid::new(100.0, 100.0, 10.0);
        let hash = grid.hash(3, 3);
        let bucket = grid.bucket_mut(hash).unwrap();
        bucket.extend([1, 2, 3]);
        let capacity = bucket.capacity();
        grid.clear();
        let bucket = grid.bucket_mut(hash).unwrap();
        assert!(bucket.is_empty());
        assert_eq!(bucket.capacity(), capacity);
    }
}
