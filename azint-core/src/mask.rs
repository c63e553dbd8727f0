//! Static pixel masks.

use std::hash::{Hash, Hasher};

use ndarray::{Array2, ArrayView2};

/// Boolean pixel mask; `true` marks a pixel excluded from integration.
///
/// The mask content is fingerprinted once at construction so that mapping
/// caches can key on it cheaply.
#[derive(Debug, Clone)]
pub struct Mask {
    data: Array2<bool>,
    fingerprint: u64,
}

impl PartialEq for Mask {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint && self.data == other.data
    }
}

impl Mask {
    /// Wraps a boolean array (`true` = masked).
    #[must_use]
    pub fn new(data: Array2<bool>) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        data.dim().hash(&mut hasher);
        for &value in &data {
            value.hash(&mut hasher);
        }
        let fingerprint = hasher.finish();
        Self { data, fingerprint }
    }

    /// Builds a mask from non-zero values of a numeric array, the usual
    /// on-disk convention.
    #[must_use]
    pub fn from_nonzero<T: Copy + PartialEq + Default>(values: ArrayView2<'_, T>) -> Self {
        let zero = T::default();
        Self::new(values.mapv(|v| v != zero))
    }

    /// A mask with no pixel excluded.
    #[must_use]
    pub fn empty(shape: (usize, usize)) -> Self {
        Self::new(Array2::from_elem(shape, false))
    }

    /// Mask shape (rows, cols).
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Whether pixel `(row, col)` is masked.
    #[inline]
    #[must_use]
    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        self.data[[row, col]]
    }

    /// Number of masked pixels.
    #[must_use]
    pub fn masked_count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }

    /// Content identity used in cache keys.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Underlying array.
    #[must_use]
    pub fn view(&self) -> ArrayView2<'_, bool> {
        self.data.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mask_from_nonzero() {
        let raw = array![[0u8, 1], [2, 0]];
        let mask = Mask::from_nonzero(raw.view());
        assert!(!mask.is_masked(0, 0));
        assert!(mask.is_masked(0, 1));
        assert!(mask.is_masked(1, 0));
        assert_eq!(mask.masked_count(), 2);
        assert_eq!(mask.shape(), (2, 2));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Mask::empty((3, 3));
        let b = Mask::empty((3, 3));
        let mut data = Array2::from_elem((3, 3), false);
        data[[1, 2]] = true;
        let c = Mask::new(data);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_ne!(a.fingerprint(), Mask::empty((9, 1)).fingerprint());
        assert_eq!(a, b);
    }
}
