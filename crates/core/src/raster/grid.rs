//! Dense raster grid

use crate::error::{Error, Result};
use ndarray::Array2;

/// A dense 2-D raster of cell values.
///
/// `Raster<T>` stores values of type `T` in row-major order; row 0 is the
/// north-most row of the sector. The south-up addressing used by road
/// coordinates goes through [`Raster::flipped_index`], which is the single
/// place the `(H-1-y)*W + x` flip is written down.
#[derive(Debug, Clone)]
pub struct Raster<T> {
    data: Array2<T>,
}

impl<T: Copy + Default> Raster<T> {
    /// Create a new raster filled with the default value
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), T::default()),
        }
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), value),
        }
    }

    /// Create a raster from existing row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self { data: array })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Row-major index of the south-up pixel `(x, y)`: `(rows-1-y)*cols + x`.
    ///
    /// Panics in debug builds when `(x, y)` is outside the raster.
    pub fn flipped_index(&self, x: i32, y: i32) -> usize {
        debug_assert!(x >= 0 && (x as usize) < self.cols());
        debug_assert!(y >= 0 && (y as usize) < self.rows());
        (self.rows() - 1 - y as usize) * self.cols() + x as usize
    }

    /// Read the south-up pixel `(x, y)`.
    pub fn get_flipped(&self, x: i32, y: i32) -> T {
        let idx = self.flipped_index(x, y);
        self.as_slice()[idx]
    }

    /// Write the south-up pixel `(x, y)`.
    pub fn set_flipped(&mut self, x: i32, y: i32, value: T) {
        let idx = self.flipped_index(x, y);
        self.as_slice_mut()[idx] = value;
    }

    /// Row-major view of the underlying storage
    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice().expect("raster storage is contiguous")
    }

    /// Mutable row-major view of the underlying storage
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        self.data
            .as_slice_mut()
            .expect("raster storage is contiguous")
    }

    /// Overwrite every cell with `value`
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<u8> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.len(), 20_000);
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<u16> = Raster::new(10, 10);
        raster.set(5, 5, 42).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Raster::<u8>::from_vec(vec![0; 9], 3, 3).is_ok());
        assert!(Raster::<u8>::from_vec(vec![0; 8], 3, 3).is_err());
    }

    #[test]
    fn test_flipped_index() {
        let mut raster: Raster<u16> = Raster::new(4, 5);
        // south-up (0, 0) is the south-west corner, i.e. the last row
        assert_eq!(raster.flipped_index(0, 0), 3 * 5);
        assert_eq!(raster.flipped_index(4, 3), 4);
        raster.set_flipped(2, 1, 7);
        assert_eq!(raster.get(2, 2).unwrap(), 7);
        assert_eq!(raster.get_flipped(2, 1), 7);
    }
}
