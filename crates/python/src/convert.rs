//! Array layouts shared with numpy.
//!
//! Matrices travel as row-major `(4, 4)` arrays and volumes as `[x, y, z]`
//! indexed arrays, while the engine wants column-major matrices and
//! x-fastest sample buffers.

use glam::{Mat4, UVec3};
use ndarray::{Array2, ArrayView2, ArrayView3};

/// Row-major `(4, 4)` copy of `matrix`.
pub(crate) fn mat4_to_rows(matrix: Mat4) -> Array2<f64> {
    let rows = matrix.transpose().to_cols_array_2d();
    Array2::from_shape_fn((4, 4), |(i, j)| f64::from(rows[i][j]))
}

pub(crate) fn mat4_from_rows(view: ArrayView2<'_, f64>) -> Result<Mat4, String> {
    if view.shape() != [4, 4] {
        return Err(format!("expected a 4x4 matrix, got shape {:?}", view.shape()));
    }
    let mut cols = [[0.0f32; 4]; 4];
    for (j, col) in cols.iter_mut().enumerate() {
        for (i, value) in col.iter_mut().enumerate() {
            *value = view[[i, j]] as f32;
        }
    }
    Ok(Mat4::from_cols_array_2d(&cols))
}

/// Flattens an array indexed `[x, y, z]` into an x-fastest buffer.
pub(crate) fn samples_x_fastest<T: Copy>(
    view: ArrayView3<'_, T>,
    native: UVec3,
    cast: impl Fn(T) -> f32,
) -> Result<Vec<f32>, String> {
    let expected = native.to_array().map(|n| n as usize);
    if view.shape() != expected {
        return Err(format!(
            "expected an array of shape {expected:?}, got {:?}",
            view.shape()
        ));
    }
    // Iterating the reversed-axes view in logical order visits x fastest.
    Ok(view.reversed_axes().iter().map(|&v| cast(v)).collect())
}
