//! Predictor boundary.
//!
//! The engine treats the model as an opaque function from a batch of
//! tiles to a batch of predicted tiles; it never inspects model
//! internals. Batches are unit-range `(N, W, W, 3)` arrays and the
//! implementation must preserve both N and tile order.

use ndarray::{Array4, ArrayView4};

use crate::error::Result;

/// A synchronous batch-to-batch tile predictor.
pub trait Predictor {
    /// Map a unit-range tile batch to a predicted batch of equal shape.
    fn predict(&mut self, batch: ArrayView4<'_, f32>) -> Result<Array4<f32>>;
}

/// Passes tiles through untouched.
///
/// Exists to exercise the tiling and stitching plumbing end to end: a
/// lossless stitch fed by the identity predictor must reproduce its
/// input wherever tiles cover it.
pub struct IdentityPredictor;

impl Predictor for IdentityPredictor {
    fn predict(&mut self, batch: ArrayView4<'_, f32>) -> Result<Array4<f32>> {
        Ok(batch.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_returns_input_unchanged() {
        let mut batch = Array4::<f32>::zeros((2, 4, 4, 3));
        batch[[1, 2, 3, 0]] = 0.75;

        let mut predictor = IdentityPredictor;
        let out = predictor.predict(batch.view()).unwrap();
        assert_eq!(out, batch);
    }
}
