//! Least-squares mapping from gaze ratios to screen coordinates.

use anyhow::{anyhow, ensure};
use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

use crate::{gaze::GazeRatio, screen::ScreenPoint};

/// Singular values below this fraction of the largest one count as zero.
const RANK_EPSILON: f64 = 1e-9;

/// Terms of the polynomial mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    /// `1, h, v`
    #[default]
    Affine,
    /// `1, h, v, h*v, h², v²`
    Quadratic,
}

impl MappingKind {
    /// Number of coefficients per output axis, which is also the minimum number of calibration
    /// targets needed for a fit.
    pub fn num_terms(self) -> usize {
        match self {
            MappingKind::Affine => 3,
            MappingKind::Quadratic => 6,
        }
    }

    /// Returns whether a fit over inputs at `positions` can determine every coefficient.
    ///
    /// `positions` are `(horizontal, vertical)` pairs, normalized to about `0.0..=1.0`. This is
    /// false if there are fewer positions than terms, or if they are too regular for the mapping
    /// (eg. all on one line for an affine mapping, or on only two rows for a quadratic one).
    pub fn is_determined_by(self, positions: &[(f64, f64)]) -> bool {
        if positions.len() < self.num_terms() {
            return false;
        }
        let svd = self.design_matrix(positions).svd(false, false);
        svd.rank(rank_epsilon(&svd.singular_values)) == self.num_terms()
    }

    fn terms(self, h: f64, v: f64) -> Vec<f64> {
        match self {
            MappingKind::Affine => vec![1.0, h, v],
            MappingKind::Quadratic => vec![1.0, h, v, h * v, h * h, v * v],
        }
    }

    fn ratio_terms(self, ratio: GazeRatio) -> Vec<f64> {
        self.terms(f64::from(ratio.horizontal()), f64::from(ratio.vertical()))
    }

    /// One row of terms per input.
    fn design_matrix(self, inputs: &[(f64, f64)]) -> DMatrix<f64> {
        let data = inputs
            .iter()
            .flat_map(|&(h, v)| self.terms(h, v))
            .collect::<Vec<_>>();
        DMatrix::from_row_slice(inputs.len(), self.num_terms(), &data)
    }
}

fn rank_epsilon(singular_values: &DVector<f64>) -> f64 {
    RANK_EPSILON * singular_values.max().max(1.0)
}

/// A fitted mapping from [`GazeRatio`] to screen-local pixel coordinates.
///
/// The x and y coordinates are fitted independently over the same terms.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationModel {
    kind: MappingKind,
    x: DVector<f64>,
    y: DVector<f64>,
}

impl CalibrationModel {
    /// Fits a model to pairs of gaze ratios and the screen points looked at.
    ///
    /// Fails if there are fewer samples than coefficients, or if the ratios do not vary enough to
    /// determine all coefficients (eg. all samples have the same ratio).
    pub fn fit(kind: MappingKind, samples: &[(GazeRatio, ScreenPoint)]) -> anyhow::Result<Self> {
        let terms = kind.num_terms();
        ensure!(
            samples.len() >= terms,
            "{:?} mapping needs at least {} calibration points, got {}",
            kind,
            terms,
            samples.len()
        );

        let inputs = samples
            .iter()
            .map(|(r, _)| (f64::from(r.horizontal()), f64::from(r.vertical())))
            .collect::<Vec<_>>();
        let a = kind.design_matrix(&inputs);
        let bx = DVector::from_iterator(samples.len(), samples.iter().map(|(_, p)| f64::from(p.x)));
        let by = DVector::from_iterator(samples.len(), samples.iter().map(|(_, p)| f64::from(p.y)));

        let svd = a.svd(true, true);
        let eps = rank_epsilon(&svd.singular_values);
        let rank = svd.rank(eps);
        ensure!(
            rank == terms,
            "degenerate calibration data: design matrix has rank {rank}, need {terms}"
        );

        let x = svd.solve(&bx, eps).map_err(|e| anyhow!(e))?;
        let y = svd.solve(&by, eps).map_err(|e| anyhow!(e))?;
        log::debug!(
            "fitted {:?} mapping: x={:?} y={:?}",
            kind,
            x.as_slice(),
            y.as_slice()
        );

        Ok(Self { kind, x, y })
    }

    #[inline]
    pub fn kind(&self) -> MappingKind {
        self.kind
    }

    /// Maps `ratio` to a screen-local position in pixels.
    ///
    /// The result is not clamped and may lie outside of the screen.
    pub fn map(&self, ratio: GazeRatio) -> (f32, f32) {
        let terms = DVector::from_vec(self.kind.ratio_terms(ratio));
        (self.x.dot(&terms) as f32, self.y.dot(&terms) as f32)
    }
}
