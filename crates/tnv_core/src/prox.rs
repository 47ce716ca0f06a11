//! Per-pixel proximal map of the singular-value norm.
//!
//! At every pixel the dual step gathers the channel-wise vectors
//! `v_k = (v_x, v_y)` into the 2×2 Gram matrix `M = Σ_k v_k v_kᵀ`. Its
//! eigendecomposition yields the singular values of the `channels × 2`
//! Jacobian, which are shrunk and turned into a symmetric attenuation matrix
//! `T` so that the proximal point of every channel is `T v_k`. This couples
//! all channels of a pixel, which is what makes TNV a joint model.

use crate::float_trait::TnvFloat;

/// Maximum number of shrinking passes of the L1-ball projection.
///
/// Water-filling on a 2-vector finishes in at most one pass per component.
pub const L1_MAX_PASSES: usize = 2;

/// Norm applied to the singular values of the per-pixel Jacobian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SingularValueNorm {
    /// Sum of singular values (nuclear norm); the TNV regulariser.
    #[default]
    L1,
    /// Largest singular value (spectral norm); its dual needs an L1-ball
    /// projection of the scaled singular values.
    LInf,
}

/// Symmetric 2×2 matrix stored as its three independent entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sym2<F: TnvFloat> {
    pub xx: F,
    pub xy: F,
    pub yy: F,
}

impl<F: TnvFloat> Sym2<F> {
    pub fn zero() -> Self {
        Self {
            xx: F::zero(),
            xy: F::zero(),
            yy: F::zero(),
        }
    }

    /// Accumulate the outer product `v vᵀ` of one channel vector.
    #[inline]
    pub fn add_outer(&mut self, vx: F, vy: F) {
        self.xx += vx * vx;
        self.xy += vx * vy;
        self.yy += vy * vy;
    }

    /// Apply the matrix to `(vx, vy)`.
    #[inline]
    pub fn apply(&self, vx: F, vy: F) -> (F, F) {
        (vx * self.xx + vy * self.xy, vx * self.xy + vy * self.yy)
    }
}

/// Eigenvalues `eig1 >= eig2 >= 0` of a positive semidefinite `m`, from its
/// trace and determinant.
#[inline]
fn eigenvalues<F: TnvFloat>(m: Sym2<F>) -> (F, F) {
    let zero = F::zero();
    let two = F::from_f64_c(2.0);
    let four = F::from_f64_c(4.0);
    let trace = m.xx + m.yy;
    let det = m.xx * m.yy - m.xy * m.xy;
    let disc = (trace * trace / four - det).max(zero).sqrt();
    ((trace / two + disc).max(zero), (trace / two - disc).max(zero))
}

/// Singular values of the Jacobian whose Gram matrix is `m`.
pub fn singular_values<F: TnvFloat>(m: Sym2<F>) -> (F, F) {
    let (eig1, eig2) = eigenvalues(m);
    (eig1.sqrt(), eig2.sqrt())
}

/// Project a nonnegative 2-vector onto the unit L1 ball by water-filling.
///
/// Returns the projection and the number of shrinking passes used.
pub fn project_l1_ball<F: TnvFloat>(v: [F; 2]) -> ([F; 2], usize) {
    let mut proj = [v[0].abs(), v[1].abs()];
    let mut sum = proj[0] + proj[1];
    let mut passes = 0;

    while sum > F::one() && passes < L1_MAX_PASSES {
        let active = proj.iter().filter(|&&p| p != F::zero()).count();
        if active == 0 {
            break;
        }
        let shrink = (sum - F::one()) / F::usize_as(active);
        sum = F::zero();
        for p in proj.iter_mut() {
            *p = (*p - shrink).max(F::zero());
            sum += *p;
        }
        passes += 1;
    }

    (proj, passes)
}

/// Attenuation matrix of the TNV proximal step for Gram matrix `m`.
///
/// `sigma` is the dual step size. Singular values below [`TnvFloat::TINY`]
/// yield a zero attenuation factor.
pub fn attenuation<F: TnvFloat>(m: Sym2<F>, sigma: F, norm: SingularValueNorm) -> Sym2<F> {
    let zero = F::zero();
    let one = F::one();
    let div_sigma = one / sigma;

    let (eig1, eig2) = eigenvalues(m);
    let sig1 = eig1.sqrt();
    let sig2 = eig2.sqrt();

    // Columns (e1x, e1y), (e2x, e2y) of the eigenvector basis
    let (mut e1x, mut e1y, mut e2x, mut e2y) = (zero, zero, zero, zero);
    if m.xy != zero {
        let v1 = eig1 - m.yy;
        let v2 = eig2 - m.yy;
        let mu1 = (m.xy * m.xy + v1 * v1).sqrt();
        let mu2 = (m.xy * m.xy + v2 * v2).sqrt();
        if mu1 > F::TINY {
            e1x = v1 / mu1;
            e1y = m.xy / mu1;
        }
        if mu2 > F::TINY {
            e2x = v2 / mu2;
            e2y = m.xy / mu2;
        }
    } else if m.xx > m.yy {
        e1x = one;
        e2y = one;
    } else {
        e1y = one;
        e2x = one;
    }

    let (shrunk1, shrunk2) = match norm {
        SingularValueNorm::L1 => ((sig1 - div_sigma).max(zero), (sig2 - div_sigma).max(zero)),
        SingularValueNorm::LInf => {
            let (proj, _) = project_l1_ball([sigma * sig1, sigma * sig2]);
            (sig1 - div_sigma * proj[0], sig2 - div_sigma * proj[1])
        }
    };

    let f1 = if sig1 > F::TINY { shrunk1 / sig1 } else { zero };
    let f2 = if sig2 > F::TINY { shrunk2 / sig2 } else { zero };

    Sym2 {
        xx: f1 * e1x * e1x + f2 * e2x * e2x,
        xy: f1 * e1x * e1y + f2 * e2x * e2y,
        yy: f1 * e1y * e1y + f2 * e2y * e2y,
    }
}
