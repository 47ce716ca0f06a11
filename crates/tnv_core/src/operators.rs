//! Whole-volume discrete operators.
//!
//! These are the single-pass counterparts of what the banded kernel computes:
//! forward differences with a zero Neumann boundary, the matching (negative
//! adjoint) divergence, and the TNV energy of a volume. They are used for
//! diagnostics and as a reference for the banded computation.

use ndarray::{Array3, ArrayView3, Zip};

use crate::float_trait::TnvFloat;
use crate::prox::{singular_values, Sym2};

/// Forward differences along columns (`gx`) and rows (`gy`).
///
/// Both are zero on the last column / last row respectively.
pub fn gradient<F: TnvFloat>(u: ArrayView3<F>) -> (Array3<F>, Array3<F>) {
    let (rows, cols, channels) = u.dim();
    let mut gx = Array3::zeros((rows, cols, channels));
    let mut gy = Array3::zeros((rows, cols, channels));

    for r in 0..rows {
        for c in 0..cols {
            for k in 0..channels {
                if c + 1 < cols {
                    gx[[r, c, k]] = u[[r, c + 1, k]] - u[[r, c, k]];
                }
                if r + 1 < rows {
                    gy[[r, c, k]] = u[[r + 1, c, k]] - u[[r, c, k]];
                }
            }
        }
    }
    (gx, gy)
}

/// Divergence of the dual field `(qx, qy)`, the negative adjoint of
/// [`gradient`].
///
/// Entries of `qx` on the last column and of `qy` on the last row do not
/// contribute.
pub fn divergence<F: TnvFloat>(qx: ArrayView3<F>, qy: ArrayView3<F>) -> Array3<F> {
    let (rows, cols, channels) = qx.dim();
    debug_assert_eq!(qx.dim(), qy.dim());
    let mut div = Array3::zeros((rows, cols, channels));

    for r in 0..rows {
        for c in 0..cols {
            for k in 0..channels {
                let mut d = F::zero();
                if c > 0 {
                    d -= qx[[r, c - 1, k]];
                }
                if c + 1 < cols {
                    d += qx[[r, c, k]];
                }
                if r + 1 < rows {
                    d += qy[[r, c, k]];
                }
                if r > 0 {
                    d -= qy[[r - 1, c, k]];
                }
                div[[r, c, k]] = d;
            }
        }
    }
    div
}

/// Total nuclear variation of `u`: the sum over pixels of the nuclear norm
/// of the `channels × 2` Jacobian.
pub fn tnv_energy<F: TnvFloat>(u: ArrayView3<F>) -> F {
    let (gx, gy) = gradient(u);
    let (rows, cols, _) = u.dim();
    let mut energy = F::zero();

    for r in 0..rows {
        for c in 0..cols {
            let mut m = Sym2::zero();
            Zip::from(gx.slice(ndarray::s![r, c, ..]))
                .and(gy.slice(ndarray::s![r, c, ..]))
                .for_each(|&x, &y| m.add_outer(x, y));
            let (s1, s2) = singular_values(m);
            energy += s1 + s2;
        }
    }
    energy
}

/// Fidelity-weighted TNV objective `TNV(u) + lambda/2 * ||u - f||²`, with the
/// same `lambda` transform the solver applies (`1 / (2 * lambda)`).
pub fn tnv_objective<F: TnvFloat>(u: ArrayView3<F>, f: ArrayView3<F>, lambda: F) -> F {
    let weight = F::one() / (F::from_f64_c(2.0) * lambda);
    let mut fidelity = F::zero();
    Zip::from(&u).and(&f).for_each(|&a, &b| {
        fidelity += (a - b) * (a - b);
    });
    tnv_energy(u) + weight / F::from_f64_c(2.0) * fidelity
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::prelude::*;

    fn random_volume(shape: (usize, usize, usize), seed: u64) -> Array3<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array3::from_shape_fn(shape, |_| rng.gen::<f64>() - 0.5)
    }

    #[test]
    fn test_gradient_of_ramp() {
        let u = Array3::from_shape_fn((3, 4, 2), |(r, c, k)| (2 * r + 3 * c + k) as f64);
        let (gx, gy) = gradient(u.view());

        for k in 0..2 {
            for r in 0..3 {
                for c in 0..3 {
                    assert_eq!(gx[[r, c, k]], 3.0);
                }
                assert_eq!(gx[[r, 3, k]], 0.0);
            }
            for c in 0..4 {
                assert_eq!(gy[[0, c, k]], 2.0);
                assert_eq!(gy[[2, c, k]], 0.0);
            }
        }
    }

    #[test]
    fn test_divergence_is_negative_adjoint() {
        let shape = (5, 6, 3);
        let u = random_volume(shape, 1);
        let qx = random_volume(shape, 2);
        let qy = random_volume(shape, 3);

        let (gx, gy) = gradient(u.view());
        let div = divergence(qx.view(), qy.view());

        let lhs: f64 = (&gx * &qx).sum() + (&gy * &qy).sum();
        let rhs: f64 = -(&u * &div).sum();
        assert!((lhs - rhs).abs() < 1e-10, "{} vs {}", lhs, rhs);
    }

    #[test]
    fn test_energy_of_constant_is_zero() {
        let u = Array3::from_elem((4, 4, 3), 1.5f32);
        assert_eq!(tnv_energy(u.view()), 0.0);
    }

    #[test]
    fn test_energy_single_channel_is_isotropic_tv() {
        let u = random_volume((4, 5, 1), 9);
        let (gx, gy) = gradient(u.view());
        let tv: f64 = Zip::from(&gx)
            .and(&gy)
            .fold(0.0, |acc, &x, &y| acc + (x * x + y * y).sqrt());
        // The vanishing second singular value carries sqrt-of-rounding noise
        assert!((tnv_energy(u.view()) - tv).abs() < 1e-5);
    }

    #[test]
    fn test_energy_couples_channels() {
        // Aligned edges in two channels cost less than misaligned ones
        let mut aligned = Array3::<f64>::zeros((4, 4, 2));
        let mut misaligned = Array3::<f64>::zeros((4, 4, 2));
        for r in 0..4 {
            for c in 2..4 {
                aligned[[r, c, 0]] = 1.0;
                aligned[[r, c, 1]] = 1.0;
                misaligned[[r, c, 0]] = 1.0;
            }
            for c in 0..4 {
                if r >= 2 {
                    misaligned[[r, c, 1]] = 1.0;
                }
            }
        }
        assert!(tnv_energy(aligned.view()) < tnv_energy(misaligned.view()));
    }

    #[test]
    fn test_objective_at_input_is_energy() {
        let f = random_volume((3, 3, 2), 5);
        let obj = tnv_objective(f.view(), f.view(), 0.1);
        assert!((obj - tnv_energy(f.view())).abs() < 1e-12);
    }
}
