//! One PDHG iteration over a single band.
//!
//! The kernel only reads and writes the buffers of its own worker, so every
//! band of the image runs it concurrently. The one thing a band cannot see is
//! the vertical dual value of the row above its first row; the divergence of
//! that row and its primal residual are completed by [`crate::halo`] after
//! all bands have finished.

use crate::float_trait::TnvFloat;
use crate::prox::{attenuation, SingularValueNorm, Sym2};
use crate::worker::{BandWorker, Residuals, WorkerPhase};

/// Scalars shared read-only by every band during one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StepParams<F: TnvFloat> {
    /// Primal step size.
    pub tau: F,
    /// Dual step size.
    pub sigma: F,
    /// Over-relaxation factor of the gradient extrapolation.
    pub theta: F,
    /// Fidelity weight, `1 / (2 * lambda)` of the user-facing parameter.
    pub lambda: F,
    pub norm: SingularValueNorm,
}

impl<F: TnvFloat> BandWorker<F> {
    /// Run one iteration and store the band's partial sums in `self.partial`.
    pub(crate) fn step(&mut self, params: &StepParams<F>) {
        let BandWorker {
            band,
            layout,
            input,
            u,
            qx,
            qy,
            gradx,
            grady,
            div,
            div0,
            udiff0,
            udiff,
            scratch,
            partial,
            phase,
        } = self;

        let StepParams {
            tau,
            sigma,
            theta,
            lambda,
            norm,
        } = *params;

        let zero = F::zero();
        let one = F::one();
        let tau_lambda = tau * lambda;
        let div_tau = one / tau;
        let div_sigma = one / sigma;
        let constant = one + tau_lambda;

        let cols = layout.cols;
        let channels = layout.channels;
        let pad = layout.pad;
        let row = layout.row_len();

        let mut acc = Residuals::zero();

        // Primal update of the first row, snapshotting what the halo pass
        // needs to finish this row's residual.
        for i in 0..cols {
            for k in 0..channels {
                let l = layout.at(0, i, k);
                let u_upd = (u[l] + tau * div[l] + tau_lambda * input[l]) / constant;
                let d = u[l] - u_upd;
                udiff[l] = d;
                udiff0[l] = d;
                div0[l] = div[l];
                u[l] = u_upd;
            }
        }

        for j in 0..band.rows {
            // The row below exists in local buffers (own row or ghost row)
            let has_next = j + 1 < band.copy_rows;
            let track_primal = band.is_first() || j > 0;

            for i in 0..cols {
                let l = layout.pixel(j, i);
                let last_col = i + 1 == cols;
                let mut m = Sym2::zero();

                for k in 0..channels {
                    let c = l + k;

                    if has_next {
                        let n = c + row;
                        let u_upd = (u[n] + tau * div[n] + tau_lambda * input[n]) / constant;
                        scratch.udiff_next[k] = u[n] - u_upd;
                        u[n] = u_upd;
                    } else {
                        scratch.udiff_next[k] = zero;
                    }

                    let gx = if last_col { zero } else { u[c + pad] - u[c] };
                    let gy = if has_next { u[c + row] - u[c] } else { zero };
                    scratch.gradx_diff[k] = gradx[c] - gx;
                    scratch.grady_diff[k] = grady[c] - gy;
                    gradx[c] = gx;
                    grady[c] = gy;

                    scratch.ubar_x[k] = gx - theta * scratch.gradx_diff[k];
                    scratch.ubar_y[k] = gy - theta * scratch.grady_diff[k];

                    let vx = scratch.ubar_x[k] + div_sigma * qx[c];
                    let vy = scratch.ubar_y[k] + div_sigma * qy[c];
                    m.add_outer(vx, vy);
                }

                let t = attenuation(m, sigma, norm);

                for k in 0..channels {
                    let c = l + k;
                    let ubar_x = scratch.ubar_x[k];
                    let ubar_y = scratch.ubar_y[k];
                    let vx = ubar_x + div_sigma * qx[c];
                    let vy = ubar_y + div_sigma * qy[c];
                    let (px, py) = t.apply(vx, vy);

                    let qx_diff = sigma * (ubar_x - px);
                    let qy_diff = sigma * (ubar_y - py);
                    qx[c] += qx_diff;
                    qy[c] += qy_diff;

                    let lane = i * pad + k;
                    let ud = udiff[lane];
                    udiff[lane] = scratch.udiff_next[k];
                    acc.unorm += ud * ud;
                    acc.qnorm += qx_diff * qx_diff + qy_diff * qy_diff;

                    // The term from the row above is applied last so that the
                    // halo correction of a band's first row reproduces the
                    // same sum.
                    let mut div_upd = zero;
                    if i > 0 {
                        div_upd -= qx[c - pad];
                    }
                    if !last_col {
                        div_upd += qx[c];
                    }
                    if has_next {
                        div_upd += qy[c];
                    }
                    if j > 0 {
                        div_upd -= qy[c - row];
                    }
                    let div_diff = div[c] - div_upd;
                    div[c] = div_upd;

                    if track_primal {
                        acc.resprimal += (div_tau * ud + div_diff).abs();
                    }
                    let gxd = scratch.gradx_diff[k];
                    let gyd = scratch.grady_diff[k];
                    acc.resdual += (div_sigma * qx_diff + gxd).abs();
                    acc.resdual += (div_sigma * qy_diff + gyd).abs();
                    acc.product -= gxd * qx_diff + gyd * qy_diff;
                }
            }
        }

        *partial = acc;
        *phase = WorkerPhase::Stepped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BandLayout;
    use crate::partition::plan_bands;
    use crate::worker::allocate_workers;
    use ndarray::Array3;

    fn params(tau: f64, sigma: f64) -> StepParams<f64> {
        StepParams {
            tau,
            sigma,
            theta: 1.0,
            lambda: 0.5,
            norm: SingularValueNorm::L1,
        }
    }

    fn single_worker(input: &Array3<f64>, solution: &Array3<f64>) -> BandWorker<f64> {
        let (rows, cols, channels) = input.dim();
        let bands = plan_bands(rows, 1);
        let mut workers =
            allocate_workers::<f64>(&bands, BandLayout::new(cols, channels, 1)).unwrap();
        let mut w = workers.remove(0);
        w.load(input.view(), solution.view());
        w
    }

    #[test]
    fn test_constant_image_at_rest() {
        let input = Array3::from_elem((5, 4, 3), 0.75);
        let mut w = single_worker(&input, &input);

        w.step(&params(0.5, 0.5));

        assert_eq!(w.phase, WorkerPhase::Stepped);
        assert_eq!(w.partial, Residuals::zero());
        assert!(w.u.iter().all(|&v| (v - 0.75).abs() < 1e-15));
        assert!(w.qx.iter().chain(w.qy.iter()).all(|&v| v == 0.0));
    }

    #[test]
    fn test_primal_update_pulls_towards_input() {
        // Starting from zero with no dual field, u moves by tau*lambda/(1+tau*lambda)
        let input = Array3::from_elem((3, 3, 1), 2.0);
        let zero = Array3::zeros((3, 3, 1));
        let mut w = single_worker(&input, &zero);
        let p = params(0.5, 0.5);

        w.step(&p);

        let expected = 0.5 * 0.5 * 2.0 / (1.0 + 0.5 * 0.5);
        for &v in &w.u {
            assert!((v - expected).abs() < 1e-12, "{} vs {}", v, expected);
        }
        // Flat image: all motion is primal
        assert!(w.partial.unorm > 0.0);
        assert_eq!(w.partial.qnorm, 0.0);
    }

    #[test]
    fn test_boundary_gradients_are_zero() {
        let input = Array3::from_shape_fn((4, 5, 2), |(r, c, k)| (r * 7 + c * 3 + k) as f64);
        let mut w = single_worker(&input, &input);

        w.step(&params(0.5, 0.5));

        let layout = w.layout;
        for k in 0..2 {
            for r in 0..4 {
                assert_eq!(w.gradx[layout.at(r, 4, k)], 0.0);
            }
            for c in 0..5 {
                assert_eq!(w.grady[layout.at(3, c, k)], 0.0);
            }
        }
        // Interior gradients track the ramp
        assert!(w.gradx[layout.at(1, 1, 0)] > 0.0);
        assert!(w.grady[layout.at(1, 1, 0)] > 0.0);
    }

    #[test]
    fn test_divergence_matches_dual_field() {
        let input = Array3::from_shape_fn((6, 5, 2), |(r, c, k)| {
            ((r * 13 + c * 7 + k * 3) % 11) as f64 / 11.0
        });
        let zero = Array3::zeros((6, 5, 2));
        let mut w = single_worker(&input, &zero);
        let p = params(0.4, 0.6);
        for _ in 0..4 {
            w.step(&p);
        }

        let layout = w.layout;
        for r in 0..6 {
            for c in 0..5 {
                for k in 0..2 {
                    let mut expected = 0.0;
                    if c > 0 {
                        expected -= w.qx[layout.at(r, c - 1, k)];
                    }
                    if c < 4 {
                        expected += w.qx[layout.at(r, c, k)];
                    }
                    if r < 5 {
                        expected += w.qy[layout.at(r, c, k)];
                    }
                    if r > 0 {
                        expected -= w.qy[layout.at(r - 1, c, k)];
                    }
                    let got = w.div[layout.at(r, c, k)];
                    assert!((got - expected).abs() < 1e-12, "({}, {}, {})", r, c, k);
                }
            }
        }
    }

    #[test]
    fn test_single_column_and_single_row_stay_finite() {
        for shape in [(6, 1, 2), (1, 6, 2), (1, 1, 1)] {
            let input = Array3::from_shape_fn(shape, |(r, c, k)| (r + c + k) as f64);
            let zero = Array3::zeros(shape);
            let mut w = single_worker(&input, &zero);
            for _ in 0..3 {
                w.step(&params(0.5, 0.5));
            }
            assert!(w.u.iter().all(|v| v.is_finite()), "shape {:?}", shape);
            assert!(w.partial.resprimal.is_finite());
            assert!(w.partial.resdual.is_finite());
        }
    }

    #[test]
    fn test_first_row_snapshot() {
        let input = Array3::from_shape_fn((4, 3, 1), |(r, c, _)| (r * 3 + c) as f64);
        let zero = Array3::zeros((4, 3, 1));
        let mut w = single_worker(&input, &zero);
        let p = params(0.5, 0.5);
        w.step(&p);
        let div_before: Vec<f64> = w.div[..3].to_vec();
        let u_before: Vec<f64> = w.u[..3].to_vec();

        w.step(&p);

        assert_eq!(&w.div0[..], &div_before[..]);
        for i in 0..3 {
            let l = w.layout.at(0, i, 0);
            assert!((w.udiff0[l] - (u_before[i] - w.u[l])).abs() < 1e-12);
        }
    }
}
