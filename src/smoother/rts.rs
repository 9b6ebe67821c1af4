use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

use crate::{
    error::Error,
    inverter::{self, condition_number, Inverter, SolveReport},
    state::FilterState,
};

/// Index of the reference clock / datum component. The forward filter holds
/// it fixed, which leaves the predicted covariance singular unless its
/// variance is regularized.
pub(crate) const REFERENCE_INDEX: usize = 0;

/// One backward step of the RTS recursion.
///
/// `smoothed` is the smoothed estimate of the (temporally) next epoch,
/// `minus` the a-priori estimate of that same epoch, `plus` the a-posteriori
/// estimate of the epoch to smooth and `f` the transition from `plus` to `minus`.
/// On success `smoothed` is updated in place and now describes the epoch of `plus`.
pub fn rts_step(
    smoothed: &mut FilterState,
    minus: &mut FilterState,
    plus: &mut FilterState,
    f: &DMatrix<f64>,
    inverters: &[Inverter],
) -> Result<SolveReport, Error> {
    smoothed.validate()?;
    minus.validate()?;
    plus.validate()?;

    if f.shape() != (minus.len(), plus.len()) {
        return Err(Error::TransitionDimension {
            expected: (minus.len(), plus.len()),
            found: f.shape(),
        });
    }

    if smoothed.len() != minus.len() {
        return Err(Error::StateDimension {
            expected: minus.len(),
            found: smoothed.len(),
        });
    }

    smoothed.symmetrize();
    minus.symmetrize();
    plus.symmetrize();

    if !minus.is_empty() {
        minus.p[(REFERENCE_INDEX, REFERENCE_INDEX)] = 1.0;
    }

    let fp = f * &plus.p;

    let mut q = minus.p.upper_triangle();
    q.fill_lower_triangle_with_upper_triangle();

    let report = match inverter::solve(inverters, &q, &fp) {
        Ok(report) => report,
        Err(e) => {
            warn!(
                "{} - failed to solve for smoother gain: smoothed values may be bad",
                plus.time
            );
            debug!("{} - P(-) det: {:.6E}", plus.time, q.determinant());
            match condition_number(&q) {
                Some(cond) => debug!("{} - P(-) condition number: {:.6E}", plus.time, cond),
                None => debug!("{} - P(-) condition number: undetermined", plus.time),
            }
            debug!("{} - P(-): {}", plus.time, q);
            return Err(e);
        },
    };

    let ck = report.x.transpose();

    let dx: DVector<f64> = &ck * (&smoothed.x - &minus.x);
    let dp = &ck * (&smoothed.p - &minus.p) * ck.transpose();

    smoothed.x = &dx + &plus.x;
    smoothed.p = dp + &plus.p;
    smoothed.dx = dx;
    smoothed.time = plus.time;
    smoothed.index = plus.index.clone();

    Ok(report)
}
