use nalgebra::{DMatrix, DVector};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::QaError;
use crate::hist::{Hist1D, Hist2D};

pub trait Function {
    fn call(&self, x: &[f64]) -> f64;
    fn derivative(&self, i: usize, x: &[f64]) -> f64 {
        let mut dx = vec![0.0; x.len()];
        let h = f64::sqrt(f64::EPSILON) * x[i].abs().max(1.0);
        dx[i] = h;
        let x_plus_dx: Vec<f64> = x.iter().zip(dx.iter()).map(|(x, dx)| x + dx).collect();
        let x_minus_dx: Vec<f64> = x.iter().zip(dx).map(|(x, dx)| x - dx).collect();
        (self.call(&x_plus_dx) - self.call(&x_minus_dx)) / (2.0 * h)
    }
    fn gradient(&self, x: &[f64]) -> Vec<f64> {
        (0..x.len()).map(|i| self.derivative(i, x)).collect()
    }
}

/// A curve $`f(x; \vec{p})`$ fitted to binned data.
pub trait Model: Sync {
    fn n_params(&self) -> usize;
    fn eval(&self, x: f64, params: &[f64]) -> f64;
    fn parameter_gradient(&self, x: f64, params: &[f64]) -> Vec<f64> {
        //! Numerical $`\partial f / \partial p_i`$; override when an analytic form exists.
        (0..params.len())
            .map(|i| {
                let h = f64::sqrt(f64::EPSILON) * params[i].abs().max(1.0);
                let mut up = params.to_vec();
                let mut down = params.to_vec();
                up[i] += h;
                down[i] -= h;
                (self.eval(x, &up) - self.eval(x, &down)) / (2.0 * h)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
    pub sigma: f64,
}

/// $`\chi^2`$ of a [`Model`] against a set of [`DataPoint`]s.
pub struct ChiSquare<'a, M: Model> {
    pub model: &'a M,
    pub points: &'a [DataPoint],
}

impl<'a, M: Model> ChiSquare<'a, M> {
    pub fn new(model: &'a M, points: &'a [DataPoint]) -> Self {
        Self { model, points }
    }
    fn jacobian(&self, params: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
        //! Weighted Jacobian and weighted residuals.
        let n = self.points.len();
        let mut jac = DMatrix::zeros(n, params.len());
        let mut res = DVector::zeros(n);
        for (i, point) in self.points.iter().enumerate() {
            res[i] = (point.y - self.model.eval(point.x, params)) / point.sigma;
            for (j, dfdp) in self
                .model
                .parameter_gradient(point.x, params)
                .into_iter()
                .enumerate()
            {
                jac[(i, j)] = dfdp / point.sigma;
            }
        }
        (jac, res)
    }
}

impl<'a, M: Model> Function for ChiSquare<'a, M> {
    fn call(&self, x: &[f64]) -> f64 {
        self.points
            .iter()
            .map(|p| ((p.y - self.model.eval(p.x, x)) / p.sigma).powi(2))
            .sum()
    }
}

pub trait Algorithm<F> {
    type State;
    type ErrorType;
    fn step(&self, state: Self::State, function: &F) -> Result<Self::State, Self::ErrorType>;
    fn is_converged(&self, _state: &Self::State) -> bool {
        false
    }
    fn fit(
        &self,
        initial_state: Self::State,
        function: &F,
        max_iters: usize,
    ) -> Result<Self::State, Self::ErrorType> {
        let mut state = initial_state;
        for _ in 0..max_iters {
            state = self.step(state, function)?;
            if self.is_converged(&state) {
                break;
            }
        }
        Ok(state)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DampedState {
    pub x: Vec<f64>,
    pub fx: f64,
    pub lambda: f64,
    pub converged: bool,
}

impl DampedState {
    pub fn new(x: Vec<f64>, f: &impl Function) -> Self {
        Self {
            fx: f.call(&x),
            x,
            lambda: 1e-3,
            converged: false,
        }
    }
}

/// Levenberg–Marquardt minimization of a [`ChiSquare`].
pub struct LevenbergMarquardt {
    pub tolerance: f64,
    pub max_lambda: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_lambda: 1e10,
        }
    }
}

impl<'a, M: Model> Algorithm<ChiSquare<'a, M>> for LevenbergMarquardt {
    type State = DampedState;
    type ErrorType = QaError;

    fn step(
        &self,
        state: Self::State,
        function: &ChiSquare<'a, M>,
    ) -> Result<Self::State, Self::ErrorType> {
        let (jac, res) = function.jacobian(&state.x);
        let jtj = jac.transpose() * &jac;
        let jtr = jac.transpose() * res;
        let mut damped = jtj.clone();
        for i in 0..damped.nrows() {
            damped[(i, i)] += state.lambda * jtj[(i, i)].max(f64::EPSILON);
        }
        let Some(delta) = damped.lu().solve(&jtr) else {
            return Ok(DampedState {
                lambda: state.lambda * 10.0,
                converged: state.lambda * 10.0 > self.max_lambda,
                ..state
            });
        };
        let x: Vec<f64> = state.x.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
        let fx = function.call(&x);
        if fx.is_finite() && fx <= state.fx {
            let converged = (state.fx - fx) <= self.tolerance * state.fx.max(1.0);
            Ok(DampedState {
                x,
                fx,
                lambda: (state.lambda / 10.0).max(1e-12),
                converged,
            })
        } else {
            Ok(DampedState {
                lambda: state.lambda * 10.0,
                converged: state.lambda * 10.0 > self.max_lambda,
                ..state
            })
        }
    }

    fn is_converged(&self, state: &Self::State) -> bool {
        state.converged
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub params: Vec<f64>,
    pub errors: Vec<f64>,
    pub chi2: f64,
    pub ndf: usize,
}

fn parameter_errors<M: Model>(chi2: &ChiSquare<'_, M>, params: &[f64]) -> Vec<f64> {
    let (jac, _) = chi2.jacobian(params);
    let jtj = jac.transpose() * &jac;
    match jtj.try_inverse() {
        Some(cov) => (0..params.len()).map(|i| cov[(i, i)].max(0.0).sqrt()).collect(),
        None => vec![0.0; params.len()],
    }
}

/// Gaussian $`A \exp\left(-\frac{(x-\mu)^2}{2\sigma^2}\right)`$ with parameters $`(A, \mu, \sigma)`$.
pub struct Gaussian;

impl Model for Gaussian {
    fn n_params(&self) -> usize {
        3
    }
    fn eval(&self, x: f64, params: &[f64]) -> f64 {
        let z = (x - params[1]) / params[2];
        params[0] * (-0.5 * z * z).exp()
    }
    fn parameter_gradient(&self, x: f64, params: &[f64]) -> Vec<f64> {
        let (a, mu, sigma) = (params[0], params[1], params[2]);
        let z = (x - mu) / sigma;
        let g = (-0.5 * z * z).exp();
        vec![g, a * g * z / sigma, a * g * z * z / sigma]
    }
}

pub fn fit_model<M: Model>(
    name: &str,
    model: &M,
    points: &[DataPoint],
    seed: Vec<f64>,
) -> Result<FitResult, QaError> {
    //! Minimizes the $`\chi^2`$ of `model` against `points` starting from `seed`.
    if points.len() < model.n_params() {
        return Err(QaError::Fit {
            name: name.to_string(),
            reason: format!(
                "{} points cannot constrain {} parameters",
                points.len(),
                model.n_params()
            ),
        });
    }
    let chi2 = ChiSquare::new(model, points);
    let state = LevenbergMarquardt::default().fit(DampedState::new(seed, &chi2), &chi2, 200)?;
    if !state.fx.is_finite() {
        return Err(QaError::Fit {
            name: name.to_string(),
            reason: "non-finite chi-square".to_string(),
        });
    }
    Ok(FitResult {
        errors: parameter_errors(&chi2, &state.x),
        ndf: points.len() - model.n_params(),
        chi2: state.fx,
        params: state.x,
    })
}

pub fn fit_gaussian(name: &str, hist: &Hist1D) -> Result<FitResult, QaError> {
    //! Fits a [`Gaussian`] to the non-empty bins of `hist`, seeded by its moments.
    //!
    //! Bin errors are used as $`\chi^2`$ weights, so empty bins never enter the fit.
    let axis = hist.axis();
    let points: Vec<DataPoint> = axis
        .bins()
        .filter(|&i| hist.bin_content(i) > 0.0)
        .map(|i| DataPoint {
            x: axis.bin_center(i),
            y: hist.bin_content(i),
            sigma: hist.bin_error(i).max(1.0),
        })
        .collect();
    let sigma_seed = match hist.std_dev() {
        s if s > 0.0 => s,
        _ => axis.bin_width(),
    };
    let mut result = fit_model(
        name,
        &Gaussian,
        &points,
        vec![hist.maximum(), hist.mean(), sigma_seed],
    )?;
    result.params[2] = result.params[2].abs();
    Ok(result)
}

/// Per-slice Gaussian results of [`fit_slices_y`], one histogram per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceFits {
    pub constant: Hist1D,
    pub mean: Hist1D,
    pub sigma: Hist1D,
}

pub fn fit_slices_y(hist: &Hist2D, ix_first: usize, ix_last: usize, min_entries: u64) -> SliceFits {
    //! Fits a Gaussian to every y slice of `hist` between x bins `ix_first` and `ix_last`.
    //!
    //! Results land in histograms along the x axis named `{name}_0`, `{name}_1` and `{name}_2`.
    //! Slices with fewer than `min_entries` entries, or whose fit fails, are left empty.
    let fit_slice = |ix: usize| {
        let slice = hist.projection_y(&format!("{}_py_{ix}", hist.name()), ix, ix);
        if slice.entries() < min_entries.max(1) {
            return (ix, None);
        }
        match fit_gaussian(slice.name(), &slice) {
            Ok(result) => (ix, Some(result)),
            Err(err) => {
                debug!("skipping slice {ix}: {err}");
                (ix, None)
            }
        }
    };
    #[cfg(feature = "parallel")]
    let results: Vec<(usize, Option<FitResult>)> =
        (ix_first..=ix_last).into_par_iter().map(fit_slice).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<(usize, Option<FitResult>)> = (ix_first..=ix_last).map(fit_slice).collect();

    let axis = *hist.x_axis();
    let mut fits = SliceFits {
        constant: Hist1D::new(&format!("{}_0", hist.name()), hist.title(), axis),
        mean: Hist1D::new(&format!("{}_1", hist.name()), hist.title(), axis),
        sigma: Hist1D::new(&format!("{}_2", hist.name()), hist.title(), axis),
    };
    for (ix, result) in results {
        if let Some(result) = result {
            fits.constant.set_bin(ix, result.params[0], result.errors[0]);
            fits.mean.set_bin(ix, result.params[1], result.errors[1]);
            fits.sigma.set_bin(ix, result.params[2], result.errors[2]);
        }
    }
    fits
}

/// Number of inverse-power terms in a [`WidthCurve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveForm {
    /// $`p_0 + p_1/x + p_2/x^2`$
    Quadratic,
    /// $`p_0 + p_1/x + p_2/x^2 + p_3/x^3`$
    Cubic,
}

impl CurveForm {
    pub fn n_params(&self) -> usize {
        match self {
            Self::Quadratic => 3,
            Self::Cubic => 4,
        }
    }
    pub fn formula(&self) -> &'static str {
        match self {
            Self::Quadratic => "[0]+[1]/x+[2]/(x*x)",
            Self::Cubic => "[0]+[1]/x+[2]/(x*x)+[3]/(x*x*x)",
        }
    }
}

/// Momentum-dependent impact-parameter width, $`\sum_k p_k x^{-k}`$.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidthCurve {
    pub name: String,
    pub params: Vec<f64>,
    #[serde(default)]
    pub errors: Vec<f64>,
    pub range: (f64, f64),
}

impl WidthCurve {
    pub fn new(name: &str, params: Vec<f64>, range: (f64, f64)) -> Self {
        Self {
            name: name.to_string(),
            errors: vec![0.0; params.len()],
            params,
            range,
        }
    }
    pub fn eval(&self, x: f64) -> f64 {
        self.params
            .iter()
            .enumerate()
            .map(|(k, p)| p / x.powi(k as i32))
            .sum()
    }
    pub fn scaled(&self, name: &str, factor: f64) -> Self {
        //! Copy of the curve with every parameter multiplied by `factor`.
        Self {
            name: name.to_string(),
            params: self.params.iter().map(|p| p * factor).collect(),
            errors: self.errors.iter().map(|e| e * factor.abs()).collect(),
            range: self.range,
        }
    }
    pub fn formula(&self) -> String {
        (0..self.params.len())
            .map(|k| match k {
                0 => "[0]".to_string(),
                1 => "[1]/x".to_string(),
                _ => format!("[{k}]/({})", vec!["x"; k].join("*")),
            })
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl Model for WidthCurve {
    fn n_params(&self) -> usize {
        self.params.len()
    }
    fn eval(&self, x: f64, params: &[f64]) -> f64 {
        params
            .iter()
            .enumerate()
            .map(|(k, p)| p / x.powi(k as i32))
            .sum()
    }
    fn parameter_gradient(&self, x: f64, params: &[f64]) -> Vec<f64> {
        (0..params.len()).map(|k| x.powi(-(k as i32))).collect()
    }
}

pub fn fit_width_curve(
    name: &str,
    widths: &Hist1D,
    form: CurveForm,
    range: (f64, f64),
) -> Result<WidthCurve, QaError> {
    //! Fits `form` to the filled bins of `widths` whose centers lie inside `range`.
    //!
    //! The curve is linear in its parameters, so the weighted least-squares problem is
    //! solved directly by SVD; no starting values are involved.
    let axis = widths.axis();
    let points: Vec<DataPoint> = axis
        .bins()
        .filter(|&i| {
            let x = axis.bin_center(i);
            x >= range.0 && x <= range.1 && x > 0.0 && widths.bin_content(i) > 0.0
        })
        .map(|i| DataPoint {
            x: axis.bin_center(i),
            y: widths.bin_content(i),
            sigma: match widths.bin_error(i) {
                e if e > 0.0 => e,
                _ => 1.0,
            },
        })
        .collect();
    let n_params = form.n_params();
    if points.len() < n_params {
        return Err(QaError::Fit {
            name: name.to_string(),
            reason: format!(
                "{} filled width bins in [{}, {}] cannot constrain {n_params} parameters",
                points.len(),
                range.0,
                range.1
            ),
        });
    }
    let design = DMatrix::from_fn(points.len(), n_params, |i, k| {
        points[i].x.powi(-(k as i32)) / points[i].sigma
    });
    let target = DVector::from_iterator(points.len(), points.iter().map(|p| p.y / p.sigma));
    let params = design
        .svd(true, true)
        .solve(&target, f64::EPSILON)
        .map_err(|reason| QaError::Fit {
            name: name.to_string(),
            reason: reason.to_string(),
        })?;
    let mut curve = WidthCurve::new(name, params.iter().copied().collect(), range);
    curve.errors = parameter_errors(&ChiSquare::new(&curve, &points), &curve.params);
    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hist::Axis;
    use approx::assert_relative_eq;

    #[test]
    fn gaussian_fit_recovers_width() {
        let mut hist = Hist1D::new("h", "", Axis::new(100, -5.0, 5.0));
        for i in 1..=100 {
            let x = hist.axis().bin_center(i);
            let n = (1000.0 * (-0.5 * (x / 0.8_f64).powi(2)).exp()).round();
            for _ in 0..n as usize {
                hist.fill(x);
            }
        }
        let result = fit_gaussian("h", &hist).unwrap();
        assert_relative_eq!(result.params[1], 0.0, epsilon = 1e-3);
        assert_relative_eq!(result.params[2], 0.8, epsilon = 1e-2);
    }

    #[test]
    fn width_curve_fit_is_exact_on_noiseless_points() {
        let truth = WidthCurve::new("truth", vec![0.002, 0.004, 0.006], (0.0, 100.0));
        let mut widths = Hist1D::new("w", "", Axis::new(20, 0.0, 20.0));
        for i in 1..=20 {
            let x = widths.axis().bin_center(i);
            widths.set_bin(i, truth.eval(x), 1e-4);
        }
        let curve = fit_width_curve("fit", &widths, CurveForm::Quadratic, (1.0, 15.0)).unwrap();
        for (fitted, expected) in curve.params.iter().zip(truth.params.iter()) {
            assert_relative_eq!(fitted, expected, epsilon = 1e-9);
        }
        assert_eq!(curve.formula(), CurveForm::Quadratic.formula());
        let pos = curve.scaled("pos", 3.0);
        assert_relative_eq!(pos.eval(4.0), 3.0 * curve.eval(4.0), epsilon = 1e-12);
    }

    #[test]
    fn too_few_points_is_an_error() {
        let widths = Hist1D::new("w", "", Axis::new(20, 0.0, 20.0));
        assert!(matches!(
            fit_width_curve("fit", &widths, CurveForm::Cubic, (1.0, 15.0)),
            Err(QaError::Fit { .. })
        ));
    }
}
