use lstm_forecast::{LSTMCell, LSTMRegressor, TimeAffine};
use ndarray::{Array2, Array3, ArrayD, ArrayViewD};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Uniform;

// five-point stencil step; its O(STEP^4) truncation error sits below f32 round-off
const STEP: f32 = 2e-2;
const REL_TOL: f32 = 1e-3;
const ABS_TOL: f32 = 1e-4;

/// Five-point derivative of `f` at 0.
fn derivative(f: impl Fn(f32) -> f32) -> f32 {
    (f(-2.0 * STEP) - 8.0 * f(-STEP) + 8.0 * f(STEP) - f(2.0 * STEP)) / (12.0 * STEP)
}

fn assert_close(numeric: f32, analytic: f32, what: &str, idx: usize) {
    // relative error at most 1e-3; below a magnitude of 0.1 the absolute error at most 1e-4
    let scale = numeric.abs().max(analytic.abs());
    let error = (numeric - analytic).abs();
    assert!(
        error <= ABS_TOL.max(REL_TOL * scale),
        "{}[{}]: numeric {} vs analytic {} (error {})",
        what,
        idx,
        numeric,
        analytic,
        error
    );
}

/// Numerical derivative of `objective` with respect to every element of
/// every array yielded by `params_of`.
fn check_all_elements<M: Clone>(
    model: &M,
    analytic: &[ArrayD<f32>],
    params_of: fn(&mut M) -> Vec<ndarray::ArrayViewMutD<'_, f32>>,
    objective: &dyn Fn(&M) -> f32,
    label: &str,
) {
    for (k, grad) in analytic.iter().enumerate() {
        for (idx, &expected) in grad.iter().enumerate() {
            let numeric = derivative(|delta| {
                let mut shifted = model.clone();
                if let Some(x) = params_of(&mut shifted)[k].iter_mut().nth(idx) {
                    *x += delta;
                }
                objective(&shifted)
            });
            assert_close(numeric, expected, &format!("{} param {}", label, k), idx);
        }
    }
}

fn to_owned(views: Vec<ArrayViewD<'_, f32>>) -> Vec<ArrayD<f32>> {
    views.into_iter().map(|v| v.to_owned()).collect()
}

fn uniform2(shape: (usize, usize), rng: &mut StdRng) -> Array2<f32> {
    Array2::random_using(shape, Uniform::new(-1.0_f32, 1.0), rng)
}

fn cell_params(cell: &mut LSTMCell) -> Vec<ndarray::ArrayViewMutD<'_, f32>> {
    cell.params_and_grads_mut().0
}

fn affine_params(layer: &mut TimeAffine) -> Vec<ndarray::ArrayViewMutD<'_, f32>> {
    layer.params_and_grads_mut().0
}

fn model_params(model: &mut LSTMRegressor) -> Vec<ndarray::ArrayViewMutD<'_, f32>> {
    model.params_and_grads_mut().0
}

#[test]
fn test_lstm_cell_gradients() {
    let mut rng = StdRng::seed_from_u64(11);
    let cell = LSTMCell::new_with_rng(3, 2, &mut rng);
    let x = uniform2((2, 3), &mut rng);
    let h = uniform2((2, 2), &mut rng);
    let c = uniform2((2, 2), &mut rng);
    // objective = Σ h_next·wh + Σ c_next·wc, so dh_next = wh and dc_next = wc
    let wh = uniform2((2, 2), &mut rng);
    let wc = uniform2((2, 2), &mut rng);

    let objective_at = |cell: &LSTMCell, x: &Array2<f32>, h: &Array2<f32>, c: &Array2<f32>| {
        let (h_next, c_next, _) = cell.forward_with_cache(x, h, c);
        (&h_next * &wh).sum() + (&c_next * &wc).sum()
    };

    let (_, _, cache) = cell.forward_with_cache(&x, &h, &c);
    let (grads, dx, dh_prev, dc_prev) = cell.backward_with_cache(&wh, &wc, &cache);

    let analytic = vec![
        grads.w_x.into_dyn(),
        grads.w_h.into_dyn(),
        grads.b.into_dyn(),
    ];
    check_all_elements(&cell, &analytic, cell_params, &|m| objective_at(m, &x, &h, &c), "cell");

    // inputs and carried state
    let checks = [(&dx, 0), (&dh_prev, 1), (&dc_prev, 2)];
    for (analytic, which) in checks {
        for (idx, &expected) in analytic.iter().enumerate() {
            let numeric = derivative(|delta| {
                let mut inputs = [x.clone(), h.clone(), c.clone()];
                if let Some(v) = inputs[which].iter_mut().nth(idx) {
                    *v += delta;
                }
                objective_at(&cell, &inputs[0], &inputs[1], &inputs[2])
            });
            assert_close(numeric, expected, "cell input", which * 100 + idx);
        }
    }
}

#[test]
fn test_time_affine_gradients() {
    let mut rng = StdRng::seed_from_u64(12);
    let layer = TimeAffine::new_with_rng(3, 2, &mut rng);
    let x = Array3::random_using((2, 4, 3), Uniform::new(-1.0_f32, 1.0), &mut rng);
    let upstream = Array3::random_using((2, 4, 2), Uniform::new(-1.0_f32, 1.0), &mut rng);

    let objective = |layer: &TimeAffine| {
        let mut layer = layer.clone();
        match layer.forward(&x) {
            Ok(y) => (&y * &upstream).sum(),
            Err(err) => panic!("forward failed: {}", err),
        }
    };

    let mut reference = layer.clone();
    reference.forward(&x).unwrap();
    let dx = reference.backward(&upstream).unwrap();

    check_all_elements(&layer, &to_owned(reference.grad_views()), affine_params, &objective, "affine");

    for (idx, &expected) in dx.iter().enumerate() {
        let numeric = derivative(|delta| {
            let mut shifted = x.clone();
            if let Some(v) = shifted.iter_mut().nth(idx) {
                *v += delta;
            }
            let mut layer = layer.clone();
            match layer.forward(&shifted) {
                Ok(y) => (&y * &upstream).sum(),
                Err(err) => panic!("forward failed: {}", err),
            }
        });
        assert_close(numeric, expected, "affine input", idx);
    }
}

#[test]
fn test_regressor_gradients_through_time() {
    let mut rng = StdRng::seed_from_u64(13);
    let model = LSTMRegressor::new_with_rng(2, 3, &mut rng).with_stateful(false);
    let xs = Array3::random_using((2, 4, 2), Uniform::new(-1.0_f32, 1.0), &mut rng);
    let ts = Array3::random_using((2, 4, 1), Uniform::new(-1.0_f32, 1.0), &mut rng);

    // with seed 1 the returned gradient is that of (N/2)·loss, see TimeMSE
    let n = xs.shape()[0] as f32;
    let objective = |model: &LSTMRegressor| {
        let mut model = model.clone();
        match model.forward(&xs, &ts) {
            Ok(loss) => loss * n / 2.0,
            Err(err) => panic!("forward failed: {}", err),
        }
    };

    let mut reference = model.clone();
    reference.forward(&xs, &ts).unwrap();
    reference.backward(1.0).unwrap();

    check_all_elements(&model, &to_owned(reference.grads()), model_params, &objective, "model");
}
