use lstm_forecast::{Adam, LSTMRegressor, Optimizer};
use ndarray::{s, Array3, Axis};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Uniform;

fn random_batch(shape: (usize, usize, usize), rng: &mut StdRng) -> Array3<f32> {
    Array3::random_using(shape, Uniform::new(-1.0_f32, 1.0), rng)
}

fn max_abs_diff(a: &Array3<f32>, b: &Array3<f32>) -> f32 {
    (a - b).iter().fold(0.0_f32, |acc, x| acc.max(x.abs()))
}

#[test]
fn test_single_training_step_moves_every_parameter() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut model = LSTMRegressor::new_with_rng(2, 2, &mut rng);
    let mut optimizer = Adam::new(0.01);

    let xs = random_batch((1, 3, 2), &mut rng);
    let ts = random_batch((1, 3, 1), &mut rng);

    let before = model.export_params();
    let loss = model.forward(&xs, &ts).unwrap();
    model.backward(1.0).unwrap();
    {
        let (mut params, grads) = model.params_and_grads_mut();
        optimizer.update(&mut params, &grads).unwrap();
    }

    assert!(loss.is_finite());
    assert!(loss >= 0.0);

    let after = model.export_params();
    for (k, (old, new)) in before.iter().zip(&after).enumerate() {
        for (idx, (a, b)) in old.iter().zip(new.iter()).enumerate() {
            assert_ne!(a, b, "parameter {} element {} did not move", k, idx);
        }
    }
}

#[test]
fn test_adam_zero_gradient_step_on_fresh_model() {
    let mut model = LSTMRegressor::new(2, 2);
    let mut optimizer = Adam::new(0.05);
    let before = model.export_params();

    // no backward yet, so every gradient is zero
    {
        let (mut params, grads) = model.params_and_grads_mut();
        optimizer.update(&mut params, &grads).unwrap();
    }

    assert_eq!(model.export_params(), before);
    let moments = optimizer.moments().unwrap();
    assert_eq!(moments.m.len(), 5);
    for (m, p) in moments.m.iter().zip(&before) {
        assert_eq!(m.shape(), p.shape());
        assert!(m.iter().all(|&x| x == 0.0));
    }
}

#[test]
fn test_stateful_split_matches_concatenated_sequence() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut split = LSTMRegressor::new_with_rng(3, 4, &mut rng);
    let mut whole = split.clone();
    let xs = random_batch((2, 6, 3), &mut rng);

    let first = split.predict(&xs.slice(s![.., ..2, ..]).to_owned()).unwrap();
    let second = split.predict(&xs.slice(s![.., 2.., ..]).to_owned()).unwrap();
    let joined = ndarray::concatenate(Axis(1), &[first.view(), second.view()]).unwrap();

    let expected = whole.predict(&xs).unwrap();
    assert!(max_abs_diff(&joined, &expected) < 1e-6);

    let (split_h, split_c) = split.lstm().state();
    let (whole_h, whole_c) = whole.lstm().state();
    for (a, b) in [(split_h, whole_h), (split_c, whole_c)] {
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.shape(), &[2, 4]);
        assert!((a - b).iter().all(|d| d.abs() < 1e-6));
    }
}

#[test]
fn test_reset_matches_fresh_model() {
    let mut rng = StdRng::seed_from_u64(8);
    let mut used = LSTMRegressor::new_with_rng(2, 3, &mut rng);
    let mut fresh = used.clone();
    let warmup = random_batch((2, 5, 2), &mut rng);
    let xs = random_batch((2, 4, 2), &mut rng);

    used.predict(&warmup).unwrap();
    let carried = used.predict(&xs).unwrap();
    used.reset_state();
    let after_reset = used.predict(&xs).unwrap();

    let from_fresh = fresh.predict(&xs).unwrap();
    assert!(max_abs_diff(&after_reset, &from_fresh) < 1e-6);
    assert!(max_abs_diff(&carried, &from_fresh) > 0.0);
}

#[test]
fn test_stateless_model_repeats_itself() {
    let mut rng = StdRng::seed_from_u64(9);
    let mut model = LSTMRegressor::new_with_rng(2, 3, &mut rng).with_stateful(false);
    let xs = random_batch((3, 4, 2), &mut rng);

    let first = model.predict(&xs).unwrap();
    let second = model.predict(&xs).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_repeated_steps_fit_a_constant_target() {
    let mut rng = StdRng::seed_from_u64(10);
    let mut model = LSTMRegressor::new_with_rng(2, 4, &mut rng).with_stateful(false);
    let mut optimizer = Adam::new(0.05);
    let xs = random_batch((4, 5, 2), &mut rng);
    let ts = Array3::from_elem((4, 5, 1), 0.5);

    let initial = model.forward(&xs, &ts).unwrap();
    let mut loss = initial;
    for _ in 0..100 {
        loss = model.forward(&xs, &ts).unwrap();
        model.backward(1.0).unwrap();
        let (mut params, grads) = model.params_and_grads_mut();
        optimizer.update(&mut params, &grads).unwrap();
    }

    assert!(loss < initial * 0.5, "loss {} did not drop from {}", loss, initial);
}
