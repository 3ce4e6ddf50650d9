use lstm_forecast::persistence::ModelPersistence;
use lstm_forecast::{
    create_adam_trainer, next_step_pairs, LSTMRegressor, MinMaxScaler, PersistentModel, TimeSeriesBatcher,
    TrainingConfig,
};
use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DAYS: usize = 4 * 365;
const TEST_DAYS: usize = 365;

/// Synthetic daily weather: eight readings per day and, separately, the mean
/// temperature to forecast. The target never appears among the readings.
fn weather(rng: &mut StdRng) -> (Array2<f32>, Array1<f32>) {
    let mut readings = Array2::zeros((DAYS, 8));
    let mut mean_temperature = Array1::zeros(DAYS);
    for day in 0..DAYS {
        let season = (2.0 * std::f32::consts::PI * day as f32 / 365.0).sin();
        let mean = 12.0 + 11.0 * season + rng.gen_range(-2.0..2.0);
        let humidity = 65.0 - 10.0 * season + rng.gen_range(-8.0..8.0);
        let row = [
            // dew point
            mean - (100.0 - humidity) / 5.0 + rng.gen_range(-1.0..1.0),
            // vapour pressure
            6.1 * (0.06 * mean).exp() * humidity / 100.0 + rng.gen_range(-0.5..0.5),
            // station and sea-level pressure
            1003.0 - 6.0 * season + rng.gen_range(-4.0..4.0),
            1013.0 - 6.0 * season + rng.gen_range(-4.0..4.0),
            // daylight hours
            12.2 + 2.4 * season,
            // ground, grass minimum and 5 cm soil temperatures
            mean + 1.5 + rng.gen_range(-1.5..1.5),
            mean - 6.0 + rng.gen_range(-2.0..2.0),
            mean + 0.8 + rng.gen_range(-1.0..1.0),
        ];
        readings.row_mut(day).assign(&Array1::from(row.to_vec()));
        mean_temperature[day] = mean;
    }
    (readings, mean_temperature)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut rng = StdRng::seed_from_u64(42);
    let (readings, mean_temperature) = weather(&mut rng);
    let split = DAYS - TEST_DAYS;

    let scaler = MinMaxScaler::fit(&readings.slice(s![..split, ..]).to_owned());
    let scaled = scaler.transform(&readings);

    let target = mean_temperature.insert_axis(Axis(1));
    let target_scaler = MinMaxScaler::fit(&target.slice(s![..split, ..]).to_owned());
    let temperature = target_scaler.transform(&target).column(0).to_owned();

    // today's readings -> tomorrow's mean temperature
    let (train_x, train_t) = next_step_pairs(
        &scaled.slice(s![..split, ..]).to_owned(),
        &temperature.slice(s![..split]).to_owned(),
    )?;
    let (test_x, test_t) = next_step_pairs(
        &scaled.slice(s![split.., ..]).to_owned(),
        &temperature.slice(s![split..]).to_owned(),
    )?;

    println!("Training on {} days, testing on {} days", train_x.nrows(), test_x.nrows());

    let model = LSTMRegressor::new_with_rng(8, 8, &mut rng);
    let config = TrainingConfig {
        epochs: 100,
        print_every: 10,
        clip_gradient: None,
    };
    let mut trainer = create_adam_trainer(model, 0.05).with_config(config);
    let mut batcher = TimeSeriesBatcher::new(train_x, train_t, 16, 10)?;
    trainer.train(&mut batcher)?;

    // run the whole test year as one sequence from a clean state
    trainer.model.reset_state();
    let inputs = test_x.insert_axis(Axis(0));
    let predictions = trainer.predict(&inputs)?;
    let predicted = predictions.index_axis(Axis(0), 0).index_axis(Axis(1), 0).to_owned();

    let range = target_scaler.max[0] - target_scaler.min[0];
    let rmse = ((&predicted - &test_t).mapv(|e| e * e).mean().unwrap_or(0.0)).sqrt() * range;
    println!("Test RMSE: {:.2} °C", rmse);

    for day in (0..test_t.len()).step_by(60) {
        println!(
            "day {:>3}: predicted {:>6.2} °C, actual {:>6.2} °C",
            day,
            predicted[day] * range + target_scaler.min[0],
            test_t[day] * range + target_scaler.min[0]
        );
    }

    let final_loss = trainer.get_latest_metrics().map(|m| m.train_loss);
    let saved = ModelPersistence::create_saved_model(
        &trainer.model,
        "temperature_forecast".to_string(),
        trainer.get_metrics_history().len(),
        final_loss,
        Some("next-day mean temperature from eight other daily readings".to_string()),
    );
    let path = std::env::temp_dir().join("temperature_forecast.json");
    trainer.model.save(&path, saved.metadata)?;
    println!("Model saved to {}", path.display());

    Ok(())
}
