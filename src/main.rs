use demo_skinning_rs::game::util::create_demo_model;
use demo_skinning_rs::game::{EngineConfig, Game, JobScheduler, ResourceManager};
use env_logger::Builder;
use std::sync::Arc;
use std::time;

const FRAME_TIME: f64 = 1.0 / 60.0;

fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    Builder::new()
        .filter(None, config.log_level)
        .default_format()
        .init();
    log::info!("Using {} job worker(s).", config.worker_count);

    let mut job_scheduler = JobScheduler::new(config.worker_count);
    if let Some(jitter) = config.job_jitter {
        log::info!("Job scheduling jitter: {:?}", jitter);
        job_scheduler = job_scheduler.with_jitter(jitter);
    }
    let resource_manager = Arc::new(ResourceManager::new());
    let mut game =
        Game::new(job_scheduler, resource_manager.clone()).with_loop_mode(config.loop_mode);
    game.initialize()?;

    let model = match config.model_path.as_deref() {
        Some(path) => resource_manager.load_model(path)?,
        None => resource_manager.add_model(create_demo_model()?),
    };
    let mut entities = Vec::with_capacity(config.instance_count);
    for _ in 0..config.instance_count {
        entities.push(game.add_model_instance(&model)?);
    }
    log::info!(
        "Animating {} instance(s) of {}.",
        entities.len(),
        &model.model_name
    );

    let start_time = time::Instant::now();
    let mut last_report = time::Instant::now();
    let mut reported_frames = 0_u32;
    for _ in 0..config.frame_count {
        game.update(FRAME_TIME)?;
        reported_frames += 1;
        let elapsed = last_report.elapsed().as_secs_f64();
        if elapsed > 1.0 {
            log::info!("Frames per second: {:.1}", reported_frames as f64 / elapsed);
            reported_frames = 0;
            last_report = time::Instant::now();
        }
    }
    let elapsed = start_time.elapsed();
    log::info!(
        "Simulated {} frame(s) in {:?}, {} pose job(s) completed.",
        game.frame_count(),
        elapsed,
        game.job_scheduler().completed_jobs()
    );

    if let Some(entity) = entities.first() {
        if let Some(matrices) = game.bone_matrices(*entity) {
            let checksum: f32 = matrices
                .iter()
                .map(|matrix| matrix.to_cols_array().iter().sum::<f32>())
                .sum();
            log::info!("Palette checksum of the first instance: {:.4}", checksum);
        }
    }
    game.shutdown();
    Ok(())
}
