use demo_skinning_rs::game::structs::{LoopMode, Skeleton, MAX_BONES};
use demo_skinning_rs::game::util::create_demo_model;
use demo_skinning_rs::game::{Game, JobScheduler, ResourceManager};
use glam::Mat4;
use std::sync::Arc;
use std::time::{Duration, Instant};

const EPSILON: f32 = 1e-6;

fn palette(skeleton: &Skeleton) -> [Mat4; MAX_BONES] {
    skeleton.final_matrices()
}

fn assert_palettes_match(left: &[Mat4; MAX_BONES], right: &[Mat4; MAX_BONES]) {
    for (index, (l, r)) in left.iter().zip(right.iter()).enumerate() {
        assert!(l.abs_diff_eq(*r, EPSILON), "bone {} differs: {} vs {}", index, l, r);
    }
}

#[test]
fn every_skeleton_reflects_its_own_time_under_jitter() {
    let model = create_demo_model().unwrap();
    let mut scheduler = JobScheduler::new(4).with_jitter(Duration::from_micros(300));
    scheduler.begin().unwrap();

    let mut skeletons: Vec<Skeleton> = (0..16)
        .map(|_| {
            let mut skeleton = model.create_skeleton();
            skeleton.set_active_clip("wave").unwrap();
            skeleton
        })
        .collect();
    let mut references: Vec<Skeleton> = skeletons.iter().cloned().collect();

    for frame in 0..10 {
        for (index, (skeleton, reference)) in
            skeletons.iter_mut().zip(references.iter_mut()).enumerate()
        {
            let delta_time = 0.01 * (index + 1) as f64 + 0.001 * frame as f64;
            skeleton.advance_time(delta_time);
            skeleton.submit_pose_job(&scheduler);
            reference.advance_time(delta_time);
        }
        scheduler.wait_for_jobs().unwrap();

        for (skeleton, reference) in skeletons.iter().zip(references.iter()) {
            reference.update_pose();
            assert_eq!(reference.current_time(), skeleton.current_time());
            assert_palettes_match(&palette(reference), &palette(skeleton));
        }
    }
    assert_eq!(160, scheduler.completed_jobs());
    assert_eq!(0, scheduler.failed_jobs());
    scheduler.end();
}

#[test]
fn threaded_and_inline_games_agree() {
    let model = create_demo_model().unwrap();
    let mut threaded = Game::new(
        JobScheduler::new(3).with_jitter(Duration::from_micros(200)),
        Arc::new(ResourceManager::new()),
    )
    .with_loop_mode(LoopMode::Wrap);
    let mut inline = Game::new(JobScheduler::new(0), Arc::new(ResourceManager::new()))
        .with_loop_mode(LoopMode::Wrap);
    threaded.initialize().unwrap();
    inline.initialize().unwrap();

    let threaded_entities: Vec<_> = (0..6)
        .map(|_| threaded.add_model_instance(&model).unwrap())
        .collect();
    let inline_entities: Vec<_> = (0..6)
        .map(|_| inline.add_model_instance(&model).unwrap())
        .collect();

    // Long enough to loop the two-second clip.
    for _ in 0..150 {
        threaded.update(1.0 / 60.0).unwrap();
        inline.update(1.0 / 60.0).unwrap();
    }
    for (t, i) in threaded_entities.iter().zip(inline_entities.iter()) {
        let threaded_palette = threaded.bone_matrices(*t).unwrap();
        let inline_palette = inline.bone_matrices(*i).unwrap();
        assert_palettes_match(&threaded_palette, &inline_palette);
    }
}

#[test]
fn empty_frames_do_not_block() {
    let mut game = Game::new(JobScheduler::new(4), Arc::new(ResourceManager::new()));
    game.initialize().unwrap();
    let start = Instant::now();
    for _ in 0..100 {
        game.update(1.0 / 60.0).unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(100, game.frame_count());
}

#[test]
fn entities_removed_between_frames_are_not_evaluated() {
    let mut game = Game::new(JobScheduler::new(2), Arc::new(ResourceManager::new()));
    game.initialize().unwrap();
    let model = create_demo_model().unwrap();
    let kept = game.add_model_instance(&model).unwrap();
    let removed = game.add_model_instance(&model).unwrap();
    game.update(0.1).unwrap();
    assert!(game.remove_entity(removed).is_some());
    game.update(0.1).unwrap();
    assert_eq!(3, game.job_scheduler().completed_jobs());
    assert!((game.skeleton(kept).unwrap().current_time() - 0.2).abs() < 1e-6);
}
