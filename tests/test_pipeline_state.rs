// Host-side pipeline state machine: batching arithmetic, counter reset
// semantics, temporal-history bookkeeping and the denoiser's ping-pong
// schedule.

use raywave::svgf::{svgf_plan, MAX_ATROUS_ITERATIONS};
use raywave::wavefront::driver::batch_sizes;
use raywave::wavefront::{advance_history_frames, BufferSizes, BATCH_SIZE, NUM_BOUNCES};

#[test]
fn full_hd_frame_runs_two_batches_and_resets_to_default() {
    let pixel_count = 1920 * 1080;
    let batches = batch_sizes(pixel_count, BATCH_SIZE);
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0], (0, 1_048_576));
    assert_eq!(batches[1], (1_048_576, pixel_count - 1_048_576));

    // After the last batch the counters return to the default seed
    let sizes = BufferSizes::reset(BATCH_SIZE);
    assert_eq!(sizes.trace[0], 1_048_576);
    for bounce in 1..NUM_BOUNCES {
        assert_eq!(sizes.trace[bounce], 0);
    }
}

#[test]
fn one_pixel_screen_is_one_one_pixel_batch() {
    let batch = BATCH_SIZE.min(1);
    assert_eq!(batch, 1);
    assert_eq!(batch_sizes(1, batch), vec![(0, 1)]);
}

#[test]
fn mid_frame_counter_seed_matches_next_batch_live_size() {
    let pixel_count = 2 * BATCH_SIZE + 123;
    let batches = batch_sizes(pixel_count, BATCH_SIZE);
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[2].1, 123);

    let sizes = BufferSizes::reset(batches[2].1);
    assert_eq!(sizes.trace[0], 123);
}

#[test]
fn settings_change_resets_history_regardless_of_motion() {
    // Toggling settings on frame N forces frames_since_camera_moved = 0 on
    // frame N+1 even while the camera is still
    assert_eq!(advance_history_frames(17, true, false, false), 0);
    assert_eq!(advance_history_frames(17, true, true, true), 0);
}

#[test]
fn history_saturates_modulo_256_under_svgf() {
    assert_eq!(advance_history_frames(254, false, true, false), 255);
    assert_eq!(advance_history_frames(255, false, true, false), 0);
    // Camera motion is ignored while SVGF owns the history
    assert_eq!(advance_history_frames(10, false, true, true), 11);
}

#[test]
fn history_counts_up_and_resets_on_motion_without_svgf() {
    assert_eq!(advance_history_frames(10, false, false, false), 11);
    assert_eq!(advance_history_frames(10, false, false, true), 0);
}

#[test]
fn atrous_schedule_records_the_result_buffer_for_all_counts() {
    for iterations in 0..=MAX_ATROUS_ITERATIONS {
        for spatial_variance in [false, true] {
            let plan = svgf_plan(spatial_variance, iterations);
            assert_eq!(plan.steps.len(), iterations);

            // The orientation finalize binds must have the final result in
            // its out half
            if let Some(last) = plan.steps.last() {
                assert_eq!(plan.finalize_group, last.group);
                // out half of orientation g is the opposite pair
                assert_eq!(plan.final_output_alt, last.group == 0);
            }

            // Step sizes double each iteration
            for (i, step) in plan.steps.iter().enumerate() {
                assert_eq!(step.step_size, 1 << i);
            }
        }
    }
}

#[test]
fn history_feed_comes_from_the_first_post_variance_iteration() {
    let plan = svgf_plan(true, 4);
    assert!(plan.steps[0].feeds_history);
    assert!(plan.steps[1..].iter().all(|s| !s.feeds_history));

    // With no iterations the temporal stage seeds history itself, so no
    // step may claim it
    let plan = svgf_plan(true, 0);
    assert!(plan.steps.is_empty());
}
