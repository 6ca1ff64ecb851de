use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::metrics::MetricsAccumulator;
use super::scene::SceneRunner;
use super::{MetricsHandle, Scene, SceneCommand};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Stop after this many simulation ticks.
    pub max_ticks: Option<u64>,
    /// Sleep between frames so ticks follow wall-clock time. When off, every
    /// frame runs exactly one fixed tick as fast as possible.
    pub pace_real_time: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            max_ticks: None,
            pace_real_time: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    SceneQuit,
    TickLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks_run: u64,
    pub exit: LoopExit,
}

pub fn run_app(config: LoopConfig, scene: Box<dyn Scene>) -> RunSummary {
    run_app_with_metrics(config, scene, MetricsHandle::default())
}

pub fn run_app_with_metrics(
    config: LoopConfig,
    scene: Box<dyn Scene>,
    metrics_handle: MetricsHandle,
) -> RunSummary {
    let mut runner = SceneRunner::new(scene);

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        max_ticks = ?config.max_ticks,
        pace_real_time = config.pace_real_time,
        "loop_config"
    );

    runner.load();
    info!(
        entity_count = runner.world().entity_count(),
        title = %runner.debug_title().unwrap_or_default(),
        "scene_loaded"
    );

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut ticks_run = 0u64;

    let exit = 'frames: loop {
        let now = Instant::now();
        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
        last_frame_instant = now;

        let frame_dt = if config.pace_real_time {
            clamp_frame_delta(raw_frame_dt, max_frame_delta)
        } else {
            fixed_dt
        };
        accumulator = accumulator.saturating_add(frame_dt);

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            let command = runner.step(fixed_dt_seconds);
            let scale = runner.world().clock().time_scale().scale();
            metrics_accumulator.record_tick(fixed_dt_seconds, scale);
            ticks_run = ticks_run.saturating_add(1);

            match command {
                SceneCommand::None => {}
                SceneCommand::HardReset => runner.hard_reset(),
                SceneCommand::Quit => {
                    info!(reason = "scene_quit", ticks_run, "shutdown_requested");
                    break 'frames LoopExit::SceneQuit;
                }
            }

            if config.max_ticks.is_some_and(|limit| ticks_run >= limit) {
                info!(reason = "tick_limit", ticks_run, "shutdown_requested");
                break 'frames LoopExit::TickLimit;
            }
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(Instant::now()) {
            metrics_handle.publish(snapshot);
            info!(
                tps = snapshot.tps,
                sim_rate = snapshot.sim_rate,
                slowed_ticks = snapshot.slowed_ticks,
                entity_count = runner.world().entity_count(),
                "loop_metrics"
            );
        }

        if config.pace_real_time {
            let sleep = compute_pace_sleep(accumulator, fixed_dt);
            if sleep > Duration::ZERO {
                thread::sleep(sleep);
            }
        }
    };

    runner.shutdown();
    info!(ticks_run, exit = ?exit, "shutdown");
    RunSummary { ticks_run, exit }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_pace_sleep(accumulator: Duration, fixed_dt: Duration) -> Duration {
    fixed_dt.saturating_sub(accumulator)
}
