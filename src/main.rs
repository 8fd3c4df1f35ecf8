// src/main.rs
use std::env;
use std::process::ExitCode;
use anyhow::{bail, Context};
use log::info;
use vta_overlay::{engine, JobEvent, JobOutcome, JobSpec};
// 入口函数
fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let Some(job_path) = env::args_os().nth(1) else {
        bail!("usage: vta-overlay <job.json>");
    };
    let spec = JobSpec::from_json_file(&job_path)
        .with_context(|| format!("loading job file {:?}", job_path))?;
    info!("Job file {:?}", job_path);
    let handle = engine::run(spec);
    let mut last_percent = None;
    while let Some(event) = handle.recv() {
        match event {
            JobEvent::State(state) => println!("[{state}]"),
            JobEvent::Progress {
                frame_index,
                total_frames: Some(total),
                ..
            } if total > 0 => {
                let percent = (frame_index + 1) * 100 / total;
                if last_percent != Some(percent) {
                    println!("{percent:>3}%");
                    last_percent = Some(percent);
                }
            }
            JobEvent::Progress { .. } => {}
            JobEvent::Completed(summary) => {
                println!(
                    "Wrote {:?}: {} frames ({} skipped), {}, {} samples, normalization {:?}",
                    summary.output_path,
                    summary.frames_written,
                    summary.frames_skipped,
                    summary.resolution,
                    summary.samples_loaded,
                    summary.normalization
                );
                if summary.data_exhausted {
                    println!("Note: measurement data ended before the video");
                }
            }
            JobEvent::Failed { kind, message } => eprintln!("{kind}: {message}"),
        }
    }
    Ok(match handle.wait() {
        JobOutcome::Completed(_) => ExitCode::SUCCESS,
        JobOutcome::Failed { .. } => ExitCode::FAILURE,
    })
}
