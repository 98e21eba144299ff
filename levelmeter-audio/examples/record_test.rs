//! Capture from the default microphone for 3 seconds and report frame levels

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use levelmeter_audio::{AudioCapture, CaptureConfig};
use parking_lot::Mutex;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Capture Test ===\n");

    let config = CaptureConfig::default();
    let mut capture = AudioCapture::new(config.clone());

    let levels = Arc::new(Mutex::new(Vec::new()));
    let frame_levels = Arc::clone(&levels);
    capture.set_frame_handler(move |frame| {
        let rms = (frame.iter().map(|&s| (s as f64).powi(2)).sum::<f64>()
            / frame.len().max(1) as f64)
            .sqrt();
        frame_levels.lock().push(rms);
    });

    capture.start()?;
    thread::sleep(Duration::from_secs(3));
    capture.stop()?;

    let rms = levels.lock();
    println!("Frames: {}", rms.len());
    println!("Samples: {}", capture.total_samples_captured());
    println!(
        "Duration: {:.2}s",
        capture.total_samples_captured() as f64 / config.sample_rate as f64
    );
    if let Some(max) = rms.iter().cloned().reduce(f64::max) {
        println!("Loudest frame RMS: {:.1}", max);
    } else {
        println!("\nWarning: No audio captured!");
    }

    Ok(())
}
