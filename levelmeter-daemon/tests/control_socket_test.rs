//! Drive the meter over its Unix socket without audio hardware

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use levelmeter_audio::MockBackend;
use levelmeter_daemon::{IpcServer, Meter, MeterConfig, TerminalDisplay};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

async fn send(path: &std::path::Path, command: &str) -> String {
    let mut stream = UnixStream::connect(path).await.unwrap();
    stream.write_all(command.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    reply.trim_end().to_string()
}

async fn status(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_str(&send(path, "status").await).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_socket_commands_control_meter() {
    let tmp = tempfile::tempdir().unwrap();
    let socket_path = tmp.path().join("levelmeter.sock");

    let backend = MockBackend::constant(2500).interval(Duration::from_millis(2));
    let (meter, updates) = Meter::new(&MeterConfig::default(), backend).unwrap();
    let meter = Arc::new(meter);

    let display = TerminalDisplay::new(10, meter.last_reading_slot());
    let display_task = tokio::spawn(display.run(updates));

    let mut server = IpcServer::new(&socket_path, Arc::clone(&meter)).unwrap();
    let server_task = tokio::spawn(async move { server.run().await });

    let report = status(&socket_path).await;
    assert_eq!(report["state"], "stopped");
    assert_eq!(report["sample_rate"], 8000);
    assert_eq!(report["audio_source"], "voice_recognition");

    assert_eq!(send(&socket_path, "start").await, "Capture started");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = status(&socket_path).await;
    assert_eq!(report["state"], "running");
    assert!(report["total_samples"].as_u64().unwrap() > 0);
    assert!(report["last_reading"]["raw_db"].as_f64().is_some());

    assert_eq!(
        send(&socket_path, "gain +5").await,
        "Calibration offset -5.0 dB"
    );
    let offset = status(&socket_path).await["calibration_offset_db"].as_f64().unwrap();
    assert_relative_eq!(offset, -5.0);

    assert_eq!(send(&socket_path, "toggle").await, "Capture stopped");
    let report = status(&socket_path).await;
    assert_eq!(report["state"], "stopped");
    assert_eq!(report["input_exhausted"], false);

    assert!(send(&socket_path, "louder").await.starts_with("Error:"));

    assert_eq!(send(&socket_path, "quit").await, "Shutting down");
    tokio::time::timeout(Duration::from_secs(1), meter.shutdown_requested())
        .await
        .unwrap();

    server_task.abort();
    display_task.abort();
}

#[tokio::test]
async fn test_start_failure_reply() {
    let tmp = tempfile::tempdir().unwrap();
    let socket_path = tmp.path().join("levelmeter.sock");

    let backend = MockBackend::silence().fail_open("device busy");
    let (meter, _updates) = Meter::new(&MeterConfig::default(), backend).unwrap();

    let mut server = IpcServer::new(&socket_path, Arc::new(meter)).unwrap();
    let server_task = tokio::spawn(async move { server.run().await });

    let reply = send(&socket_path, "start").await;
    assert!(reply.starts_with("Error:"));
    assert!(reply.contains("device busy"));

    server_task.abort();
}

#[test]
fn test_server_removes_socket_on_drop() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let socket_path = tmp.path().join("levelmeter.sock");

    runtime.block_on(async {
        let (meter, _updates) = Meter::new(&MeterConfig::default(), MockBackend::silence()).unwrap();
        let server = IpcServer::new(&socket_path, Arc::new(meter)).unwrap();
        assert!(socket_path.exists());
        drop(server);
    });

    assert!(!socket_path.exists());
}
