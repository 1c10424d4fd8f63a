//! Console sessions against the simulated controller

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};
use micro3d::shell::{Flow, Input, Session};
use micro3d_communication::{
    ExchangeCoordinator, SerialChannel, Stage, VirtualDevice, VirtualPort, VirtualStage,
};
use micro3d_core::Position;
use micro3d_imaging::Camera;
use micro3d_settings::Config;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

struct StripeCamera;

#[async_trait]
impl Camera for StripeCamera {
    async fn capture(&mut self, _warmup: Duration) -> micro3d_core::Result<DynamicImage> {
        let frame = GrayImage::from_fn(8, 8, |x, _| Luma([if x % 2 == 0 { 40 } else { 200 }]));
        Ok(DynamicImage::ImageLuma8(frame))
    }
}

/// Camera that takes its warmup in real time
struct SlowCamera;

#[async_trait]
impl Camera for SlowCamera {
    async fn capture(&mut self, warmup: Duration) -> micro3d_core::Result<DynamicImage> {
        tokio::time::sleep(warmup).await;
        StripeCamera.capture(warmup).await
    }
}

fn quick_config(output: &TempDir) -> Config {
    let mut config = Config::default();
    config.timeouts.command_ms = 500;
    config.timeouts.home_ms = 500;
    config.timeouts.position_ms = 500;
    config.timeouts.shutdown_ms = 200;
    config.scan.output_dir = output.path().to_path_buf();
    config.scan.curve_order = 1;
    config.scan.stack_count = 3;
    config.camera.warmup_ms = 0;
    config
}

async fn session_with(
    device: impl VirtualDevice + 'static,
    config: &Config,
    camera: Option<Box<dyn Camera>>,
) -> (Session, VirtualPort) {
    let port = VirtualPort::new("sim", device);
    let channel = SerialChannel::from_port(Box::new(port.clone()), 32).unwrap();
    let coordinator = ExchangeCoordinator::new(channel).unwrap();
    let stage = Stage::connect(
        coordinator,
        config.machine.to_step_sizes(),
        config.timeouts.to_stage_timeouts(),
    )
    .await
    .unwrap();
    (Session::new(stage, config, camera), port)
}

fn count(port: &VirtualPort, command: &str) -> usize {
    port.received_lines().iter().filter(|l| *l == command).count()
}

#[tokio::test]
async fn test_triggers_move_and_report() {
    let dir = TempDir::new().unwrap();
    let config = quick_config(&dir);
    let start = VirtualStage::new().with_position(Position::new(10.0, 10.0, 2.0));
    let (mut session, port) = session_with(start, &config, None).await;

    let mut out = Vec::new();
    for line in ["q", "W", "e", "getpos"] {
        let flow = session.handle_line(line, &mut out).await.unwrap();
        assert_eq!(flow, Flow::Continue);
    }
    assert_eq!(session.handle_line("exit", &mut out).await.unwrap(), Flow::Exit);

    let position = session.stage().position();
    assert!((position.x - 10.1).abs() < 1e-9);
    assert!((position.y - 10.1).abs() < 1e-9);
    assert!((position.z - 2.04).abs() < 1e-9);

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("Position X:10.10 Y:10.10 Z:2.04"));
    assert!(port.received_lines().contains(&"G1 X10.10 Y10.00 Z2.00".to_string()));
    session.teardown().await;
}

#[tokio::test]
async fn test_bad_input_is_reported_and_loop_continues() {
    let dir = TempDir::new().unwrap();
    let config = quick_config(&dir);
    let (mut session, port) = session_with(VirtualStage::new(), &config, None).await;

    let mut out = Vec::new();
    assert_eq!(session.handle_line("jump", &mut out).await.unwrap(), Flow::Continue);
    assert_eq!(session.handle_line("focus", &mut out).await.unwrap(), Flow::Continue);
    assert_eq!(session.handle_line("   ", &mut out).await.unwrap(), Flow::Continue);

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("jump"));
    assert!(printed.contains("no camera configured"));
    // only the startup position query reached the controller
    assert_eq!(port.received_lines(), vec!["M114".to_string()]);
    session.teardown().await;
}

#[tokio::test]
async fn test_timeout_keeps_session_alive() {
    let dir = TempDir::new().unwrap();
    let config = quick_config(&dir);
    // answers position queries, never acknowledges moves
    let stalled = |line: &str| match line {
        "M114" => vec!["X:5.00 Y:5.00 Z:1.00 E:0.00".to_string(), "ok".to_string()],
        line if line.starts_with("G1") => Vec::new(),
        _ => vec!["ok".to_string()],
    };
    let (mut session, port) = session_with(stalled, &config, None).await;
    let before = session.stage().position();

    let mut out = Vec::new();
    assert_eq!(session.handle_line("a", &mut out).await.unwrap(), Flow::Continue);
    assert_eq!(session.stage().position(), before);
    assert_eq!(session.handle_line("getpos", &mut out).await.unwrap(), Flow::Continue);

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("Error: Timed out"), "{printed}");
    assert!(printed.contains("Position X:5.00 Y:5.00 Z:1.00"), "{printed}");
    assert_eq!(count(&port, "M114"), 2);
    session.teardown().await;
}

#[tokio::test]
async fn test_run_tears_down_once_on_interrupt() {
    let dir = TempDir::new().unwrap();
    let config = quick_config(&dir);
    let (mut session, port) = session_with(VirtualStage::new(), &config, None).await;

    let (tx, rx) = mpsc::channel(8);
    tx.send(Input::Line("d".to_string())).await.unwrap();
    tx.send(Input::Interrupt).await.unwrap();
    tx.send(Input::Line("e".to_string())).await.unwrap();

    let mut out = Vec::new();
    session.run(rx, &mut out).await.unwrap();
    session.teardown().await;

    assert_eq!(count(&port, "M84"), 1);
    // the move queued before the interrupt finished, the one after never ran
    let moves: Vec<String> = port
        .received_lines()
        .into_iter()
        .filter(|l| l.starts_with("G1"))
        .collect();
    assert_eq!(moves, vec!["G1 X0.00 Y0.00 Z-0.04".to_string()]);
    assert!(port.is_closed());
}

#[tokio::test]
async fn test_run_ends_at_end_of_input() {
    let dir = TempDir::new().unwrap();
    let config = quick_config(&dir);
    let (mut session, port) = session_with(VirtualStage::new(), &config, None).await;

    let (tx, rx) = mpsc::channel(8);
    tx.send(Input::Line("home".to_string())).await.unwrap();
    tx.send(Input::Eof).await.unwrap();

    let mut out = Vec::new();
    session.run(rx, &mut out).await.unwrap();
    assert_eq!(count(&port, "G28"), 1);
    assert_eq!(count(&port, "M84"), 1);
}

#[tokio::test]
async fn test_imaging_words_write_files() {
    let dir = TempDir::new().unwrap();
    let config = quick_config(&dir);
    let start = VirtualStage::new().with_position(Position::new(20.0, 20.0, 1.0));
    let (mut session, _port) = session_with(start, &config, Some(Box::new(StripeCamera))).await;

    let mut out = Vec::new();
    session.handle_line("grid", &mut out).await.unwrap();
    session.handle_line("stack", &mut out).await.unwrap();
    session.teardown().await;

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("Captured 16 frames"), "{printed}");
    assert!(printed.contains("Captured 3 stack frames"), "{printed}");

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.iter().filter(|n| n.starts_with("grid_")).count(), 16);
    assert_eq!(names.iter().filter(|n| n.starts_with("stack_")).count(), 3);
    assert!(names.contains(&"capture.pto".to_string()));
}

#[tokio::test]
async fn test_stop_request_interrupts_running_stack() {
    let dir = TempDir::new().unwrap();
    let mut config = quick_config(&dir);
    config.scan.stack_count = 20;
    config.camera.warmup_ms = 50;
    let (mut session, port) =
        session_with(VirtualStage::new(), &config, Some(Box::new(SlowCamera))).await;

    let stop = session.stop_signal();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        stop.request();
    });

    // the sender stays open, so only the stop can end the loop
    let (tx, rx) = mpsc::channel(8);
    tx.send(Input::Line("stack".to_string())).await.unwrap();

    let mut out = Vec::new();
    session.run(rx, &mut out).await.unwrap();

    let moves = port
        .received_lines()
        .into_iter()
        .filter(|l| l.starts_with("G1"))
        .count();
    assert!(moves >= 1 && moves < 20, "{moves} moves sent");
    assert_eq!(count(&port, "M84"), 1);
    assert!(port.is_closed());
    assert!(String::from_utf8(out).unwrap().contains("Interrupted"));
    drop(tx);
}
