// src/main.rs
// Entry point for the JetBot core: probes the motor hardware, then runs
// the motion HTTP surface, the WebSocket telemetry fan-out and the frame
// pump concurrently until interrupted.

use log::{error, info, warn};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use jetbot_core::drive::MotionCommand;
use jetbot_core::motor::{probe_backend, SimulatedBus};
use jetbot_core::scan::ScanOrchestrator;
use jetbot_core::telemetry::{stream_frames, FrameSource, JpegFrame};
use jetbot_core::{
    api, DriveController, HttpDetector, JetbotConfig, JetbotError, MotorActuator, PoseTracker,
    TelemetryServer,
};

/// Placeholder camera for simulated mode: emits a fixed frame at capture
/// time so the distribution path can be exercised without hardware.
struct SyntheticCamera {
    frame: Vec<u8>,
}

#[async_trait]
impl FrameSource for SyntheticCamera {
    async fn next_frame(&mut self) -> Result<JpegFrame, JetbotError> {
        Ok(JpegFrame {
            bytes: self.frame.clone(),
            captured_at: SystemTime::now(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    info!("starting JetBot core...");

    let config = match std::env::args().nth(1) {
        Some(path) => JetbotConfig::load(&path)?,
        None => JetbotConfig::default(),
    };

    // Hardware probe. No supported backend is a configuration error the
    // process must not survive.
    let mut bus = if config.motor.simulated {
        warn!("running against the simulated I2C bus");
        Box::new(SimulatedBus::new())
    } else {
        return Err(JetbotError::Config(
            "no physical I2C transport wired in this build; set motor.simulated".into(),
        )
        .into());
    };
    let backend = probe_backend(bus.as_mut(), config.motor.i2c_bus)?;
    let actuator = Arc::new(Mutex::new(MotorActuator::new(bus, backend, &config.motor)));

    let pose = PoseTracker::new();
    let controller = Arc::new(DriveController::new(
        Arc::clone(&actuator),
        pose,
        config.drive.clone(),
    ));
    let detector = Arc::new(HttpDetector::new(config.detector.base_url.clone()));
    let scanner = Arc::new(ScanOrchestrator::new(
        Arc::clone(&controller),
        detector,
        config.scan.clone(),
    ));
    let echo = Arc::new(Mutex::new(None));

    // Inbound WebSocket control messages funnel through one channel so the
    // controller keeps a single writer.
    let (command_tx, mut command_rx) = tokio::sync::mpsc::channel::<MotionCommand>(16);
    let server = TelemetryServer::new(command_tx);

    {
        let controller = Arc::clone(&controller);
        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                info!("inbound control: {command:?}");
                let result = match command {
                    MotionCommand::Forward { speed, duration } => {
                        controller.forward(speed, duration).await.map(|_| ())
                    }
                    MotionCommand::Backward { speed, duration } => {
                        controller.backward(speed, duration).await.map(|_| ())
                    }
                    MotionCommand::Rotate { angle } => {
                        controller.rotate(angle).await.map(|_| ())
                    }
                    MotionCommand::Stop => {
                        controller.stop();
                        Ok(())
                    }
                    MotionCommand::Scan { words, orientation } => scanner
                        .scan(&words, orientation)
                        .await
                        .map(|report| info!("scan found {} items", report.items.len())),
                };
                if let Err(e) = result {
                    error!("inbound command failed: {e}");
                }
            }
        });
    }

    let ws_addr = format!("{}:{}", config.telemetry.host, config.telemetry.port);
    let ws_listener = tokio::net::TcpListener::bind(&ws_addr).await?;
    info!("telemetry server listening on ws://{ws_addr}");
    tokio::spawn(Arc::clone(&server).run(ws_listener));

    let api_addr = format!("{}:{}", config.api.host, config.api.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("motion API listening on http://{api_addr}");
    let api_state = Arc::new(api::ApiState {
        controller: Arc::clone(&controller),
        scanner,
        echo: Arc::clone(&echo),
    });
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_state, api_listener).await {
            error!("motion API exited: {e}");
        }
    });

    let camera = SyntheticCamera {
        // Smallest JPEG markers; a real camera source replaces this.
        frame: vec![0xff, 0xd8, 0xff, 0xd9],
    };
    tokio::spawn(stream_frames(
        camera,
        Arc::clone(&controller),
        echo,
        server,
        config.telemetry.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutting down...");
    controller.stop();
    actuator
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .release();
    info!("shutdown complete");
    Ok(())
}
