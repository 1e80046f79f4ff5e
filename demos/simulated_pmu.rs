//! Simulated PMU - drives the host engine against an in-process fake board.
//!
//! This example demonstrates:
//! - Starting a link with the builder
//! - Bring-up with `initialize`
//! - Status reports, RTC and watchdog through the device helpers
//! - Handling a PMU-initiated shutdown request
//!
//! ```text
//! RUST_LOG=pcat_pmu=debug cargo run --example simulated_pmu
//! ```
//!
//! On a real board, replace the duplex pair with
//! `SerialPort::open("/dev/ttyS4")` after setting the line to 115200 8N1
//! with `stty`.

use std::time::Duration;

use pcat_pmu::codec::{DateTime, PayloadCodec, StatusReport};
use pcat_pmu::device::{PowerControl, Rtc, StatusLed, StatusMonitor, Watchdog};
use pcat_pmu::protocol::{address, encode_frame, reply_code, Event, Frame, FrameBuffer};
use pcat_pmu::{Command, Pmu};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (host, board) = duplex(4096);
    tokio::spawn(run_board(board));

    let pmu = Pmu::builder()
        .reply_timeout(Duration::from_millis(500))
        .start(host);

    let info = pmu.initialize().await;
    println!(
        "PMU hardware {}, firmware {}",
        info.hardware_version.as_deref().unwrap_or("?"),
        info.firmware_version.as_deref().unwrap_or("?")
    );

    let status = StatusMonitor::attach(&pmu);
    let rtc = Rtc::attach(&pmu);
    let mut power = PowerControl::attach(&pmu);
    let led = StatusLed::new(pmu.clone());
    let mut watchdog = Watchdog::new(pmu.clone());

    if let Some(report) = status.wait_for_report(Duration::from_secs(3)).await {
        println!(
            "battery {} mV, charger {} mV, {} °C",
            report.battery_millivolt,
            report.charger_millivolt,
            report.temperature_celsius()
        );
    }
    if let (Some(capacity), Some(state)) = (status.battery_capacity(), status.battery_status()) {
        println!("battery {capacity}% ({state:?})");
    }
    match rtc.read_time() {
        Ok(time) => println!("PMU clock {time}"),
        Err(e) => println!("PMU clock unavailable: {e}"),
    }

    led.blink(100, 900, 0).await?;
    watchdog.set_timeout(30).await?;
    watchdog.start().await?;

    let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = heartbeat.tick() => watchdog.ping().await?,
            reason = power.next_request() => {
                match reason {
                    Some(reason) => println!("PMU asks to shut down: {}", reason.describe()),
                    None => println!("link closed"),
                }
                break;
            }
        }
    }

    watchdog.stop().await?;
    led.off().await?;
    pmu.shutdown();
    Ok(())
}

/// Fake board: answers requests, reports status every second and asks for a
/// shutdown after a few reports.
async fn run_board(stream: DuplexStream) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);

    tokio::spawn(async move {
        let mut buffer = FrameBuffer::new();
        let mut buf = [0u8; 256];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            let mut chunk = &buf[..n];
            while !chunk.is_empty() {
                let feed = buffer.push(chunk);
                chunk = &chunk[feed.consumed..];
                for event in feed.events {
                    if let Event::Frame(frame) = event {
                        if let Some(reply) = answer(&frame) {
                            if tx.send(reply).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    });

    let mut ticks = tokio::time::interval(Duration::from_secs(1));
    let mut frame_id: u16 = 0x8000;
    for n in 0u16.. {
        let outgoing = tokio::select! {
            reply = rx.recv() => match reply {
                Some(reply) => reply,
                None => return,
            },
            _ = ticks.tick() => {
                frame_id = frame_id.wrapping_add(1);
                if n >= 4 {
                    board_frame(frame_id, Command::PmuRequestShutdown, &[0x00], true)
                } else {
                    let report = StatusReport {
                        battery_millivolt: 4000 - n * 10,
                        charger_millivolt: 5100,
                        time: DateTime {
                            year: 2024,
                            month: 6,
                            day: 1,
                            hour: 12,
                            minute: 0,
                            second: n as u8,
                        },
                        temperature_raw: 72,
                        ..Default::default()
                    };
                    board_frame(frame_id, Command::StatusReport, &PayloadCodec::encode(&report), false)
                }
            }
        };
        if writer.write_all(&outgoing).await.is_err() {
            return;
        }
        // Keep board frames apart on the wire.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn answer(frame: &Frame) -> Option<Vec<u8>> {
    if !frame.need_ack() {
        return None;
    }
    let body: &[u8] = match Command::from_code(frame.command()) {
        Some(Command::HardwareVersionGet) => b"PCAT-SIM\0",
        Some(Command::FirmwareVersionGet) => b"0.1.0-sim\0",
        _ => b"",
    };
    encode_frame(
        address::PMU,
        address::HOST,
        frame.frame_id(),
        reply_code(frame.command()),
        body,
        false,
    )
    .ok()
}

fn board_frame(frame_id: u16, command: Command, body: &[u8], need_ack: bool) -> Vec<u8> {
    encode_frame(address::PMU, address::HOST, frame_id, command.code(), body, need_ack)
        .unwrap_or_default()
}
