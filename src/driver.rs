//! Native timer driver.
//!
//! Runs an offline engine in real time from a tokio interval: every period
//! renders one block, which also polls the engine's timers, and hands the
//! block to a channel for playback or capture.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::Engine;

/// Blocks buffered between the driver and a slow consumer.
const CHANNEL_DEPTH: usize = 64;

/// Spawn the driver on the current tokio runtime. The task ends when the
/// receiver is dropped or the engine lock is poisoned.
pub fn spawn(engine: Arc<Mutex<Engine>>, period: Duration) -> (JoinHandle<()>, mpsc::Receiver<Vec<f32>>) {
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
        loop {
            interval.tick().await;
            let block = match engine.lock() {
                Ok(mut engine) => engine.render(period.as_secs_f64()),
                Err(_) => {
                    log::error!("engine lock poisoned, driver exiting");
                    break;
                }
            };
            if tx.send(block).await.is_err() {
                log::debug!("driver output closed");
                break;
            }
        }
    });
    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::AudioGraph;
    use crate::instrument::InstrumentId;

    #[tokio::test]
    async fn driver_advances_the_transport() {
        let mut engine = Engine::offline(EngineConfig {
            sample_rate: 8000.0,
            seed: Some(5),
            ..EngineConfig::default()
        })
        .unwrap();
        engine.toggle_step(InstrumentId::Bass, 11, 0);
        engine.start_sequencer();
        let engine = Arc::new(Mutex::new(engine));

        let (handle, mut rx) = spawn(Arc::clone(&engine), Duration::from_millis(5));
        let mut frames = 0;
        for _ in 0..10 {
            let block = rx.recv().await.expect("driver stopped early");
            frames += block.len();
        }
        drop(rx);
        handle.await.unwrap();

        assert_eq!(frames, 400, "ten blocks of 5 ms at 8 kHz");
        let engine = engine.lock().unwrap();
        assert!(engine.graph().current_time() >= 0.05);
        assert!(engine.highlighted().is_some(), "first step highlighted");
    }
}
