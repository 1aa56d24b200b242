//! Async sampling loop for one detector context.

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use super::Detector;
use crate::error::log_protocol_error;
use crate::protocol::Envelope;

/// Drive `detector` until its inbox closes, then return it
///
/// One select loop serves three sources:
/// - coordinator messages, applied in arrival order
/// - the sampling interval; a late tick is skipped, never queued, so window
///   processing cannot overlap
/// - the fade tick, only while a ramp is in flight
pub async fn run_detector(mut detector: Detector, mut inbox: mpsc::Receiver<Envelope>) -> Detector {
    if let Err(err) = detector.attach() {
        log_protocol_error(&err, "run_detector");
    }

    let mut sampling = time::interval(detector.config().sample_interval());
    sampling.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; wait one full period instead
    sampling.reset();

    let mut fade = time::interval(detector.fade_tick());
    fade.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            envelope = inbox.recv() => match envelope {
                Some(envelope) => detector.handle(envelope),
                None => break,
            },
            _ = sampling.tick() => {
                detector.on_sample_tick();
            }
            _ = fade.tick(), if detector.is_fading() => {
                detector.tick_fade();
            }
        }
    }

    tracing::info!("[Detector] {} inbox closed, shutting down", detector.id());
    detector.shutdown();
    detector
}
