use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::geo::{PositionSample, SpeedWindow};
use crate::observability::metrics::Metrics;
use crate::realtime::protocol::Outbound;

/// Streams smoothed positions for `order_id` until aborted or the outbound
/// queue closes. Every call starts with an empty speed window.
pub fn spawn(
    order_id: String,
    positions: broadcast::Receiver<PositionSample>,
    outbound: mpsc::Sender<Outbound>,
    window: usize,
    metrics: Metrics,
) -> JoinHandle<()> {
    tokio::spawn(stream_positions(order_id, positions, outbound, window, metrics))
}

async fn stream_positions(
    order_id: String,
    positions: broadcast::Receiver<PositionSample>,
    outbound: mpsc::Sender<Outbound>,
    window: usize,
    metrics: Metrics,
) {
    info!(order_id = %order_id, "position stream started");

    let mut speeds = SpeedWindow::new(window);
    let mut samples = BroadcastStream::new(positions);

    while let Some(item) = samples.next().await {
        let sample = match item {
            Ok(sample) => sample,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(skipped, "position stream lagged");
                continue;
            }
        };

        let event = Outbound::Location {
            order_id: order_id.clone(),
            lat: sample.lat,
            lng: sample.lng,
            speed: speeds.observe(&sample),
        };
        metrics.location_samples_total.inc();

        match outbound.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("outbound queue full; dropping position")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }

    debug!(order_id = %order_id, "position stream ended");
}
