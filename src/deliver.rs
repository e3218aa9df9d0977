//! Ordered fan-out of new announcements to every configured sink.
use std::time::Duration;
use tracing::warn;

use crate::model::Announcement;
use crate::sinks::Sink;

/// Pause between consecutive announcement sends, to stay under the chat APIs'
/// rate limits. Not applied between sinks for the same announcement.
pub const SEND_DELAY: Duration = Duration::from_secs(1);

/// Deliver every announcement to every sink, oldest first.
///
/// Announcements are sent in ascending schedule-time order (missing times
/// first, ties keep fetched order), but the returned vector lines up with the
/// *input* slice: `result[i]` is true only when `announcements[i]` reached
/// every sink. A failure for one (announcement, sink) pair is logged and the
/// remaining sinks and announcements still run.
pub async fn deliver_all(
    sinks: &[Box<dyn Sink>],
    announcements: &[Announcement],
    delay: Duration,
) -> Vec<bool> {
    let mut order: Vec<usize> = (0..announcements.len()).collect();
    order.sort_by(|&a, &b| announcements[a].sort_key().cmp(announcements[b].sort_key()));

    let mut results = vec![false; announcements.len()];
    for (position, &idx) in order.iter().enumerate() {
        if position > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let announcement = &announcements[idx];
        let mut ok = true;
        for sink in sinks {
            if let Err(err) = sink.deliver(announcement).await {
                warn!(sink = sink.name(), id = %announcement.id, ?err, "delivery failed");
                ok = false;
            }
        }
        results[idx] = ok;
    }
    results
}
