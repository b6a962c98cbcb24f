use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::error::{TocError, TocResult};
use crate::flap::frame::FrameKind;
use crate::flap::frame_io::FrameSink;


pub const DEFAULT_MAX_POINTS: i32 = 10;
pub const DEFAULT_RECOVER_INTERVAL: Duration = Duration::from_millis(2200);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateLimits {
    pub max_points: i32,
    /// time it takes to recover a single point
    pub recover_interval: Duration,
}
impl Default for RateLimits {
    fn default() -> Self {
        RateLimits {
            max_points: DEFAULT_MAX_POINTS,
            recover_interval: DEFAULT_RECOVER_INTERVAL,
        }
    }
}


#[derive(Debug)]
struct RateBudget {
    points: i32,
    last_send: Instant,
}
impl RateBudget {
    fn replenish(&mut self, now: Instant, limits: &RateLimits) {
        if self.points >= limits.max_points {
            return;
        }

        let recover_millis = limits.recover_interval.as_millis().max(1);
        let recovered = now.saturating_duration_since(self.last_send).as_millis() / recover_millis;
        let recovered = i32::try_from(recovered).unwrap_or(i32::MAX);
        self.points = self.points.saturating_add(recovered).min(limits.max_points);
    }

    /// time to wait until a send can be paid for
    fn required_wait(&self, limits: &RateLimits) -> Option<Duration> {
        if self.points >= 1 {
            return None;
        }
        let missing = (1 - self.points as i64) as u32;
        Some(limits.recover_interval * missing)
    }
}


/// Gates every outbound frame through the server's flow control budget.
///
/// Each send costs at least one point, more if the local identity has been warned by other users.
///  Points recover over time. A caller that cannot pay for its send sleeps until it can - this
///  suspends only the calling task, and concurrent senders queue behind the budget lock, so frames
///  leave in the order their senders acquired the budget.
///
/// The budget outlives individual streams: the server keeps track per identity, not per connection.
pub struct RateLimitedSender {
    limits: RateLimits,
    budget: AsyncMutex<RateBudget>,
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    local_warning: AtomicU32,
}
impl Debug for RateLimitedSender {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RateLimitedSender{{{:?}, warning:{}}}", self.limits, self.local_warning())
    }
}

impl RateLimitedSender {
    pub fn new(limits: RateLimits) -> RateLimitedSender {
        RateLimitedSender {
            limits,
            budget: AsyncMutex::new(RateBudget {
                points: limits.max_points,
                last_send: Instant::now(),
            }),
            sink: Mutex::new(None),
            local_warning: AtomicU32::new(0),
        }
    }

    pub fn attach(&self, sink: Arc<dyn FrameSink>) {
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    pub fn detach(&self) {
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn current_sink(&self) -> TocResult<Arc<dyn FrameSink>> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(TocError::NotConnected)
    }

    pub fn local_warning(&self) -> u32 {
        self.local_warning.load(Ordering::Acquire)
    }

    /// The local identity's warning level in percent, as reported by the server
    pub fn set_local_warning(&self, warning: u32) {
        self.local_warning.store(warning, Ordering::Release);
    }

    fn send_cost(&self) -> i32 {
        let factor = (3 * self.local_warning() as i64) / 100;
        let cost = 1 + factor * factor;
        i32::try_from(cost).unwrap_or(i32::MAX)
    }

    /// Sends a text command as a data frame. Commands are NUL terminated on the wire.
    pub async fn send_command(&self, command: &str) -> TocResult<()> {
        trace!("sending command {:?}", command);
        let mut payload = Vec::with_capacity(command.len() + 1);
        payload.extend_from_slice(command.as_bytes());
        payload.push(0);
        self.send_frame(FrameKind::Data, &payload).await
    }

    pub async fn send_frame(&self, kind: FrameKind, payload: &[u8]) -> TocResult<()> {
        let mut budget = self.budget.lock().await;
        budget.replenish(Instant::now(), &self.limits);

        if let Some(wait) = budget.required_wait(&self.limits) {
            debug!(points = budget.points, "rate limit reached - delaying send by {:?}", wait);
            sleep(wait).await;
            budget.points = 1;
        }

        // fetched after a potential delay: the stream may have changed in the meantime
        let sink = self.current_sink()?;
        sink.write_frame(kind, payload).await?;

        budget.points = budget.points.saturating_sub(self.send_cost());
        budget.last_send = Instant::now();
        trace!(points = budget.points, "remaining rate budget");
        Ok(())
    }
}
