//! Implements an asynchronous heartbeat

use std::{task::Poll, time::Duration};

use futures_util::Stream;
use pin_project_lite::pin_project;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

pin_project! {
    /// A wrapper over an `Option<IntervalStream>` which will never tick ready if the underlying
    /// `Interval` is `None`
    #[derive(Debug)]
    pub struct HeartBeat {
        #[pin]
        interval: Option<IntervalStream>
    }
}

impl HeartBeat {
    /// A [`HeartBeat`] that will never yield `Poll::Ready(_)` with `StreamExt::next()`
    pub fn never() -> Self {
        Self { interval: None }
    }

    /// Ticks every `period`, the first tick is one `period` from now
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: Some(IntervalStream::new(interval)),
        }
    }

    /// Heartbeats go out at half the negotiated interval, 0 disables them
    pub fn for_negotiated(heartbeat_secs: u16) -> Self {
        match heartbeat_secs {
            0 => Self::never(),
            secs => Self::new(Duration::from_millis(u64::from(secs) * 500)),
        }
    }
}

impl Stream for HeartBeat {
    type Item = Instant;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.project();
        match this.interval.as_pin_mut() {
            Some(stream) => stream.poll_next(cx),
            None => Poll::Pending,
        }
    }
}
