//! Common utilities

use std::{future::Future, pin::Pin, task::Poll, time::Duration};

use tokio::time::{Instant, Sleep};

#[derive(Debug)]
pub(crate) enum Running {
    Continue,
    Stop,
}

/// Resolves once no frame has been seen for `duration`
#[derive(Debug)]
pub(crate) struct IdleTimeout {
    delay: Pin<Box<Sleep>>,
    duration: Duration,
}

impl IdleTimeout {
    pub fn new(duration: Duration) -> Self {
        let delay = Box::pin(tokio::time::sleep(duration));
        Self { delay, duration }
    }

    pub fn reset(&mut self) {
        let next = Instant::now() + self.duration;
        self.delay.as_mut().reset(next);
    }
}

impl Future for IdleTimeout {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        self.delay.as_mut().poll(cx)
    }
}
