use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{TocError, TocResult};
use crate::flap::frame::FrameKind;
use crate::flap::frame_io::FrameSink;
use crate::util::observers::Observer;


/// Observer that keeps a copy of every event it receives
pub struct RecordingObserver<E> {
    events: Mutex<Vec<E>>,
}
impl <E: Clone + Send> RecordingObserver<E> {
    pub fn new() -> Arc<RecordingObserver<E>> {
        Arc::new(RecordingObserver {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<E> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
impl <E: Clone + Send> Observer<E> for RecordingObserver<E> {
    fn on_event(&self, event: &E) -> anyhow::Result<()> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
        Ok(())
    }
}


/// [FrameSink] that records what would have been written instead of writing it
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<(FrameKind, Vec<u8>)>>,
    fail: Mutex<bool>,
}
impl RecordingSink {
    pub fn new() -> Arc<RecordingSink> {
        Default::default()
    }

    pub fn frames(&self) -> Vec<(FrameKind, Vec<u8>)> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// the payloads of all data frames as text, without their NUL terminator
    pub fn commands(&self) -> Vec<String> {
        self.frames().into_iter()
            .filter(|(kind, _)| *kind == FrameKind::Data)
            .map(|(_, payload)| String::from_utf8_lossy(payload.strip_suffix(b"\0").unwrap_or(&payload)).to_string())
            .collect()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }
}
#[async_trait]
impl FrameSink for RecordingSink {
    async fn write_frame(&self, kind: FrameKind, payload: &[u8]) -> TocResult<()> {
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(TocError::ConnectionClosed);
        }
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).push((kind, payload.to_vec()));
        Ok(())
    }
}


/// Polls `condition` until it holds, panicking after five seconds. This uses real time, so it
///  is meant for tests that talk to real sockets.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition did not become true within five seconds");
}
