//! Deterministic in-memory transport for session-layer tests
//!
//! `ScriptedTransport` plays the device side of the link: tests program
//! which notification frames answer which command opcodes, what each
//! characteristic read returns, and which operations must fail. The
//! paired [`Script`] handle keeps control of the script and exposes
//! counters after the transport has been boxed into the session manager.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use boks_core::Frame;

use crate::{Characteristic, Error, NotificationSink, Result, Transport};

#[derive(Default)]
struct State {
    connected: bool,
    sink: Option<NotificationSink>,
    writes: Vec<(Characteristic, Vec<u8>)>,
    replies: HashMap<u8, VecDeque<Vec<Vec<u8>>>>,
    reads: HashMap<Characteristic, Vec<u8>>,
    fail_connects: u32,
    fail_writes: u32,
    connects: u32,
    disconnects: u32,
}

/// Test-side handle to a [`ScriptedTransport`]
#[derive(Clone)]
pub struct Script {
    state: Arc<Mutex<State>>,
}

/// In-memory transport driven by a [`Script`]
pub struct ScriptedTransport {
    state: Arc<Mutex<State>>,
}

impl ScriptedTransport {
    /// Create a transport plus the script handle controlling it
    pub fn new() -> (Self, Script) {
        let state = Arc::new(Mutex::new(State::default()));
        (
            Self { state: state.clone() },
            Script { state },
        )
    }
}

impl Script {
    /// Queue a batch of notification frames delivered when a command with
    /// this opcode is next written. Each matching write consumes one batch.
    pub fn reply_to(&self, opcode: u8, frames: Vec<Vec<u8>>) {
        self.state
            .lock()
            .replies
            .entry(opcode)
            .or_default()
            .push_back(frames);
    }

    /// Set the sticky value a characteristic read returns
    pub fn set_read(&self, characteristic: Characteristic, value: Vec<u8>) {
        self.state.lock().reads.insert(characteristic, value);
    }

    /// Fail the next `n` connect attempts
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().fail_connects = n;
    }

    /// Fail the next `n` writes with a write fault
    pub fn fail_next_writes(&self, n: u32) {
        self.state.lock().fail_writes = n;
    }

    /// Push an unsolicited notification frame through the sink
    pub fn push_notification(&self, frame: &[u8]) {
        let sink = self.state.lock().sink.clone();
        if let Some(sink) = sink {
            sink(frame);
        }
    }

    /// Number of physical connects performed
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }

    /// Number of physical disconnects performed
    pub fn disconnect_count(&self) -> u32 {
        self.state.lock().disconnects
    }

    /// Whether the link is currently up
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// All writes recorded so far
    pub fn writes(&self) -> Vec<(Characteristic, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    /// Command opcodes written so far, in order
    pub fn command_opcodes(&self) -> Vec<u8> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(c, _)| *c == Characteristic::Command)
            .filter_map(|(_, data)| data.first().copied())
            .collect()
    }
}

/// Encode a complete frame for test scripts
pub fn frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    Frame::new(opcode, payload.to_vec())
        .encode()
        .expect("test payload fits a frame")
        .to_vec()
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(Error::ConnectFailed("scripted failure".into()));
        }
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.sink = None;
        state.disconnects += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn write(&mut self, characteristic: Characteristic, data: &[u8]) -> Result<()> {
        let (sink, batch) = {
            let mut state = self.state.lock();

            if !state.connected {
                return Err(Error::NotConnected);
            }
            if state.fail_writes > 0 {
                state.fail_writes -= 1;
                return Err(Error::WriteFailed {
                    characteristic,
                    detail: "scripted failure".into(),
                });
            }

            state.writes.push((characteristic, data.to_vec()));
            trace!(?characteristic, data = hex_dump(data), "scripted write");

            let batch = if characteristic == Characteristic::Command {
                data.first()
                    .and_then(|op| state.replies.get_mut(op))
                    .and_then(VecDeque::pop_front)
            } else {
                None
            };

            (state.sink.clone(), batch)
        };

        // Deliver replies outside the state lock, as a real adapter would
        if let (Some(sink), Some(frames)) = (sink, batch) {
            for frame in frames {
                sink(&frame);
            }
        }

        Ok(())
    }

    async fn read(&mut self, characteristic: Characteristic) -> Result<Vec<u8>> {
        let state = self.state.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state
            .reads
            .get(&characteristic)
            .cloned()
            .ok_or(Error::ReadFailed {
                characteristic,
                detail: "no scripted value".into(),
            })
    }

    async fn subscribe(&mut self, sink: NotificationSink) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.sink = Some(sink);
        Ok(())
    }

    fn peer(&self) -> String {
        "AA:BB:CC:DD:EE:FF".into()
    }
}

fn hex_dump(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_reply_consumed_per_write() {
        let (mut transport, script) = ScriptedTransport::new();
        script.reply_to(0x07, vec![frame(0x79, &[0x00, 0x03])]);

        transport.connect().await.unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_log = received.clone();
        transport
            .subscribe(Arc::new(move |data: &[u8]| {
                sink_log.lock().push(data.to_vec());
            }))
            .await
            .unwrap();

        transport
            .write(Characteristic::Command, &frame(0x07, &[]))
            .await
            .unwrap();

        assert_eq!(received.lock().len(), 1);

        // Second write finds no batch left
        transport
            .write(Characteristic::Command, &frame(0x07, &[]))
            .await
            .unwrap();
        assert_eq!(received.lock().len(), 1);
        assert_eq!(script.command_opcodes(), vec![0x07, 0x07]);
    }

    #[tokio::test]
    async fn test_write_failure_injection() {
        let (mut transport, script) = ScriptedTransport::new();
        transport.connect().await.unwrap();
        script.fail_next_writes(1);

        let err = transport
            .write(Characteristic::Command, &frame(0x02, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WriteFailed { .. }));

        transport
            .write(Characteristic::Command, &frame(0x02, &[]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_disconnected_transport_rejects_io() {
        let (mut transport, _script) = ScriptedTransport::new();

        assert!(matches!(
            transport.write(Characteristic::Command, &[0x01]).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            transport.read(Characteristic::BatteryLevel).await,
            Err(Error::NotConnected)
        ));
    }
}
