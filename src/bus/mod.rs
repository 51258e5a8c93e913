//! # Bus Module
//!
//! Ties the frame codec, the ERD decoder and a transport together.
//!
//! This module handles:
//! - The reception loop that validates and decodes incoming frames
//! - Serializing command writes against each other and against reads
//! - Per-connection key, error and frame counters

pub mod state;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::appliance::{ApplianceCommand, BusRequest};
use crate::erd::command::{CommandEncoder, CommandStyle};
use crate::erd::decode::{decode_message, DecodedMessage};
use crate::erd::library::ErdLookup;
use crate::erd::schema::ErdId;
use crate::error::Result;
use crate::ipb::decoder::FrameReader;
use crate::ipb::encoder::FrameEncoder;
use crate::ipb::protocol::Frame;
use crate::serial::Transport;
pub use state::ConnectionState;

/// A validated frame and the outcome of decoding it
#[derive(Debug)]
pub struct ReceivedFrame {
    /// The frame as it arrived
    pub frame: Frame,

    /// `Ok(None)` for message types the decoder does not know;
    /// `Err(SchemaNotFound)` and decode errors are left to the caller
    pub decoded: Result<Option<DecodedMessage>>,
}

/// Reception loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Waiting for a header start; nothing aligned yet
    Resyncing,
    /// Last frame validated, stream aligned
    Reading,
}

/// Shared handle to one IPB connection
///
/// Clones share the transport, dictionary and counters. Writes hold the
/// transport lock for the whole write + flush; the reception loop holds it
/// for one frame attempt at a time.
pub struct IpbBus<T: Transport> {
    transport: Arc<Mutex<T>>,
    state: Arc<Mutex<ConnectionState>>,
    commands: Arc<Mutex<CommandEncoder>>,
    erds: Arc<dyn ErdLookup>,
}

impl<T: Transport> Clone for IpbBus<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            commands: Arc::clone(&self.commands),
            erds: Arc::clone(&self.erds),
        }
    }
}

impl<T: Transport> IpbBus<T> {
    /// Create a bus over `transport`
    ///
    /// # Arguments
    ///
    /// * `transport` - Open transport
    /// * `erds` - ERD dictionary used for decoding and command validation
    /// * `frames` - Encoder carrying addressing and sequence policy
    /// * `state` - Initial connection state
    pub fn new(transport: T, erds: Arc<dyn ErdLookup>, frames: FrameEncoder, state: ConnectionState) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            state: Arc::new(Mutex::new(state)),
            commands: Arc::new(Mutex::new(CommandEncoder::new(Arc::clone(&erds), frames))),
            erds,
        }
    }

    /// Write a complete frame and flush it
    pub async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        let mut transport = self.transport.lock().await;
        transport.write_all(frame).await?;
        transport.flush().await?;
        Ok(())
    }

    /// Validate, encode and send an ERD command
    ///
    /// Nothing is written when validation fails.
    pub async fn send_command(&self, erd: ErdId, value: &str, style: CommandStyle) -> Result<()> {
        let mut commands = self.commands.lock().await;
        let frame = {
            let mut state = self.state.lock().await;
            commands.build_command(erd, value, style, &mut state)?
        };
        self.send_frame(&frame).await
    }

    /// Send a read request for `erd`
    pub async fn send_read_request(&self, erd: ErdId) -> Result<()> {
        let mut commands = self.commands.lock().await;
        let frame = commands.build_read_request(erd)?;
        self.send_frame(&frame).await
    }

    /// Perform a high-level appliance action
    pub async fn send_appliance_command(&self, command: ApplianceCommand) -> Result<()> {
        info!("Sending {:?}", command);

        match command.request() {
            BusRequest::Command { erd, value, style } => self.send_command(erd, &value, style).await,
            BusRequest::Read(erd) => self.send_read_request(erd).await,
            BusRequest::StartPause => {
                let mut commands = self.commands.lock().await;
                let frame = commands.build_start_pause_request()?;
                self.send_frame(&frame).await
            }
        }
    }

    /// Ask the reception loop to stop after its current frame attempt
    pub async fn stop(&self) {
        self.state.lock().await.stop();
    }

    /// Snapshot of the connection counters
    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.clone()
    }

    /// Create the reception loop for this connection
    ///
    /// Only one loop may run per transport; two readers would split the
    /// byte stream between them.
    ///
    /// # Arguments
    ///
    /// * `reader` - Frame reader configured with the bus frame format
    /// * `read_timeout` - How long one frame attempt may hold the transport;
    ///   `None` waits indefinitely and starves writers on a silent line
    pub fn reception_loop(&self, reader: FrameReader, read_timeout: Option<Duration>) -> ReceptionLoop<T> {
        ReceptionLoop {
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            erds: Arc::clone(&self.erds),
            reader,
            read_timeout,
            phase: LoopPhase::Resyncing,
        }
    }
}

/// Long-running frame consumer for one transport
pub struct ReceptionLoop<T: Transport> {
    transport: Arc<Mutex<T>>,
    state: Arc<Mutex<ConnectionState>>,
    erds: Arc<dyn ErdLookup>,
    reader: FrameReader,
    read_timeout: Option<Duration>,
    phase: LoopPhase,
}

impl<T: Transport> ReceptionLoop<T> {
    /// Current phase
    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Run until stopped or the transport fails
    ///
    /// Every validated frame is passed to `handler` together with its
    /// decode result.
    ///
    /// # Errors
    ///
    /// Returns the transport error that ended the loop. Checksum and
    /// framing errors never end the loop.
    pub async fn run<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(ReceivedFrame) + Send,
    {
        info!("IPB reception loop started");

        while self.state.lock().await.is_alive() {
            if let Some(received) = self.step().await? {
                handler(received);
            }
        }

        let state = self.state.lock().await;
        info!(
            "IPB reception loop stopped ({} frames, {} checksum errors)",
            state.frames_received(),
            state.error_count()
        );
        Ok(())
    }

    /// Make one frame attempt
    ///
    /// Returns `Ok(None)` when the attempt ended in a resync or timed out
    /// on an idle line.
    pub async fn step(&mut self) -> Result<Option<ReceivedFrame>> {
        let outcome = {
            let mut transport = self.transport.lock().await;
            let attempt = self.reader.read_frame(&mut *transport);

            match self.read_timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(outcome) => outcome,
                    // Partial bytes stay buffered in the reader
                    Err(_) => return Ok(None),
                },
                None => attempt.await,
            }
        };

        match outcome {
            Ok(Some(frame)) => {
                self.phase = LoopPhase::Reading;
                self.state.lock().await.record_frame();
                debug!(
                    "Received frame type 0x{:02X} ({} payload bytes)",
                    frame.message_type,
                    frame.payload.len()
                );

                let decoded = decode_message(frame.message_type, &frame.payload, self.erds.as_ref());
                Ok(Some(ReceivedFrame { frame, decoded }))
            }
            Ok(None) => {
                self.phase = LoopPhase::Resyncing;
                Ok(None)
            }
            Err(e) if e.is_recoverable() => {
                self.phase = LoopPhase::Resyncing;
                let errors = self.state.lock().await.record_checksum_error();
                warn!("Resynchronizing after {} (total errors: {})", e, errors);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erd::library::ErdLibrary;
    use crate::erd::schema::{ErdDefinition, FieldDescriptor, FieldKind};
    use crate::error::IpbError;
    use crate::ipb::decoder::decode_frame;
    use crate::ipb::encoder::{encode_frame, FrameFormat};
    use crate::ipb::protocol::MessageType;
    use crate::serial::port_trait::mocks::MockTransport;
    use std::collections::HashMap;

    fn library() -> Arc<dyn ErdLookup> {
        let values: HashMap<String, String> = [("1", "Power Key Press"), ("11", "Dryer Start/Pause")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let status: HashMap<String, String> = [("5", "Running")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mut library = ErdLibrary::new();
        library.insert(ErdDefinition {
            id: ErdId(0xF012),
            name: "Cap Touch Command".to_string(),
            fields: vec![FieldDescriptor {
                name: "Command".to_string(),
                offset: 0,
                size: 1,
                kind: FieldKind::Enum(values),
            }],
        });
        library.insert(ErdDefinition {
            id: ErdId(0xF403),
            name: "Cycle Select".to_string(),
            fields: vec![FieldDescriptor {
                name: "Cycle".to_string(),
                offset: 0,
                size: 1,
                kind: FieldKind::Enum(
                    [("1", "Mixed Load"), ("2", "Cottons")]
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
            }],
        });
        library.insert(ErdDefinition {
            id: ErdId(0xF301),
            name: "Machine Status".to_string(),
            fields: vec![FieldDescriptor {
                name: "Status".to_string(),
                offset: 0,
                size: 1,
                kind: FieldKind::Enum(status),
            }],
        });
        Arc::new(library)
    }

    fn bus(transport: MockTransport) -> IpbBus<MockTransport> {
        IpbBus::new(transport, library(), FrameEncoder::default(), ConnectionState::default())
    }

    fn status_frame() -> Vec<u8> {
        encode_frame(MessageType::Publish, &[0xF3, 0x01, 0x01, 0x05]).unwrap()
    }

    #[tokio::test]
    async fn test_send_dryer_start_pause() {
        let transport = MockTransport::new();
        let bus = bus(transport.clone());

        bus.send_appliance_command(ApplianceCommand::DryerStartPause).await.unwrap();

        let written = transport.get_written_data();
        assert_eq!(written.len(), 1);
        let frame = decode_frame(&FrameFormat::default(), &written[0]).unwrap();
        assert_eq!(frame.payload, vec![0xF0, 0x12, 0x02, 0x0B, 0x01]);
        assert_eq!(bus.state().await.key_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_command_writes_nothing() {
        let transport = MockTransport::new();
        let bus = bus(transport.clone());

        let result = bus.send_command(ErdId(0xF012), "99", CommandStyle::KeyPress).await;

        assert!(matches!(result, Err(IpbError::InvalidCommandValue { .. })));
        assert!(transport.get_written_data().is_empty());
        assert_eq!(bus.state().await.key_count(), 1);
    }

    #[tokio::test]
    async fn test_undeclared_cycle_writes_nothing() {
        let transport = MockTransport::new();
        let bus = bus(transport.clone());

        let result = bus.send_appliance_command(ApplianceCommand::SetCycle(200)).await;

        assert!(matches!(
            result,
            Err(IpbError::InvalidCommandValue { erd: ErdId(0xF403), .. })
        ));
        assert!(transport.get_written_data().is_empty());

        bus.send_appliance_command(ApplianceCommand::SetCycle(2)).await.unwrap();
        let frame = decode_frame(&FrameFormat::default(), &transport.get_written_data()[0]).unwrap();
        assert_eq!(frame.payload, vec![0xF4, 0x03, 0x01, 0x02]);
    }

    #[tokio::test]
    async fn test_send_read_request() {
        let transport = MockTransport::new();
        let bus = bus(transport.clone());

        bus.send_appliance_command(ApplianceCommand::GetMachineStatus).await.unwrap();

        let frame = decode_frame(&FrameFormat::default(), &transport.get_written_data()[0]).unwrap();
        assert_eq!(frame.kind(), Some(MessageType::ReadRequest));
        assert_eq!(frame.payload, vec![0xF3, 0x01]);
    }

    #[tokio::test]
    async fn test_write_error_propagates() {
        let transport = MockTransport::new();
        transport.set_write_error(std::io::ErrorKind::BrokenPipe);
        let bus = bus(transport);

        let result = bus.send_appliance_command(ApplianceCommand::StartPauseRequest).await;
        assert!(matches!(result, Err(IpbError::Transport(_))));
    }

    #[tokio::test]
    async fn test_loop_decodes_after_leading_noise() {
        let mut stream = vec![0x11, 0x11, 0x11];
        stream.extend(status_frame());
        let bus = bus(MockTransport::with_bursts(vec![stream]));
        let mut reception = bus.reception_loop(FrameReader::default(), None);

        let mut received = Vec::new();
        let result = reception.run(|frame| received.push(frame)).await;

        // The script ends with end-of-stream, which ends the loop
        assert!(matches!(result, Err(IpbError::Transport(_))));
        assert_eq!(received.len(), 1);
        let decoded = received.remove(0).decoded.unwrap().unwrap();
        assert_eq!(decoded.to_string(), "[Publish] Machine Status - Status: Running");
        assert_eq!(bus.state().await.error_count(), 0);
    }

    #[tokio::test]
    async fn test_loop_counts_checksum_errors_and_recovers() {
        let mut corrupted = status_frame();
        corrupted[3] ^= 0x01;
        let bus = bus(MockTransport::with_bursts(vec![corrupted, status_frame()]));
        let mut reception = bus.reception_loop(FrameReader::default(), None);

        assert!(reception.step().await.unwrap().is_none());
        assert_eq!(reception.phase(), LoopPhase::Resyncing);
        assert_eq!(bus.state().await.error_count(), 1);

        let received = reception.step().await.unwrap().unwrap();
        assert_eq!(reception.phase(), LoopPhase::Reading);
        assert_eq!(received.frame.kind(), Some(MessageType::Publish));
        assert_eq!(bus.state().await.frames_received(), 1);
    }

    #[tokio::test]
    async fn test_loop_ends_on_read_error() {
        let transport = MockTransport::with_bursts(vec![status_frame()]);
        transport.set_read_error(std::io::ErrorKind::BrokenPipe);
        let bus = bus(transport);
        let mut reception = bus.reception_loop(FrameReader::default(), None);

        let result = reception.run(|_| panic!("no frame expected")).await;
        assert!(matches!(result, Err(IpbError::Transport(_))));
        assert_eq!(bus.state().await.error_count(), 0);
    }

    #[tokio::test]
    async fn test_loop_surfaces_schema_not_found() {
        let frame = encode_frame(MessageType::Publish, &[0xAB, 0xCD, 0x01, 0x00]).unwrap();
        let bus = bus(MockTransport::with_bursts(vec![frame]));
        let mut reception = bus.reception_loop(FrameReader::default(), None);

        let received = reception.step().await.unwrap().unwrap();
        assert!(matches!(received.decoded, Err(IpbError::SchemaNotFound(ErdId(0xABCD)))));
    }

    #[tokio::test]
    async fn test_loop_idle_timeout_and_stop() {
        let transport = MockTransport::with_bursts(vec![status_frame()]).silent_when_drained();
        let bus = bus(transport);
        let mut reception = bus.reception_loop(FrameReader::default(), Some(Duration::from_millis(10)));

        let stopper = bus.clone();
        let handle = tokio::spawn(async move {
            let mut count = 0;
            let result = reception.run(|_| count += 1).await;
            result.map(|_| count)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.stop().await;

        let count = handle.await.unwrap().unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_writes_interleave_with_idle_loop() {
        let transport = MockTransport::new().silent_when_drained();
        let bus = bus(transport.clone());
        let mut reception = bus.reception_loop(FrameReader::default(), Some(Duration::from_millis(10)));

        let handle = tokio::spawn(async move { reception.run(|_| {}).await });

        bus.send_appliance_command(ApplianceCommand::PowerKeyPress).await.unwrap();
        bus.stop().await;
        handle.await.unwrap().unwrap();

        assert_eq!(transport.get_written_data().len(), 1);
    }
}
