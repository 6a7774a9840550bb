//! Marklin CS2/CS3 central station binding.
//!
//! The station speaks CAN over TCP in fixed 13-byte frames:
//!
//! ```text
//! byte 0..4   CAN id, big endian: prio(4) | command(8) | response(1) | hash(16)
//! byte 4      DLC (payload length, 0..=8)
//! byte 5..13  payload, zero padded
//! ```
//!
//! Multiple frames may arrive coalesced in a single socket read; the
//! [`FrameSplitter`] cuts the byte stream on frame size. Locomotive
//! discovery details live on the station's configuration channel, which is
//! outside this adapter; [`decode_event`] surfaces the events the runtime
//! consumes (feedback, speed, direction, power) and drops the rest.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::thread;

use heapless::Vec as PayloadVec;
use log::{debug, warn};

use crate::commands::{BusCommand, BusEvent};
use crate::layout::{BodyDirection, DecoderFamily, FeedbackAddress};
use crate::traits::CommandInterface;

/// Size of one frame on the wire.
pub const FRAME_LEN: usize = 13;

/// Default frame hash; a real station replaces it after the handshake.
pub const DEFAULT_HASH: u16 = 0x0301;

// CAN command codes.
const CMD_SYSTEM: u8 = 0x00;
const CMD_DISCOVERY: u8 = 0x02;
const CMD_LOCO_SPEED: u8 = 0x04;
const CMD_LOCO_DIRECTION: u8 = 0x05;
const CMD_LOCO_FUNCTION: u8 = 0x06;
const CMD_ACCESSORY: u8 = 0x0B;
const CMD_S88_EVENT: u8 = 0x11;

const SYSTEM_STOP: u8 = 0x00;
const SYSTEM_GO: u8 = 0x01;

// ============================================================================
// Frames
// ============================================================================

/// One 13-byte CAN frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Priority nibble.
    pub prio: u8,
    /// CAN command code.
    pub command: u8,
    /// Response bit: set on frames the station sends back.
    pub response: bool,
    /// Sender hash.
    pub hash: u16,
    /// Payload, up to 8 bytes.
    pub data: PayloadVec<u8, 8>,
}

impl Frame {
    /// Creates a command frame with the given payload.
    pub fn new(command: u8, hash: u16, data: &[u8]) -> Self {
        let mut payload = PayloadVec::new();
        for &byte in data.iter().take(8) {
            let _ = payload.push(byte);
        }
        Self {
            prio: 0,
            command,
            response: false,
            hash,
            data: payload,
        }
    }

    /// Encodes the frame into its 13-byte wire form.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let can_id: u32 = (u32::from(self.prio) << 25)
            | (u32::from(self.command) << 17)
            | (u32::from(self.response as u8) << 16)
            | u32::from(self.hash);
        let mut out = [0u8; FRAME_LEN];
        out[..4].copy_from_slice(&can_id.to_be_bytes());
        out[4] = self.data.len() as u8;
        out[5..5 + self.data.len()].copy_from_slice(&self.data);
        out
    }

    /// Decodes a 13-byte wire frame. Returns `None` on a short buffer or an
    /// out-of-range DLC.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FRAME_LEN {
            return None;
        }
        let can_id = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let dlc = bytes[4] as usize;
        if dlc > 8 {
            return None;
        }
        let mut data = PayloadVec::new();
        for &byte in &bytes[5..5 + dlc] {
            let _ = data.push(byte);
        }
        Some(Self {
            prio: ((can_id >> 25) & 0x0F) as u8,
            command: ((can_id >> 17) & 0xFF) as u8,
            response: (can_id >> 16) & 1 == 1,
            hash: (can_id & 0xFFFF) as u16,
            data,
        })
    }
}

/// Cuts a coalesced byte stream into 13-byte frames.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buffer: Vec<u8>,
}

impl FrameSplitter {
    /// Creates an empty splitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes from a socket read.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Takes the next complete frame off the buffer.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.buffer.len() < FRAME_LEN {
            return None;
        }
        let frame = Frame::decode(&self.buffer[..FRAME_LEN]);
        self.buffer.drain(..FRAME_LEN);
        frame
    }
}

// ============================================================================
// Addressing
// ============================================================================

/// Locomotive UID for a decoder address: each protocol family owns an
/// address range on the bus.
pub fn locomotive_uid(address: u32, decoder: DecoderFamily) -> u32 {
    match decoder {
        DecoderFamily::Mm => address,
        DecoderFamily::Mfx => 0x4000 + address,
        DecoderFamily::Dcc => 0xC000 + address,
    }
}

fn decoder_of_uid(uid: u32) -> (u32, DecoderFamily) {
    if uid >= 0xC000 {
        (uid - 0xC000, DecoderFamily::Dcc)
    } else if uid >= 0x4000 {
        (uid - 0x4000, DecoderFamily::Mfx)
    } else {
        (uid, DecoderFamily::Mm)
    }
}

/// Accessory UID for a turnout decoder address.
pub fn accessory_uid(address: u32) -> u32 {
    0x3000 + address.saturating_sub(1)
}

// ============================================================================
// Command / event codecs
// ============================================================================

/// Encodes a runtime command as a CAN frame.
pub fn encode_command(command: &BusCommand, hash: u16) -> Frame {
    match command {
        BusCommand::PowerOn => Frame::new(CMD_SYSTEM, hash, &[0, 0, 0, 0, SYSTEM_GO]),
        BusCommand::PowerOff => Frame::new(CMD_SYSTEM, hash, &[0, 0, 0, 0, SYSTEM_STOP]),
        BusCommand::SetTurnout {
            address,
            position,
            power,
        } => {
            let uid = accessory_uid(*address).to_be_bytes();
            Frame::new(
                CMD_ACCESSORY,
                hash,
                &[uid[0], uid[1], uid[2], uid[3], *position, *power as u8],
            )
        }
        BusCommand::SetSpeed {
            address,
            decoder,
            step,
        } => {
            let uid = locomotive_uid(*address, *decoder).to_be_bytes();
            let step = step.to_be_bytes();
            Frame::new(
                CMD_LOCO_SPEED,
                hash,
                &[uid[0], uid[1], uid[2], uid[3], step[0], step[1]],
            )
        }
        BusCommand::SetDirection {
            address,
            decoder,
            direction,
        } => {
            let uid = locomotive_uid(*address, *decoder).to_be_bytes();
            let dir = match direction {
                BodyDirection::Forward => 1,
                BodyDirection::Backward => 2,
            };
            Frame::new(CMD_LOCO_DIRECTION, hash, &[uid[0], uid[1], uid[2], uid[3], dir])
        }
        BusCommand::SetFunction {
            address,
            decoder,
            index,
            value,
        } => {
            let uid = locomotive_uid(*address, *decoder).to_be_bytes();
            Frame::new(
                CMD_LOCO_FUNCTION,
                hash,
                &[uid[0], uid[1], uid[2], uid[3], *index, *value as u8],
            )
        }
        BusCommand::QueryLocomotives => Frame::new(CMD_DISCOVERY, hash, &[]),
        BusCommand::QueryDirection { address, decoder } => {
            let uid = locomotive_uid(*address, *decoder).to_be_bytes();
            Frame::new(CMD_LOCO_DIRECTION, hash, &uid)
        }
    }
}

/// Decodes a station frame into a runtime event, when it carries one.
pub fn decode_event(frame: &Frame) -> Option<BusEvent> {
    match frame.command {
        CMD_S88_EVENT => {
            if frame.data.len() < 6 {
                return None;
            }
            let device = u16::from_be_bytes([frame.data[0], frame.data[1]]);
            let contact = u16::from_be_bytes([frame.data[2], frame.data[3]]);
            let detected = frame.data[5] != 0;
            Some(BusEvent::Feedback {
                address: FeedbackAddress::new(device, contact),
                detected,
            })
        }
        CMD_LOCO_SPEED if frame.response => {
            if frame.data.len() < 6 {
                return None;
            }
            let uid = u32::from_be_bytes([
                frame.data[0],
                frame.data[1],
                frame.data[2],
                frame.data[3],
            ]);
            let step = u16::from_be_bytes([frame.data[4], frame.data[5]]);
            let (address, _) = decoder_of_uid(uid);
            Some(BusEvent::SpeedAck { address, step })
        }
        CMD_LOCO_DIRECTION if frame.response => {
            if frame.data.len() < 5 {
                return None;
            }
            let uid = u32::from_be_bytes([
                frame.data[0],
                frame.data[1],
                frame.data[2],
                frame.data[3],
            ]);
            let (address, _) = decoder_of_uid(uid);
            let direction = match frame.data[4] {
                2 => BodyDirection::Backward,
                _ => BodyDirection::Forward,
            };
            Some(BusEvent::DirectionChanged { address, direction })
        }
        CMD_SYSTEM if frame.response => {
            let sub = *frame.data.get(4)?;
            match sub {
                SYSTEM_GO => Some(BusEvent::Power(true)),
                SYSTEM_STOP => Some(BusEvent::Power(false)),
                _ => None,
            }
        }
        _ => None,
    }
}

// ============================================================================
// TCP adapter
// ============================================================================

/// Connection to a CS2/CS3 station over TCP.
///
/// A reader thread splits the incoming byte stream into frames and queues
/// decoded events; [`try_recv`](CommandInterface::try_recv) drains that
/// queue in receipt order.
pub struct MarklinBus {
    addr: String,
    hash: u16,
    stream: Option<TcpStream>,
    events: VecDeque<BusEvent>,
    receiver: Option<mpsc::Receiver<BusEvent>>,
    reader: Option<thread::JoinHandle<()>>,
}

impl MarklinBus {
    /// Creates a disconnected adapter for the given `host:port`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            hash: DEFAULT_HASH,
            stream: None,
            events: VecDeque::new(),
            receiver: None,
            reader: None,
        }
    }

    fn spawn_reader(&mut self, stream: TcpStream) -> std::io::Result<()> {
        let (tx, rx) = mpsc::channel();
        let mut read_half = stream.try_clone()?;
        let handle = thread::spawn(move || {
            let mut splitter = FrameSplitter::new();
            let mut buf = [0u8; 4 * FRAME_LEN];
            loop {
                match read_half.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        splitter.extend(&buf[..n]);
                        while let Some(frame) = splitter.next_frame() {
                            if let Some(event) = decode_event(&frame) {
                                if tx.send(event).is_err() {
                                    return;
                                }
                            } else {
                                debug!("ignoring frame command {:#04x}", frame.command);
                            }
                        }
                    }
                    Err(err) => {
                        warn!("station read failed: {err}");
                        break;
                    }
                }
            }
        });
        self.receiver = Some(rx);
        self.reader = Some(handle);
        Ok(())
    }
}

impl CommandInterface for MarklinBus {
    type Error = std::io::Error;

    fn connect(&mut self) -> std::io::Result<()> {
        let stream = TcpStream::connect(&self.addr)?;
        stream.set_nodelay(true)?;
        self.spawn_reader(stream.try_clone()?)?;
        self.stream = Some(stream);
        debug!("connected to station at {}", self.addr);
        Ok(())
    }

    fn disconnect(&mut self) -> std::io::Result<()> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.receiver = None;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn execute(&mut self, command: &BusCommand) -> std::io::Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "station not connected")
        })?;
        let frame = encode_command(command, self.hash);
        stream.write_all(&frame.encode())
    }

    fn try_recv(&mut self) -> Option<BusEvent> {
        if let Some(receiver) = &self.receiver {
            while let Ok(event) = receiver.try_recv() {
                self.events.push_back(event);
            }
        }
        self.events.pop_front()
    }
}
