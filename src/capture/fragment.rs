//! Camera transport fragment headers
//!
//! Every bulk read from the camera carries one fragment laid out as:
//!
//! ```text
//!  0       2       3       5       6       7       8              12
//! +-------+-------+-------+-------+-------+-------+--------------+----------
//! | magic |  cid  |length | fid   | cam   | flags | sensor value | payload..
//! | (LE)  |       | (LE)  |       |       |       | (LE)         |
//! +-------+-------+-------+-------+-------+-------+--------------+----------
//! |<---- transport (5) -->|<-------- frame fragment (7) -------->|
//! ```
//!
//! `length` counts the frame-fragment header plus its payload. The flag byte holds
//! the has-sensor bit (bit 0), the button bit (bit 1) and six reserved bits.

/// Transport magic (`AA BB` on the wire)
pub const TRANSPORT_MAGIC: u16 = 0xBBAA;

/// Accepted transport channel ids
pub const CHANNEL_ID_A: u8 = 7;
pub const CHANNEL_ID_B: u8 = 11;

pub const TRANSPORT_HEADER_SIZE: usize = 5;
pub const FRAGMENT_HEADER_SIZE: usize = 7;

/// Number of camera channels a frame may be tagged with
pub const CAMERA_CHANNELS: u8 = 2;

const FLAG_HAS_SENSOR: u8 = 0x01;
const FLAG_BUTTON: u8 = 0x02;

/// Transport-level fragment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub magic: u16,
    pub channel_id: u8,
    pub length: u16,
}

impl FragmentHeader {
    /// Parses the 5-byte transport header, `None` if the slice is too short
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < TRANSPORT_HEADER_SIZE {
            return None;
        }

        Some(Self {
            magic: u16::from(data[0]) | (u16::from(data[1]) << 8),
            channel_id: data[2],
            length: u16::from(data[3]) | (u16::from(data[4]) << 8),
        })
    }

    /// Magic and channel id checks
    pub fn is_valid(&self) -> bool {
        self.magic == TRANSPORT_MAGIC
            && (self.channel_id == CHANNEL_ID_A || self.channel_id == CHANNEL_ID_B)
    }

    pub fn to_bytes(&self) -> [u8; TRANSPORT_HEADER_SIZE] {
        [
            self.magic as u8,
            (self.magic >> 8) as u8,
            self.channel_id,
            self.length as u8,
            (self.length >> 8) as u8,
        ]
    }
}

/// Per-frame fragment header that follows the transport header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFragmentHeader {
    /// Frame boundary id, changes once per logical frame
    pub boundary_id: u8,

    /// Camera channel number
    pub channel: u8,

    pub has_sensor: bool,
    pub button_pressed: bool,

    /// Reserved bits (6), must be zero
    pub reserved: u8,

    /// Auxiliary (g-sensor) value
    pub sensor_value: u32,
}

impl FrameFragmentHeader {
    /// Parses the 7-byte frame-fragment header, `None` if the slice is too short
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAGMENT_HEADER_SIZE {
            return None;
        }

        let flags = data[2];
        Some(Self {
            boundary_id: data[0],
            channel: data[1],
            has_sensor: flags & FLAG_HAS_SENSOR != 0,
            button_pressed: flags & FLAG_BUTTON != 0,
            reserved: flags >> 2,
            sensor_value: u32::from(data[3])
                | (u32::from(data[4]) << 8)
                | (u32::from(data[5]) << 16)
                | (u32::from(data[6]) << 24),
        })
    }

    /// Identity fields every fragment of one frame must share
    pub fn identity(&self) -> FrameIdentity {
        FrameIdentity {
            boundary_id: self.boundary_id,
            channel: self.channel,
            has_sensor: self.has_sensor,
            reserved: self.reserved,
        }
    }

    pub fn to_bytes(&self) -> [u8; FRAGMENT_HEADER_SIZE] {
        let mut flags = (self.reserved & 0x3F) << 2;
        if self.has_sensor {
            flags |= FLAG_HAS_SENSOR;
        }
        if self.button_pressed {
            flags |= FLAG_BUTTON;
        }

        let sensor = self.sensor_value.to_le_bytes();
        [
            self.boundary_id,
            self.channel,
            flags,
            sensor[0],
            sensor[1],
            sensor[2],
            sensor[3],
        ]
    }
}

/// Identity of the frame currently being accumulated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIdentity {
    pub boundary_id: u8,
    pub channel: u8,
    pub has_sensor: bool,
    pub reserved: u8,
}

impl FrameIdentity {
    /// Whether a frame may start with this identity
    pub fn is_acceptable_start(&self) -> bool {
        self.channel < CAMERA_CHANNELS && !self.has_sensor && self.reserved == 0
    }
}

/// Builds one raw transport packet around `payload`
///
/// Used by replay tooling and tests to synthesise camera traffic.
pub fn build_packet(channel_id: u8, header: &FrameFragmentHeader, payload: &[u8]) -> Vec<u8> {
    let length = (FRAGMENT_HEADER_SIZE + payload.len()) as u16;
    let transport = FragmentHeader {
        magic: TRANSPORT_MAGIC,
        channel_id,
        length,
    };

    let mut packet = Vec::with_capacity(TRANSPORT_HEADER_SIZE + length as usize);
    packet.extend_from_slice(&transport.to_bytes());
    packet.extend_from_slice(&header.to_bytes());
    packet.extend_from_slice(payload);
    packet
}
