//! Wire format for the control channel.
//!
//! A fixed 21 byte request frame and a 4 byte acknowledgment, network byte
//! order. The sentinel values of the original frame layout (`0xFFFF` EC,
//! `0xFF` boost, `-1` datarate hint) exist only in here; everywhere else the
//! engine works with `Option`s.

use thiserror::Error;

use crate::units::{Bitrate, Datarate, EcScheme};

pub(crate) const FLAG_KEYFRAME: u8 = 0x01;
pub(crate) const FLAG_BITRATE: u8 = 0x02;
pub(crate) const FLAG_EC: u8 = 0x04;
pub(crate) const FLAG_BOOST: u8 = 0x08;
pub(crate) const FLAG_TEST_MODE: u8 = 0x10;

const CONTROL_LEN: usize = 21;
const ACK_LEN: usize = 4;

const EC_NO_CHANGE: u16 = 0xFFFF;
const EC_DISABLED: u16 = 0x0000;
const BOOST_NO_CHANGE: u8 = 0xFF;
const DATARATE_NONE: i32 = -1;

/// Errors decoding control channel frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The frame is shorter than the fixed layout.
    #[error("short frame: {0} bytes")]
    ShortFrame(usize),

    /// A packed EC field that decodes to an impossible block shape.
    #[error("invalid ec scheme 0x{0:04x}")]
    InvalidEcScheme(u16),
}

/// A configuration request towards the remote peer.
///
/// Fields that are `None` carry their "no change" sentinel on the wire and
/// their flag bit cleared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlMessage {
    /// Handshake id the acknowledgment must echo.
    pub request_id: u32,
    /// Reserved. Always the primary stream for now.
    pub stream_index: u8,
    /// New key-frame interval, when pending.
    pub keyframe_interval_ms: Option<i32>,
    /// New target video bitrate, when pending.
    pub video_bitrate: Option<Bitrate>,
    /// New EC scheme, when pending.
    pub ec_scheme: Option<EcScheme>,
    /// New datarate boost, when pending.
    pub dr_boost: Option<u8>,
    /// Informational datarate the sender planned for. Not interpreted by
    /// the receiver.
    pub datarate_hint: Option<Datarate>,
    /// Set while the test-mode driver is exercising the ladder.
    pub test_mode: bool,
}

impl ControlMessage {
    /// Serialize to the fixed frame layout.
    pub fn to_bytes(&self) -> [u8; CONTROL_LEN] {
        let mut flags = 0;
        if self.keyframe_interval_ms.is_some() {
            flags |= FLAG_KEYFRAME;
        }
        if self.video_bitrate.is_some() {
            flags |= FLAG_BITRATE;
        }
        if self.ec_scheme.is_some() {
            flags |= FLAG_EC;
        }
        if self.dr_boost.is_some() {
            flags |= FLAG_BOOST;
        }
        if self.test_mode {
            flags |= FLAG_TEST_MODE;
        }

        let bitrate = self.video_bitrate.map(|b| b.as_u64() as u32).unwrap_or(0);
        let ec = self.ec_scheme.map(ec_to_wire).unwrap_or(EC_NO_CHANGE);
        let hint = self
            .datarate_hint
            .map(|d| d.rung() as i32)
            .unwrap_or(DATARATE_NONE);
        let keyframe = self.keyframe_interval_ms.unwrap_or(0);
        let boost = self.dr_boost.unwrap_or(BOOST_NO_CHANGE);

        let mut buf = [0; CONTROL_LEN];
        buf[0..4].copy_from_slice(&self.request_id.to_be_bytes());
        buf[4] = flags;
        buf[5] = self.stream_index;
        buf[6..10].copy_from_slice(&bitrate.to_be_bytes());
        buf[10..12].copy_from_slice(&ec.to_be_bytes());
        buf[12..16].copy_from_slice(&hint.to_be_bytes());
        buf[16..20].copy_from_slice(&keyframe.to_be_bytes());
        buf[20] = boost;
        buf
    }

    /// Parse a received frame. Unknown flag bits are ignored.
    pub fn parse(buf: &[u8]) -> Result<ControlMessage, WireError> {
        if buf.len() < CONTROL_LEN {
            return Err(WireError::ShortFrame(buf.len()));
        }

        let request_id = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let flags = buf[4];
        let stream_index = buf[5];
        let bitrate = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
        let ec = u16::from_be_bytes([buf[10], buf[11]]);
        let hint = i32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let keyframe = i32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]);
        let boost = buf[20];

        let ec_scheme = if flags & FLAG_EC != 0 {
            Some(ec_from_wire(ec)?)
        } else {
            None
        };

        Ok(ControlMessage {
            request_id,
            stream_index,
            keyframe_interval_ms: (flags & FLAG_KEYFRAME != 0).then_some(keyframe),
            video_bitrate: (flags & FLAG_BITRATE != 0).then(|| Bitrate::new(bitrate as u64)),
            ec_scheme,
            dr_boost: (flags & FLAG_BOOST != 0 && boost != BOOST_NO_CHANGE).then_some(boost),
            datarate_hint: (hint >= 0 && hint <= u8::MAX as i32)
                .then(|| Datarate::new(hint as u8)),
            test_mode: flags & FLAG_TEST_MODE != 0,
        })
    }
}

/// Acknowledgment of a [`ControlMessage`]. Carries nothing beyond the echo
/// of the request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckFrame {
    /// The request id being confirmed.
    pub request_id: u32,
}

impl AckFrame {
    /// Serialize to the 4 byte frame.
    pub fn to_bytes(&self) -> [u8; ACK_LEN] {
        self.request_id.to_be_bytes()
    }

    /// Parse a received acknowledgment.
    pub fn parse(buf: &[u8]) -> Result<AckFrame, WireError> {
        if buf.len() < ACK_LEN {
            return Err(WireError::ShortFrame(buf.len()));
        }
        Ok(AckFrame {
            request_id: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
        })
    }
}

fn ec_to_wire(ec: EcScheme) -> u16 {
    match ec {
        EcScheme::Default => EC_NO_CHANGE,
        EcScheme::Disabled => EC_DISABLED,
        EcScheme::Fixed { total, ec } => (total as u16) << 8 | ec as u16,
    }
}

fn ec_from_wire(v: u16) -> Result<EcScheme, WireError> {
    match v {
        EC_NO_CHANGE => Ok(EcScheme::Default),
        EC_DISABLED => Ok(EcScheme::Disabled),
        _ => {
            let total = (v >> 8) as u8;
            let ec = (v & 0xFF) as u8;
            EcScheme::fixed(total, ec).ok_or(WireError::InvalidEcScheme(v))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn control_roundtrip_sentinels() {
        let msg = ControlMessage {
            request_id: 77,
            stream_index: 0,
            keyframe_interval_ms: None,
            video_bitrate: None,
            ec_scheme: None,
            dr_boost: None,
            datarate_hint: None,
            test_mode: false,
        };

        let bytes = msg.to_bytes();
        // No-change sentinels on the wire.
        assert_eq!(&bytes[10..12], &[0xFF, 0xFF]);
        assert_eq!(bytes[20], 0xFF);
        assert_eq!(&bytes[12..16], &(-1i32).to_be_bytes());

        let back = ControlMessage::parse(&bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn control_roundtrip_full() {
        let msg = ControlMessage {
            request_id: u32::MAX,
            stream_index: 0,
            keyframe_interval_ms: Some(500),
            video_bitrate: Some(Bitrate::mbps(4)),
            ec_scheme: Some(EcScheme::Fixed { total: 12, ec: 3 }),
            dr_boost: Some(2),
            datarate_hint: Some(Datarate::new(3)),
            test_mode: true,
        };

        let back = ControlMessage::parse(&msg.to_bytes()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn short_frame_rejected() {
        assert_eq!(
            ControlMessage::parse(&[0; 10]),
            Err(WireError::ShortFrame(10))
        );
        assert_eq!(AckFrame::parse(&[0; 2]), Err(WireError::ShortFrame(2)));
    }

    #[test]
    fn bad_ec_rejected() {
        let msg = ControlMessage {
            request_id: 1,
            stream_index: 0,
            keyframe_interval_ms: None,
            video_bitrate: None,
            ec_scheme: Some(EcScheme::Fixed { total: 12, ec: 3 }),
            dr_boost: None,
            datarate_hint: None,
            test_mode: false,
        };
        let mut bytes = msg.to_bytes();
        // total == ec is not a valid block shape.
        bytes[10] = 5;
        bytes[11] = 5;
        assert_eq!(
            ControlMessage::parse(&bytes),
            Err(WireError::InvalidEcScheme(0x0505))
        );
    }

    #[test]
    fn ec_disabled_roundtrip() {
        let msg = ControlMessage {
            request_id: 9,
            stream_index: 0,
            keyframe_interval_ms: None,
            video_bitrate: None,
            ec_scheme: Some(EcScheme::Disabled),
            dr_boost: None,
            datarate_hint: None,
            test_mode: false,
        };
        let back = ControlMessage::parse(&msg.to_bytes()).unwrap();
        assert_eq!(back.ec_scheme, Some(EcScheme::Disabled));
    }

    #[test]
    fn ack_roundtrip() {
        let ack = AckFrame { request_id: 4242 };
        assert_eq!(AckFrame::parse(&ack.to_bytes()).unwrap(), ack);
    }
}
