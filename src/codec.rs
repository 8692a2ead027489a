//! Pure encode/decode functions for the XR872 wire format.
//!
//! Nothing in this module touches a socket or a clock. Encoders are total —
//! every input produces a well-formed frame. Decoders return
//! [`DecodeReason`] on structural failure; they never panic on attacker- or
//! noise-controlled input.

use crate::error::DecodeReason;

pub const CONTROL_FRAME_LEN: usize = 20;
pub const COMMAND_PACKET_LEN: usize = 7;

const CTL_HEADER: u8 = 0x66;
const CTL_TYPE: u8 = 0x14;
const CTL_TAIL: u8 = 0x99;
const CMD_HEADER_0: u8 = 0xCC;
const CMD_HEADER_1: u8 = 0x5A;

/// `encode(p) = clamp(0, 255, round(p/100 * 128) + 128)`. Center (0.0)
/// yields exactly 128.
pub fn encode_axis(value: f32) -> u8 {
    let scaled = (value / 100.0 * 128.0).round() + 128.0;
    scaled.clamp(0.0, 255.0) as u8
}

/// `xor(b, i, j) = b[i] ^ b[i+1] ^ ... ^ b[j]`, inclusive of both ends.
pub fn xor_range(bytes: &[u8], i: usize, j: usize) -> u8 {
    bytes[i..=j].iter().fold(0u8, |acc, b| acc ^ b)
}

/// The eight stick/follow axes plus the flags needed to produce one
/// control frame. Kept free of [`crate::flight_state::FlightState`] so the
/// codec has no dependency on how the caller stores its state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlAxes {
    pub roll: f32,
    pub pitch: f32,
    pub throttle: f32,
    pub yaw: f32,
    pub follow_dir_x: f32,
    pub follow_dir_y: f32,
    pub follow_accel_x: f32,
    pub follow_accel_y: f32,
}

impl Default for ControlAxes {
    fn default() -> Self {
        ControlAxes {
            roll: 0.0,
            pitch: 0.0,
            throttle: 0.0,
            yaw: 0.0,
            follow_dir_x: 0.0,
            follow_dir_y: 0.0,
            follow_accel_x: 0.0,
            follow_accel_y: 0.0,
        }
    }
}

/// Encode a 20-byte control frame.
///
/// `flags` is the raw `CommandFlags` bitfield byte (0 if nothing armed).
/// `custom_payload`, if given, fills bytes 14..17 (documented reserved /
/// custom slot); callers that don't need it should pass `None` and get
/// four zero bytes.
pub fn encode_control_frame(
    axes: &ControlAxes,
    flags: u8,
    headless: bool,
    follow_mode_enabled: bool,
    custom_payload: Option<[u8; 4]>,
) -> [u8; CONTROL_FRAME_LEN] {
    let mut frame = [0u8; CONTROL_FRAME_LEN];
    frame[0] = CTL_HEADER;
    frame[1] = CTL_TYPE;
    frame[2] = encode_axis(axes.roll);
    frame[3] = encode_axis(axes.pitch);
    frame[4] = encode_axis(axes.throttle);
    frame[5] = encode_axis(axes.yaw);
    frame[6] = flags;
    frame[7] = 0x02 | if headless { 0x01 } else { 0x00 };
    let follow_byte = if follow_mode_enabled { 0xFF } else { 0x00 };
    frame[8] = follow_byte;
    frame[9] = follow_byte;
    frame[10] = encode_axis(axes.follow_dir_y);
    frame[11] = encode_axis(axes.follow_accel_x);
    frame[12] = encode_axis(axes.follow_accel_y);
    frame[13] = encode_axis(axes.follow_dir_x);
    if let Some(payload) = custom_payload {
        frame[14..18].copy_from_slice(&payload);
    }
    frame[18] = xor_range(&frame, 2, 17);
    frame[19] = CTL_TAIL;
    frame
}

/// Validate a control frame's structural invariants (used by tests and by
/// any collaborator that needs to sanity-check a frame before it is sent).
pub fn validate_control_frame(frame: &[u8]) -> Result<(), DecodeReason> {
    if frame.len() != CONTROL_FRAME_LEN {
        return Err(DecodeReason::InvalidLength);
    }
    if frame[0] != CTL_HEADER || frame[1] != CTL_TYPE {
        return Err(DecodeReason::BadHeader);
    }
    if frame[19] != CTL_TAIL {
        return Err(DecodeReason::BadTail);
    }
    if frame[18] != xor_range(frame, 2, 17) {
        return Err(DecodeReason::ChecksumMismatch);
    }
    Ok(())
}

/// Build one 7-byte command packet: `[0xCC, 0x5A, seq, cmd_id, 0x02, param,
/// xor(bytes 2..=5)]`.
fn build_command_packet(cmd_id: u8, param: u8, seq: u8) -> [u8; COMMAND_PACKET_LEN] {
    let mut pkt = [0u8; COMMAND_PACKET_LEN];
    pkt[0] = CMD_HEADER_0;
    pkt[1] = CMD_HEADER_1;
    pkt[2] = seq;
    pkt[3] = cmd_id;
    pkt[4] = 0x02;
    pkt[5] = param;
    pkt[6] = xor_range(&pkt, 2, 5);
    pkt
}

/// Build a command triple: three 7-byte packets with sequence bytes 1, 2, 3.
pub fn command_triple(cmd_id: u8, param: u8) -> [[u8; COMMAND_PACKET_LEN]; 3] {
    [
        build_command_packet(cmd_id, param, 1),
        build_command_packet(cmd_id, param, 2),
        build_command_packet(cmd_id, param, 3),
    ]
}

/// Video-start command id (`VideoStartCmd` in the vendor app's numbering).
const VIDEO_CMD_ID: u8 = 0x82;

/// `CC 5A 01 82 02 36 B7`, sent once on the Ctl socket.
pub fn video_start_packet() -> [u8; COMMAND_PACKET_LEN] {
    build_command_packet(VIDEO_CMD_ID, 0x36, 1)
}

/// `CC 5A 01 82 02 37 B6`, sent once on the Ctl socket.
pub fn video_stop_packet() -> [u8; COMMAND_PACKET_LEN] {
    build_command_packet(VIDEO_CMD_ID, 0x37, 1)
}

/// Command ids for the camera-rotate and camera-switch triples.
pub const CAMERA_ROTATE_CMD_ID: u8 = 0x01;
pub const CAMERA_SWITCH_CMD_ID: u8 = 0x04;

pub fn camera_rotate_triple(on: bool) -> [[u8; COMMAND_PACKET_LEN]; 3] {
    command_triple(CAMERA_ROTATE_CMD_ID, if on { 0x01 } else { 0x00 })
}

pub fn camera_switch_triple() -> [[u8; COMMAND_PACKET_LEN]; 3] {
    command_triple(CAMERA_SWITCH_CMD_ID, 0x00)
}

/// The single heartbeat byte sent every `heartbeat_interval_ms`.
pub const HEARTBEAT_BYTE: u8 = 0x00;
