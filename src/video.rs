//! Video Reassembler (C3, spec §4.3): turns a lossy, reorder-free-per-socket
//! stream of UDP video fragments into whole JPEG frames. Single-threaded per
//! endpoint — the coordinator feeds it packets from one receive task only.

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Frames are dropped rather than grown past this size; a real JPEG frame
/// from the aircraft's camera never gets close to it.
pub const MAX_FRAME_BYTES: usize = 300_000;

const FULL_FRAGMENT_LEN: usize = 1472;
const FRAGMENT_HEADER_LEN: usize = 4;

/// Fragment→JPEG state machine (spec §3 `ReassemblyBuffer`).
///
/// `aborted` tracks the "ignore until the next `packet_num == 1`" sub-state
/// entered after a gap or a frame-id mismatch — it's not itself a spec
/// field, but it's the only way to satisfy "further non-starting packets of
/// this frame are ignored until the next `pnum == 1`" without re-detecting
/// the same gap on every subsequent fragment.
pub struct VideoReassembler {
    buffer: Vec<u8>,
    current_frame_id: u8,
    last_packet_num: u8,
    aborted: bool,
}

impl Default for VideoReassembler {
    fn default() -> Self {
        VideoReassembler {
            buffer: Vec::new(),
            current_frame_id: 0,
            last_packet_num: 0,
            aborted: true,
        }
    }
}

impl VideoReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the empty state (used on watchdog reconnect, spec §4.7).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn reset_for_frame(&mut self, frame_id: u8) {
        self.buffer.clear();
        self.current_frame_id = frame_id;
        self.last_packet_num = 1;
        self.aborted = false;
    }

    fn abort(&mut self) {
        self.buffer.clear();
        self.aborted = true;
    }

    /// Feed one UDP video-port datagram. Returns `Some(frame)` the moment a
    /// complete, well-formed JPEG is assembled.
    pub fn ingest(&mut self, packet: &[u8]) -> Option<Vec<u8>> {
        if packet.len() < 5 {
            return None;
        }
        let is_last = packet[1] == 0x01;
        if packet.len() != FULL_FRAGMENT_LEN && !is_last {
            return None;
        }
        let frame_id = packet[0];
        let packet_num = packet[2];
        let payload = &packet[FRAGMENT_HEADER_LEN..];

        if packet_num == 1 {
            self.reset_for_frame(frame_id);
            self.buffer.extend_from_slice(payload);
        } else {
            if self.aborted {
                return None;
            }
            let expected = self.last_packet_num.wrapping_add(1);
            if expected != packet_num || frame_id != self.current_frame_id {
                self.abort();
                return None;
            }
            self.buffer.extend_from_slice(payload);
            self.last_packet_num = packet_num;
        }

        if self.buffer.len() > MAX_FRAME_BYTES {
            self.abort();
            return None;
        }

        if is_last
            && self.buffer.len() >= 2
            && self.buffer[0..2] == JPEG_SOI
            && self.buffer[self.buffer.len() - 2..] == JPEG_EOI
        {
            let frame = self.buffer.clone();
            self.buffer.clear();
            self.aborted = true;
            return Some(frame);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(frame_id: u8, packet_num: u8, is_last: bool, payload: &[u8]) -> Vec<u8> {
        let mut pkt = vec![frame_id, if is_last { 1 } else { 0 }, packet_num, 0];
        pkt.extend_from_slice(payload);
        pkt
    }

    fn full_payload(byte: u8) -> Vec<u8> {
        vec![byte; FULL_FRAGMENT_LEN - FRAGMENT_HEADER_LEN]
    }

    #[test]
    fn reassembles_full_jpeg_from_fragments() {
        let mut r = VideoReassembler::new();
        let mut expected = Vec::new();

        let mut emitted = None;
        for pnum in 1u8..=22 {
            let is_last = pnum == 22;
            let payload: Vec<u8> = if pnum == 1 {
                let mut p = JPEG_SOI.to_vec();
                p.extend(std::iter::repeat(0xAB).take(FULL_FRAGMENT_LEN - FRAGMENT_HEADER_LEN - 2));
                p
            } else if is_last {
                vec![0xAB, 0xAB, 0xFF, 0xD9]
            } else {
                full_payload(0xAB)
            };
            expected.extend_from_slice(&payload);
            let pkt = fragment(5, pnum, is_last, &payload);
            let out = r.ingest(&pkt);
            if out.is_some() {
                emitted = out;
            }
        }

        let frame = emitted.expect("frame should be emitted on the last fragment");
        assert_eq!(frame, expected);
        assert_eq!(&frame[0..2], &JPEG_SOI);
        assert_eq!(&frame[frame.len() - 2..], &JPEG_EOI);
    }

    #[test]
    fn dropped_fragment_aborts_frame_and_next_frame_recovers() {
        let mut r = VideoReassembler::new();

        let start_payload = {
            let mut p = JPEG_SOI.to_vec();
            p.extend(std::iter::repeat(0xAB).take(FULL_FRAGMENT_LEN - FRAGMENT_HEADER_LEN - 2));
            p
        };
        assert!(r
            .ingest(&fragment(5, 1, false, &start_payload))
            .is_none());
        for pnum in 2u8..=9 {
            assert!(r
                .ingest(&fragment(5, pnum, false, &full_payload(0xAB)))
                .is_none());
        }
        // packet_num 10 is dropped entirely: feed 11 instead.
        assert!(r
            .ingest(&fragment(5, 11, false, &full_payload(0xAB)))
            .is_none());
        // the rest of frame 5 must now be ignored, even the "last" packet.
        assert!(r
            .ingest(&fragment(5, 22, true, &[0xAB, 0xAB, 0xFF, 0xD9]))
            .is_none());

        // frame 6 starts clean and reassembles normally.
        let payload6 = {
            let mut p = JPEG_SOI.to_vec();
            p.push(0xFF);
            p.push(0xD9);
            p
        };
        let frame = r
            .ingest(&fragment(6, 1, true, &payload6))
            .expect("frame 6 should reassemble");
        assert_eq!(frame, payload6);
    }

    #[test]
    fn short_non_last_packets_are_dropped() {
        let mut r = VideoReassembler::new();
        assert!(r.ingest(&fragment(1, 1, false, &[0u8; 10])).is_none());
    }

    #[test]
    fn oversized_frame_aborts_without_emitting() {
        let mut r = VideoReassembler::new();
        let start_payload = {
            let mut p = JPEG_SOI.to_vec();
            p.extend(std::iter::repeat(0xAB).take(FULL_FRAGMENT_LEN - FRAGMENT_HEADER_LEN - 2));
            p
        };
        r.ingest(&fragment(9, 1, false, &start_payload));
        let fragments_needed = MAX_FRAME_BYTES / (FULL_FRAGMENT_LEN - FRAGMENT_HEADER_LEN) + 2;
        let mut pnum: u8 = 2;
        for _ in 0..fragments_needed {
            let out = r.ingest(&fragment(9, pnum, false, &full_payload(0xAB)));
            assert!(out.is_none());
            pnum = pnum.wrapping_add(1);
        }
        assert!(r.aborted);
        assert!(r.buffer.is_empty());
    }
}
