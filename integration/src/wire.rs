//! Upstream binary frame decode (spec §6.1, §4.2).
//!
//! Inbound frame layout: `[2-byte packet count][for each packet: [2-byte
//! length][payload]]`, all big-endian. Payload length of 8, 44, or 184
//! bytes distinguishes LTP / QUOTE / FULL. Prices travel as integer paisa
//! and are scaled to decimal rupees by dividing by 100 here — the one
//! place in the pipeline that knows about the wire's fixed-point
//! encoding.

use crate::error::IntegrationError;
use rust_decimal::Decimal;

pub const LTP_PAYLOAD_LEN: usize = 8;
pub const QUOTE_PAYLOAD_LEN: usize = 44;
pub const FULL_PAYLOAD_LEN: usize = 184;

/// Which parser a payload's length dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Ltp,
    Quote,
    Full,
}

impl PacketKind {
    pub fn from_payload_len(len: usize) -> Option<Self> {
        match len {
            LTP_PAYLOAD_LEN => Some(Self::Ltp),
            QUOTE_PAYLOAD_LEN => Some(Self::Quote),
            FULL_PAYLOAD_LEN => Some(Self::Full),
            _ => None,
        }
    }
}

/// One parsed market-depth level (FULL packets only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLevel {
    pub quantity: u32,
    pub price_paisa: i32,
    pub orders: u16,
}

/// A raw upstream packet, still in wire units (paisa, not yet scaled).
#[derive(Debug, Clone, PartialEq)]
pub struct RawPacket {
    pub kind: PacketKind,
    pub token: u32,
    pub last_price_paisa: i32,
    pub last_qty: Option<u32>,
    pub avg_price_paisa: Option<i32>,
    pub volume: Option<u32>,
    pub buy_qty: Option<u32>,
    pub sell_qty: Option<u32>,
    pub open_paisa: Option<i32>,
    pub high_paisa: Option<i32>,
    pub low_paisa: Option<i32>,
    pub close_paisa: Option<i32>,
    pub oi: Option<u32>,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

impl RawPacket {
    /// Scale a paisa value to rupees (spec §4.2: "upstream sends integer
    /// paisa; normalizer divides by 100 to a decimal").
    pub fn scale(paisa: i32) -> Decimal {
        Decimal::new(paisa as i64, 2)
    }
}

/// Split the framed byte buffer into individual packet payload slices.
///
/// Returns one slice per packet, in wire order. Does not interpret the
/// payloads — that's [`parse_packet`]'s job, so a caller can count
/// packets to decide whether to coalesce a burst (spec §4.2: "if ≥ 64
/// packets are ready to read, drains them in one batch") before parsing.
pub fn split_packets(buf: &[u8]) -> Result<Vec<&[u8]>, IntegrationError> {
    if buf.len() < 2 {
        return Err(IntegrationError::FrameTooShort {
            expected: 2,
            actual: buf.len(),
        });
    }
    let packet_count = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    let mut cursor = 2usize;
    let mut packets = Vec::with_capacity(packet_count);

    for _ in 0..packet_count {
        if buf.len() < cursor + 2 {
            return Err(IntegrationError::FrameTooShort {
                expected: cursor + 2,
                actual: buf.len(),
            });
        }
        let len = u16::from_be_bytes([buf[cursor], buf[cursor + 1]]) as usize;
        cursor += 2;
        if buf.len() < cursor + len {
            return Err(IntegrationError::FrameTooShort {
                expected: cursor + len,
                actual: buf.len(),
            });
        }
        packets.push(&buf[cursor..cursor + len]);
        cursor += len;
    }

    Ok(packets)
}

fn be_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn be_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn be_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

/// Parse one payload (already length-dispatched by [`split_packets`]) per
/// spec §4.2's LTP/QUOTE/FULL tiers. Malformed/unrecognized-length
/// payloads are the caller's responsibility to drop and count — this
/// returns `None` rather than panicking so the normalizer can increment
/// `tick_parse_errors` and continue.
pub fn parse_packet(payload: &[u8]) -> Option<RawPacket> {
    let kind = PacketKind::from_payload_len(payload.len())?;

    let token = be_u32(payload, 0);
    let last_price_paisa = be_i32(payload, 4);

    match kind {
        PacketKind::Ltp => Some(RawPacket {
            kind,
            token,
            last_price_paisa,
            last_qty: None,
            avg_price_paisa: None,
            volume: None,
            buy_qty: None,
            sell_qty: None,
            open_paisa: None,
            high_paisa: None,
            low_paisa: None,
            close_paisa: None,
            oi: None,
            bids: Vec::new(),
            asks: Vec::new(),
        }),
        PacketKind::Quote => Some(RawPacket {
            kind,
            token,
            last_price_paisa,
            last_qty: Some(be_u32(payload, 8)),
            avg_price_paisa: Some(be_i32(payload, 12)),
            volume: Some(be_u32(payload, 16)),
            buy_qty: Some(be_u32(payload, 20)),
            sell_qty: Some(be_u32(payload, 24)),
            open_paisa: Some(be_i32(payload, 28)),
            high_paisa: Some(be_i32(payload, 32)),
            low_paisa: Some(be_i32(payload, 36)),
            close_paisa: Some(be_i32(payload, 40)),
            oi: None,
            bids: Vec::new(),
            asks: Vec::new(),
        }),
        PacketKind::Full => {
            let oi = be_u32(payload, 60);
            let mut bids = Vec::with_capacity(5);
            let mut asks = Vec::with_capacity(5);
            // 10 depth entries of 12 bytes each starting at offset 64:
            // first 5 are bids, next 5 are asks.
            for i in 0..10 {
                let base = 64 + i * 12;
                let level = DepthLevel {
                    quantity: be_u32(payload, base),
                    price_paisa: be_i32(payload, base + 4),
                    orders: be_u16(payload, base + 8),
                };
                if i < 5 {
                    bids.push(level);
                } else {
                    asks.push(level);
                }
            }
            Some(RawPacket {
                kind,
                token,
                last_price_paisa,
                last_qty: Some(be_u32(payload, 8)),
                avg_price_paisa: Some(be_i32(payload, 12)),
                volume: Some(be_u32(payload, 16)),
                buy_qty: Some(be_u32(payload, 20)),
                sell_qty: Some(be_u32(payload, 24)),
                open_paisa: Some(be_i32(payload, 28)),
                high_paisa: Some(be_i32(payload, 32)),
                low_paisa: Some(be_i32(payload, 36)),
                close_paisa: Some(be_i32(payload, 40)),
                oi: Some(oi),
                bids,
                asks,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ltp_payload(token: u32, price_paisa: i32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LTP_PAYLOAD_LEN);
        buf.extend_from_slice(&token.to_be_bytes());
        buf.extend_from_slice(&price_paisa.to_be_bytes());
        buf
    }

    #[test]
    fn splits_three_ltp_packets() {
        let p1 = ltp_payload(1, 10010);
        let p2 = ltp_payload(1, 10020);
        let p3 = ltp_payload(1, 10015);

        let mut frame = Vec::new();
        frame.extend_from_slice(&3u16.to_be_bytes());
        for p in [&p1, &p2, &p3] {
            frame.extend_from_slice(&(p.len() as u16).to_be_bytes());
            frame.extend_from_slice(p);
        }

        let packets = split_packets(&frame).unwrap();
        assert_eq!(packets.len(), 3);

        let prices: Vec<_> = packets
            .iter()
            .map(|p| parse_packet(p).unwrap().last_price_paisa)
            .collect();
        assert_eq!(prices, vec![10010, 10020, 10015]);
    }

    #[test]
    fn scale_divides_paisa_by_100() {
        assert_eq!(RawPacket::scale(10010).to_string(), "100.10");
    }

    #[test]
    fn truncated_frame_is_an_error_not_a_panic() {
        let buf = [0u8, 1, 0, 8, 1, 2, 3]; // claims 8-byte payload, only 3 present
        assert!(split_packets(&buf).is_err());
    }

    #[test]
    fn unknown_payload_length_returns_none() {
        assert!(parse_packet(&[0u8; 5]).is_none());
    }
}
