//! Tick Normalizer (§4.2): upstream binary frame → canonical [`Tick`].
//!
//! Stateless given an instrument snapshot: every call takes the registry
//! snapshot it should validate tokens against, so the normalizer itself
//! holds no lock and can run on whichever task happens to own the
//! inbound read loop.

use rust_decimal::Decimal;
use tickgate_integration::wire::{self, PacketKind, RawPacket};
use tickgate_markets::registry::Snapshot;

use crate::tick::{DepthLevel, Tick};

/// Coalesce threshold from §4.2: "if ≥ 64 packets are ready to read,
/// drains them in one batch." This module doesn't own the socket read
/// loop, so it just exposes the threshold for the Session Orchestrator's
/// read loop to honor when draining a burst off [`BrokerSocket::try_recv`].
///
/// [`BrokerSocket::try_recv`]: tickgate_integration::socket::BrokerSocket::try_recv
pub const BURST_COALESCE_THRESHOLD: usize = 64;

/// Running counters a caller surfaces on the health/metrics endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizerCounters {
    pub tick_parse_errors: u64,
    pub ticks_unknown_token: u64,
}

pub struct Normalizer {
    pub counters: NormalizerCounters,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            counters: NormalizerCounters::default(),
        }
    }

    /// Decode one framed buffer into zero or more canonical ticks.
    /// Malformed packets are dropped and counted rather than propagated —
    /// per §4.2/§7 "Protocol" errors never tear down the session.
    pub fn normalize_frame(
        &mut self,
        buf: &[u8],
        timestamp_us: i64,
        registry: &Snapshot,
    ) -> Vec<Tick> {
        let payloads = match wire::split_packets(buf) {
            Ok(payloads) => payloads,
            Err(_) => {
                self.counters.tick_parse_errors += 1;
                return Vec::new();
            }
        };

        let mut ticks = Vec::with_capacity(payloads.len());
        for payload in payloads {
            match wire::parse_packet(payload) {
                Some(raw) => {
                    if !registry.contains_key(&raw.token) {
                        self.counters.ticks_unknown_token += 1;
                        continue;
                    }
                    ticks.push(to_tick(raw, timestamp_us));
                }
                None => self.counters.tick_parse_errors += 1,
            }
        }
        ticks
    }
}

fn scale_opt(paisa: Option<i32>) -> Option<Decimal> {
    paisa.map(RawPacket::scale)
}

fn to_tick(raw: RawPacket, timestamp_us: i64) -> Tick {
    let mut tick = Tick::ltp(raw.token, timestamp_us, RawPacket::scale(raw.last_price_paisa));

    if raw.kind != PacketKind::Ltp {
        tick.volume = raw.volume;
        // Avg/open/high/low/close are carried on the wire but the
        // canonical Tick only surfaces what §3 names; avg/open/high/low/
        // close feed analytics that are out of this core's scope (§1).
        let _ = scale_opt(raw.avg_price_paisa);
        let _ = scale_opt(raw.open_paisa);
        let _ = scale_opt(raw.high_paisa);
        let _ = scale_opt(raw.low_paisa);
        let _ = scale_opt(raw.close_paisa);
    }

    if raw.kind == PacketKind::Full {
        tick.oi = raw.oi;
        tick.bids = raw
            .bids
            .iter()
            .map(|level| DepthLevel {
                price: RawPacket::scale(level.price_paisa),
                quantity: level.quantity,
                orders: level.orders,
            })
            .collect();
        tick.asks = raw
            .asks
            .iter()
            .map(|level| DepthLevel {
                price: RawPacket::scale(level.price_paisa),
                quantity: level.quantity,
                orders: level.orders,
            })
            .collect();
        tick.bid_price = tick.bids.first().map(|l| l.price);
        tick.ask_price = tick.asks.first().map(|l| l.price);
        tick.bid_qty = tick.bids.first().map(|l| l.quantity);
        tick.ask_qty = tick.asks.first().map(|l| l.quantity);
    }

    tick
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tickgate_markets::instrument::{ExchangeSegment, Instrument, InstrumentKind};

    fn registry_with_token(token: u32) -> Snapshot {
        let mut map = HashMap::new();
        map.insert(
            token,
            Instrument::spot(token, "RELIANCE", InstrumentKind::Equity, ExchangeSegment::NseEquity, dec!(0.05)),
        );
        Arc::new(map)
    }

    fn ltp_frame(token: u32, price_paisa: i32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&token.to_be_bytes());
        payload.extend_from_slice(&price_paisa.to_be_bytes());

        let mut frame = Vec::new();
        frame.extend_from_slice(&1u16.to_be_bytes());
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(&payload);
        frame
    }

    #[test]
    fn known_token_produces_a_scaled_tick() {
        let registry = registry_with_token(256265);
        let mut normalizer = Normalizer::new();
        let ticks = normalizer.normalize_frame(&ltp_frame(256265, 10010), 1_000, &registry);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].last_price, dec!(100.10));
        assert_eq!(normalizer.counters.tick_parse_errors, 0);
    }

    #[test]
    fn unknown_token_is_dropped_and_counted() {
        let registry = registry_with_token(1);
        let mut normalizer = Normalizer::new();
        let ticks = normalizer.normalize_frame(&ltp_frame(999, 10010), 1_000, &registry);
        assert!(ticks.is_empty());
        assert_eq!(normalizer.counters.ticks_unknown_token, 1);
    }

    #[test]
    fn malformed_frame_is_dropped_and_counted() {
        let registry = registry_with_token(1);
        let mut normalizer = Normalizer::new();
        let ticks = normalizer.normalize_frame(&[0u8, 5], 1_000, &registry);
        assert!(ticks.is_empty());
        assert_eq!(normalizer.counters.tick_parse_errors, 1);
    }
}
