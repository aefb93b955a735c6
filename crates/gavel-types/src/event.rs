//! Broadcast events emitted by the engine.
//!
//! Every event kind is an explicit tagged variant — no untyped payload
//! maps. Delivery is fire-and-forget: sink failures are logged by callers
//! and never propagate into bid results.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionId, AutoBidStopReason, BidId, RoundId, UserId};

/// All events the engine broadcasts to downstream channels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    BidPlaced {
        auction_id: AuctionId,
        round_id: RoundId,
        bid_id: BidId,
        user_id: UserId,
        amount: Decimal,
        is_auto_bid: bool,
    },
    UserOutbid {
        round_id: RoundId,
        user_id: UserId,
        refunded: Decimal,
        outbid_by: Decimal,
    },
    RoundExtended {
        round_id: RoundId,
        new_ends_at: DateTime<Utc>,
        extension_count: u32,
    },
    RoundTick {
        round_id: RoundId,
        remaining_secs: i64,
    },
    RoundEndingSoon {
        round_id: RoundId,
        threshold_secs: u64,
        remaining_secs: i64,
    },
    RoundStarted {
        auction_id: AuctionId,
        round_id: RoundId,
        round_number: u32,
        ends_at: DateTime<Utc>,
    },
    RoundEnded {
        auction_id: AuctionId,
        round_id: RoundId,
        winning_bid_ids: Vec<BidId>,
    },
    AuctionCompleted {
        auction_id: AuctionId,
    },
    AuctionCancelled {
        auction_id: AuctionId,
    },
    AutoBidTriggered {
        auction_id: AuctionId,
        user_id: UserId,
        amount: Decimal,
    },
    AutoBidRetrying {
        auction_id: AuctionId,
        user_id: UserId,
        required: Decimal,
    },
    AutoBidStopped {
        auction_id: AuctionId,
        user_id: UserId,
        reason: AutoBidStopReason,
    },
}

/// Push-channel seam. Implementations must not block the caller; the
/// engine treats every publish as best-effort.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: EngineEvent);
}

/// Sink that drops every event. Useful when no broadcast channel exists.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: EngineEvent) {}
}

/// Sink that records events in memory. The test double for broadcast
/// assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EngineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Drain all recorded events.
    #[must_use]
    pub fn take(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: EngineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
