//! Keyed in-flight guards.
//!
//! At most one action of a given kind may be in flight per
//! (actor, campaign) pair; duplicates are rejected, never queued. A guard
//! that is not released through the normal completion path can be reclaimed
//! after a fixed cool-down, so a missed release cannot lock an actor out
//! permanently.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// The logical action a guard covers. Refunds are guarded per token so
/// other tokens owned by the same actor stay independently claimable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Support,
    Withdraw,
    Refund(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GuardKey {
    actor: String,
    campaign: String,
    kind: ActionKind,
}

pub struct InFlightRegistry {
    entries: Mutex<HashMap<GuardKey, Instant>>,
    cooldown: Duration,
}

impl InFlightRegistry {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            cooldown,
        }
    }

    /// Claim the guard for (actor, campaign, kind). Returns `false` while a
    /// previous claim is still live; a claim older than the cool-down is
    /// treated as leaked and reclaimed.
    pub fn try_acquire(&self, actor: &str, campaign: &str, kind: ActionKind) -> bool {
        let key = GuardKey {
            actor: actor.to_string(),
            campaign: campaign.to_string(),
            kind,
        };
        let mut entries = self.entries.lock().unwrap();
        if let Some(acquired) = entries.get(&key) {
            if acquired.elapsed() < self.cooldown {
                debug!("Duplicate {kind:?} for {actor} on {campaign} rejected");
                return false;
            }
            warn!("Reclaiming expired {kind:?} guard for {actor} on {campaign}");
        }
        entries.insert(key, Instant::now());
        true
    }

    /// Release the guard through the normal completion path.
    pub fn release(&self, actor: &str, campaign: &str, kind: ActionKind) {
        let key = GuardKey {
            actor: actor.to_string(),
            campaign: campaign.to_string(),
            kind,
        };
        self.entries.lock().unwrap().remove(&key);
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
