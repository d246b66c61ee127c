//! Campaign domain types shared between the cache, the chain reader, and the
//! API surface.

use serde::{Deserialize, Serialize};

/// Canonical campaign status derived from on-chain counters and the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    /// Deadline not reached; minting open.
    Live,
    /// Deadline passed with the sales threshold met. Terminal.
    Successful,
    /// Deadline passed below the sales threshold. Terminal.
    Failed,
}

impl CampaignStatus {
    /// Identifier string persisted in the database status column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Successful => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Parse a stored status string. Unknown values read as `Live` so a
    /// corrupted row is re-derived on the next reconciliation instead of
    /// wedging the campaign.
    pub fn from_str(s: &str) -> Self {
        match s {
            "SUCCESS" => Self::Successful,
            "FAILED" => Self::Failed,
            _ => Self::Live,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Live)
    }
}

/// A campaign row as stored in / read from the cache.
///
/// Token amounts are kept as base-unit decimal strings; SQLite has no
/// 128-bit integer column and the values only ever round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CampaignRecord {
    pub id: i64,
    pub contract_address: String,
    pub name: String,
    pub symbol: String,
    pub category: String,
    pub creator: String,
    pub min_required_sales: i64,
    pub max_items: i64,
    pub start_price: String,
    pub price_increment: String,
    pub payment_token: String,
    pub token_decimals: i64,
    pub deadline: i64,
    pub total_ever_minted: i64,
    pub status: String,
    pub created_at: i64,
}

impl CampaignRecord {
    pub fn status(&self) -> CampaignStatus {
        CampaignStatus::from_str(&self.status)
    }

    pub fn start_price_units(&self) -> u128 {
        self.start_price.parse().unwrap_or(0)
    }

    pub fn price_increment_units(&self) -> u128 {
        self.price_increment.parse().unwrap_or(0)
    }

    /// Bonding-curve price derived from cached parameters — the fallback when
    /// `getCurrentPriceToMint` cannot be read.
    pub fn derived_price(&self, total_ever_minted: u64) -> u128 {
        self.start_price_units()
            .saturating_add(self.price_increment_units().saturating_mul(total_ever_minted as u128))
    }
}

// ─────────────────────────────────────────────────────────
// Sourced values
// ─────────────────────────────────────────────────────────

/// Where a snapshot field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Chain,
    Cache,
}

/// A value tagged with its origin, so callers can tell a live read from a
/// stale fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    pub origin: Origin,
}

impl<T> Sourced<T> {
    pub fn chain(value: T) -> Self {
        Self {
            value,
            origin: Origin::Chain,
        }
    }

    pub fn cache(value: T) -> Self {
        Self {
            value,
            origin: Origin::Cache,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.origin == Origin::Cache
    }
}

/// Per-field reconciled view of a campaign. Each field degrades to its
/// cached value independently; one failing read never poisons the others.
#[derive(Debug, Clone)]
pub struct CampaignSnapshot {
    pub contract_address: String,
    pub total_ever_minted: Sourced<u64>,
    pub min_required_sales: Sourced<u64>,
    pub max_items: Sourced<u64>,
    pub deadline: Sourced<i64>,
    pub current_price: Sourced<u128>,
    pub payment_token: Sourced<String>,
}

impl CampaignSnapshot {
    /// True when every field was served from the chain.
    pub fn fully_live(&self) -> bool {
        !(self.total_ever_minted.is_stale()
            || self.min_required_sales.is_stale()
            || self.max_items.is_stale()
            || self.deadline.is_stale()
            || self.current_price.is_stale()
            || self.payment_token.is_stale())
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CampaignRecord {
        CampaignRecord {
            id: 1,
            contract_address: "0xc0ffee254729296a45a3885639ac7e10f9d54979".to_string(),
            name: "Solar Farm".to_string(),
            symbol: "SOLAR".to_string(),
            category: "energy".to_string(),
            creator: "0x1111111111111111111111111111111111111111".to_string(),
            min_required_sales: 10,
            max_items: 100,
            start_price: "1000000".to_string(),
            price_increment: "50000".to_string(),
            payment_token: "0x2222222222222222222222222222222222222222".to_string(),
            token_decimals: 6,
            deadline: 1_900_000_000,
            total_ever_minted: 8,
            status: "LIVE".to_string(),
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn status_roundtrip() {
        assert_eq!(CampaignStatus::from_str("LIVE"), CampaignStatus::Live);
        assert_eq!(
            CampaignStatus::from_str("SUCCESS"),
            CampaignStatus::Successful
        );
        assert_eq!(CampaignStatus::from_str("FAILED"), CampaignStatus::Failed);
        assert_eq!(CampaignStatus::Successful.as_str(), "SUCCESS");
    }

    #[test]
    fn unknown_status_reads_live() {
        assert_eq!(CampaignStatus::from_str("???"), CampaignStatus::Live);
    }

    #[test]
    fn terminal_states() {
        assert!(!CampaignStatus::Live.is_terminal());
        assert!(CampaignStatus::Successful.is_terminal());
        assert!(CampaignStatus::Failed.is_terminal());
    }

    #[test]
    fn derived_price_follows_curve() {
        let r = record();
        assert_eq!(r.derived_price(0), 1_000_000);
        assert_eq!(r.derived_price(8), 1_400_000);
    }

    #[test]
    fn sourced_staleness() {
        assert!(!Sourced::chain(1u64).is_stale());
        assert!(Sourced::cache(1u64).is_stale());
    }
}
