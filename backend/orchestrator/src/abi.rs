//! Minimal ABI layer for the campaign, factory, and ERC-20 surfaces.
//!
//! Everything the orchestrator calls takes only static `address` / `uint256`
//! arguments except the factory's `createCampaign`, so encoding is a 4-byte
//! selector followed by right-aligned 32-byte words (plus the standard
//! head/tail layout for the factory's string parameters).  Each selector
//! constant is the first four bytes of the keccak-256 hash of the canonical
//! signature written beside it.

use crate::errors::{OrchestratorError, Result};

// ─────────────────────────────────────────────────────────
// Selectors — campaign contract views
// ─────────────────────────────────────────────────────────

pub const TOTAL_EVER_MINTED: [u8; 4] = [0x92, 0x48, 0x08, 0xb4]; // totalEverMinted()
pub const MIN_REQUIRED_SALES: [u8; 4] = [0x63, 0x35, 0x62, 0x9b]; // minRequiredSales()
pub const MAX_ITEMS: [u8; 4] = [0x3c, 0x01, 0x0a, 0x3e]; // maxItems()
pub const START_PRICE: [u8; 4] = [0xf1, 0xa9, 0xaf, 0x89]; // startPrice()
pub const PRICE_INCREMENT: [u8; 4] = [0x28, 0x0d, 0x62, 0xac]; // priceIncrement()
pub const DEADLINE: [u8; 4] = [0xb8, 0x07, 0x77, 0xea]; // timestamp()
pub const CURRENT_PRICE_TO_MINT: [u8; 4] = [0xc9, 0x6b, 0x65, 0x44]; // getCurrentPriceToMint()
pub const PAYMENT_TOKEN: [u8; 4] = [0x30, 0x13, 0xce, 0x29]; // paymentToken()
pub const FACTORY: [u8; 4] = [0xc4, 0x5a, 0x01, 0x55]; // factory()
pub const PLATFORM_FEE_AND_TREASURY: [u8; 4] = [0x92, 0x5c, 0x3f, 0x10]; // getPlatformFeeAndTreasury()
pub const WITHDRAWAL_AMOUNT: [u8; 4] = [0xe6, 0xe2, 0x68, 0xf4]; // withdrawalAmount()
pub const TOTAL_EARNED_BY_CREATOR: [u8; 4] = [0x37, 0x0a, 0x01, 0x0e]; // totalEarnedByCreator()
pub const HOLDER_BY_TOKEN_ID: [u8; 4] = [0xb8, 0xc6, 0x51, 0x7c]; // getHolderByTokenId(uint256)
pub const BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31]; // balanceOf(address)
pub const TOKEN_OF_OWNER_BY_INDEX: [u8; 4] = [0x2f, 0x74, 0x5c, 0x59]; // tokenOfOwnerByIndex(address,uint256)
pub const ALLOWANCE: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e]; // allowance(address,address)
pub const DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67]; // decimals()

// ─────────────────────────────────────────────────────────
// Selectors — writes
// ─────────────────────────────────────────────────────────

pub const MINT: [u8; 4] = [0x12, 0x49, 0xc5, 0x8b]; // mint()
pub const APPROVE: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3]; // approve(address,uint256)
pub const WITHDRAW_CREATORS_FUNDS: [u8; 4] = [0x51, 0x3b, 0x88, 0x4f]; // withdrawCreatorsFunds()
pub const CLAIM_REFUND: [u8; 4] = [0x5b, 0x7b, 0xaf, 0x64]; // claimRefund(uint256)
pub const CREATE_CAMPAIGN: [u8; 4] = [0xef, 0xf3, 0x7b, 0x63]; // createCampaign(string,string,string,uint256,uint256,uint256,uint256,address,uint256)

/// keccak-256 of `CampaignCreated(address,address)` — topic0 of the factory's
/// creation event (indexed creator, indexed campaign).
pub const CAMPAIGN_CREATED_TOPIC: &str =
    "0x6056366dba45431fd6a8854ad9f2594942b02c4f2c3f6fbc329b3079b027b8b4";

/// The zero address doubles as the native-currency sentinel for
/// `paymentToken`.
pub const NATIVE_TOKEN: &str = "0x0000000000000000000000000000000000000000";

// ─────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────

/// Lower-case and validate a `0x`-prefixed 20-byte address.
pub fn normalize_address(addr: &str) -> Result<String> {
    let lower = addr.to_ascii_lowercase();
    let body = lower
        .strip_prefix("0x")
        .ok_or_else(|| OrchestratorError::Decode(format!("Address missing 0x prefix: {addr}")))?;
    if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(OrchestratorError::Decode(format!("Malformed address: {addr}")));
    }
    Ok(lower)
}

/// Encode an address as a right-aligned 32-byte word.
pub fn encode_address(addr: &str) -> Result<[u8; 32]> {
    let normalized = normalize_address(addr)?;
    let bytes = hex::decode(&normalized[2..])
        .map_err(|e| OrchestratorError::Decode(format!("Bad address hex: {e}")))?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// Encode a uint256 (here capped at u128) as a 32-byte word.
pub fn encode_uint(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Build `0x`-prefixed calldata from a selector and static argument words.
pub fn calldata(selector: [u8; 4], words: &[[u8; 32]]) -> String {
    let mut out = String::with_capacity(2 + 8 + words.len() * 64);
    out.push_str("0x");
    out.push_str(&hex::encode(selector));
    for word in words {
        out.push_str(&hex::encode(word));
    }
    out
}

/// Calldata for the factory's `createCampaign`.  The three leading string
/// parameters use the standard dynamic head/tail layout; the remaining six
/// are static words.
#[allow(clippy::too_many_arguments)]
pub fn encode_create_campaign(
    name: &str,
    symbol: &str,
    category: &str,
    min_required_sales: u64,
    max_items: u64,
    start_price: u128,
    price_increment: u128,
    payment_token: &str,
    deadline: i64,
) -> Result<String> {
    const HEAD_WORDS: usize = 9;

    let mut head: Vec<[u8; 32]> = Vec::with_capacity(HEAD_WORDS);
    let mut tail: Vec<u8> = Vec::new();

    for s in [name, symbol, category] {
        head.push(encode_uint((HEAD_WORDS * 32 + tail.len()) as u128));
        tail.extend_from_slice(&encode_uint(s.len() as u128));
        tail.extend_from_slice(s.as_bytes());
        let pad = (32 - s.len() % 32) % 32;
        tail.extend(std::iter::repeat(0u8).take(pad));
    }
    head.push(encode_uint(min_required_sales as u128));
    head.push(encode_uint(max_items as u128));
    head.push(encode_uint(start_price));
    head.push(encode_uint(price_increment));
    head.push(encode_address(payment_token)?);
    if deadline < 0 {
        return Err(OrchestratorError::Decode(format!(
            "Negative deadline: {deadline}"
        )));
    }
    head.push(encode_uint(deadline as u128));

    let mut out = calldata(CREATE_CAMPAIGN, &head);
    out.push_str(&hex::encode(&tail));
    Ok(out)
}

// ─────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────

/// Split `0x`-prefixed return data into 32-byte words.
pub fn decode_words(data: &str) -> Result<Vec<[u8; 32]>> {
    let body = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(body)
        .map_err(|e| OrchestratorError::Decode(format!("Bad return hex: {e}")))?;
    if bytes.len() % 32 != 0 {
        return Err(OrchestratorError::Decode(format!(
            "Return data is not word-aligned ({} bytes)",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(32)
        .map(|c| {
            let mut w = [0u8; 32];
            w.copy_from_slice(c);
            w
        })
        .collect())
}

/// First word of the return data, or a decode error when empty.
pub fn first_word(data: &str, label: &str) -> Result<[u8; 32]> {
    decode_words(data)?
        .into_iter()
        .next()
        .ok_or_else(|| OrchestratorError::Decode(format!("Empty return data for {label}")))
}

/// Interpret a word as a uint that fits u128.
pub fn word_to_u128(word: &[u8; 32]) -> Result<u128> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(OrchestratorError::Decode(
            "uint256 value exceeds u128".to_string(),
        ));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(buf))
}

/// Interpret a word as a uint that fits u64.
pub fn word_to_u64(word: &[u8; 32]) -> Result<u64> {
    let wide = word_to_u128(word)?;
    u64::try_from(wide)
        .map_err(|_| OrchestratorError::Decode("uint256 value exceeds u64".to_string()))
}

/// Interpret a word as a right-aligned address.
pub fn word_to_address(word: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(&word[12..]))
}

/// Extract the address packed into an indexed event topic.
pub fn topic_to_address(topic: &str) -> Result<String> {
    let body = topic.strip_prefix("0x").unwrap_or(topic);
    if body.len() != 64 {
        return Err(OrchestratorError::Decode(format!(
            "Malformed event topic: {topic}"
        )));
    }
    Ok(format!("0x{}", &body.to_ascii_lowercase()[24..]))
}

/// Parse a JSON-RPC hex quantity (`"0x1a"`) into u64.
pub fn hex_to_u64(quantity: &str) -> Result<u64> {
    let body = quantity.strip_prefix("0x").unwrap_or(quantity);
    u64::from_str_radix(body, 16)
        .map_err(|e| OrchestratorError::Decode(format!("Bad hex quantity {quantity}: {e}")))
}

/// Render a base-unit amount with the token's fixed decimal scale,
/// trimming trailing zeros ("1.5", "0.05", "12").
pub fn format_units(amount: u128, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let scale = 10u128.pow(decimals as u32);
    let whole = amount / scale;
    let frac = amount % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{frac:0width$}", width = decimals as usize);
    format!("{whole}.{}", frac_str.trim_end_matches('0'))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "0x1111111111111111111111111111111111111111";
    const SPENDER: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn calldata_no_args() {
        assert_eq!(calldata(MINT, &[]), "0x1249c58b");
    }

    #[test]
    fn calldata_balance_of() {
        let data = calldata(BALANCE_OF, &[encode_address(OWNER).unwrap()]);
        assert_eq!(
            data,
            "0x70a082310000000000000000000000001111111111111111111111111111111111111111"
        );
    }

    #[test]
    fn calldata_allowance_two_words() {
        let data = calldata(
            ALLOWANCE,
            &[
                encode_address(OWNER).unwrap(),
                encode_address(SPENDER).unwrap(),
            ],
        );
        assert_eq!(data.len(), 2 + 8 + 128);
        assert!(data.starts_with("0xdd62ed3e"));
        assert!(data.ends_with("2222222222222222222222222222222222222222"));
    }

    #[test]
    fn uint_roundtrip() {
        let word = encode_uint(1_500_000_000_000_000_000);
        assert_eq!(word_to_u128(&word).unwrap(), 1_500_000_000_000_000_000);
    }

    #[test]
    fn u128_overflow_rejected() {
        let mut word = [0u8; 32];
        word[15] = 1; // 2^128
        assert!(matches!(
            word_to_u128(&word),
            Err(OrchestratorError::Decode(_))
        ));
    }

    #[test]
    fn u64_overflow_rejected() {
        let word = encode_uint(u64::MAX as u128 + 1);
        assert!(word_to_u64(&word).is_err());
    }

    #[test]
    fn address_word_roundtrip() {
        let word = encode_address(SPENDER).unwrap();
        assert_eq!(word_to_address(&word), SPENDER);
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(normalize_address("0x123").is_err());
        assert!(normalize_address("1111111111111111111111111111111111111111").is_err());
        assert!(normalize_address("0xzz11111111111111111111111111111111111111").is_err());
    }

    #[test]
    fn topic_address_extraction() {
        let topic = "0x0000000000000000000000002222222222222222222222222222222222222222";
        assert_eq!(topic_to_address(topic).unwrap(), SPENDER);
    }

    #[test]
    fn hex_quantity() {
        assert_eq!(hex_to_u64("0x1a").unwrap(), 26);
        assert_eq!(hex_to_u64("0x0").unwrap(), 0);
        assert!(hex_to_u64("0xzz").is_err());
    }

    #[test]
    fn format_units_cases() {
        assert_eq!(format_units(1_500_000_000_000_000_000, 18), "1.5");
        assert_eq!(format_units(50_000_000_000_000_000, 18), "0.05");
        assert_eq!(format_units(12, 0), "12");
        assert_eq!(format_units(1_000_000, 6), "1");
        assert_eq!(format_units(0, 18), "0");
    }

    #[test]
    fn create_campaign_layout() {
        let data = encode_create_campaign(
            "Solar Farm",
            "SOLAR",
            "energy",
            10,
            100,
            1_000_000,
            50_000,
            SPENDER,
            1_900_000_000,
        )
        .unwrap();
        // selector + 9 head words before the tail
        assert!(data.starts_with("0xeff37b63"));
        let words = decode_words(&format!("0x{}", &data[10..])).unwrap();
        // first string offset points just past the head
        assert_eq!(word_to_u128(&words[0]).unwrap(), 9 * 32);
        // static args land in head positions 3..=8
        assert_eq!(word_to_u64(&words[3]).unwrap(), 10);
        assert_eq!(word_to_u64(&words[4]).unwrap(), 100);
        assert_eq!(word_to_u128(&words[5]).unwrap(), 1_000_000);
        assert_eq!(word_to_u128(&words[6]).unwrap(), 50_000);
        assert_eq!(word_to_address(&words[7]), SPENDER);
        assert_eq!(word_to_u64(&words[8]).unwrap(), 1_900_000_000);
        // first tail word is the length of "Solar Farm"
        assert_eq!(word_to_u64(&words[9]).unwrap(), 10);
    }
}
