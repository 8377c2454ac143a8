//! Chain-tip and block-header types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::{BlockHash, TypesError};

/// Cumulative proof-of-work of a chain, as a 256-bit big-endian integer.
///
/// The derived ordering compares the big-endian bytes lexicographically,
/// which is the same as comparing the integers.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainWork([u8; 32]);

impl ChainWork {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_u128(value: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[16..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a hex string of up to 64 digits; shorter inputs are left-padded.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        if s.len() > 64 {
            return Err(TypesError::InvalidLength {
                expected: 32,
                actual: s.len().div_ceil(2),
            });
        }
        let padded = format!("{s:0>64}");
        let bytes = hex::decode(&padded).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ChainWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainWork({self})")
    }
}

impl fmt::Display for ChainWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for ChainWork {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainWork {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A node's view of its best chain (`getblockchaininfo`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
    /// Height of the node's best validated block.
    pub blocks: u64,
    pub headers: u64,
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: BlockHash,
    #[serde(rename = "chainwork")]
    pub chain_work: ChainWork,
}

impl BlockchainInfo {
    /// Key used to rank chain tips: cumulative work first, then height.
    pub fn tip_key(&self) -> (ChainWork, u64) {
        (self.chain_work, self.blocks)
    }
}

/// A block header as reported by `getblockheader` in verbose mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: BlockHash,
    /// -1 when the block is not on the node's main chain.
    pub confirmations: i64,
    pub height: u64,
    pub version: i32,
    #[serde(rename = "merkleroot")]
    pub merkle_root: String,
    pub time: u64,
    pub nonce: u64,
    pub bits: String,
    #[serde(rename = "chainwork")]
    pub chain_work: ChainWork,
    #[serde(rename = "previousblockhash", default)]
    pub previous_block_hash: Option<BlockHash>,
    #[serde(rename = "nextblockhash", default)]
    pub next_block_hash: Option<BlockHash>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hex_is_left_padded() {
        assert_eq!(ChainWork::from_hex("ff").unwrap(), ChainWork::from_u128(255));
    }

    #[test]
    fn overlong_hex_rejected() {
        assert!(ChainWork::from_hex(&"0".repeat(66)).is_err());
    }

    #[test]
    fn ordering_is_numeric() {
        let small = ChainWork::from_u128(0x00ff);
        let large = ChainWork::from_u128(0x0100);
        assert!(large > small);
    }

    #[test]
    fn tip_key_prefers_work_over_height() {
        let hash = BlockHash::ZERO;
        let heavy = BlockchainInfo {
            chain: "main".into(),
            blocks: 10,
            headers: 10,
            best_block_hash: hash,
            chain_work: ChainWork::from_u128(1000),
        };
        let tall = BlockchainInfo {
            blocks: 20,
            headers: 20,
            chain_work: ChainWork::from_u128(999),
            ..heavy.clone()
        };
        assert!(heavy.tip_key() > tall.tip_key());
    }

    #[test]
    fn blockchain_info_from_node_json() {
        let json = r#"{
            "chain": "regtest",
            "blocks": 105,
            "headers": 105,
            "bestblockhash": "0000000000000000000000000000000000000000000000000000000000000001",
            "chainwork": "00000000000000000000000000000000000000000000000000000000000000d4",
            "difficulty": 4.6e-10
        }"#;
        let info: BlockchainInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.blocks, 105);
        assert_eq!(info.chain_work, ChainWork::from_u128(0xd4));
    }
}
