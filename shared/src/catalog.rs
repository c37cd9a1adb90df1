//! Canonical catalog encoding
//!
//! The server and the client must agree byte for byte on the serialized
//! catalog, otherwise digests of identical card sets would differ. Records are
//! always encoded in ascending id order with bincode.

use crate::card::{Card, CardError, CardId, CardKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Storage form of a card: identity, template text and kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    pub id: CardId,
    pub text: String,
    pub kind: CardKind,
}

impl CardRecord {
    pub fn into_card(self) -> Result<Card, CardError> {
        Card::new(self.id, self.kind, &self.text)
    }
}

impl From<&Card> for CardRecord {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id(),
            text: card.text().to_string(),
            kind: card.kind(),
        }
    }
}

#[derive(Debug)]
pub enum PayloadError {
    Encoding(bincode::Error),
    Card(CardError),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Encoding(e) => write!(f, "malformed catalog payload: {}", e),
            PayloadError::Card(e) => write!(f, "catalog payload contains {}", e),
        }
    }
}

impl std::error::Error for PayloadError {}

impl From<bincode::Error> for PayloadError {
    fn from(e: bincode::Error) -> Self {
        PayloadError::Encoding(e)
    }
}

impl From<CardError> for PayloadError {
    fn from(e: CardError) -> Self {
        PayloadError::Card(e)
    }
}

/// Serializes cards in canonical order
pub fn encode_cards(cards: &[Card]) -> Result<Vec<u8>, PayloadError> {
    let mut records: Vec<CardRecord> = cards.iter().map(CardRecord::from).collect();
    records.sort_by_key(|record| record.id);
    Ok(bincode::serialize(&records)?)
}

/// Decodes and validates a catalog payload
pub fn decode_cards(bytes: &[u8]) -> Result<Vec<Card>, PayloadError> {
    let records: Vec<CardRecord> = bincode::deserialize(bytes)?;
    records
        .into_iter()
        .map(|record| record.into_card().map_err(PayloadError::from))
        .collect()
}

/// Lower-case hex SHA-256 of a catalog payload
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
