//! Card catalog loaded once at startup
//!
//! The catalog owns every card of the server. It is immutable after loading
//! and shared behind an `Arc`, so connection workers read it without locking.
//! Besides the cards it keeps the canonical payload sent to clients on a pull
//! and the digest clients compare against their cached copy.

use log::info;
use shared::catalog::{self, CardRecord, PayloadError};
use shared::{Card, CardError, CardId, CardKind};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Payload(PayloadError),
    Card(CardError),
    DuplicateId(CardId),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Io(e) => write!(f, "cannot read card file: {}", e),
            CatalogError::Json(e) => write!(f, "cannot parse card file: {}", e),
            CatalogError::Payload(e) => write!(f, "cannot encode catalog: {}", e),
            CatalogError::Card(e) => write!(f, "{}", e),
            CatalogError::DuplicateId(id) => write!(f, "card id {} is used more than once", id),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(e: std::io::Error) -> Self {
        CatalogError::Io(e)
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Json(e)
    }
}

impl From<PayloadError> for CatalogError {
    fn from(e: PayloadError) -> Self {
        CatalogError::Payload(e)
    }
}

impl From<CardError> for CatalogError {
    fn from(e: CardError) -> Self {
        CatalogError::Card(e)
    }
}

pub struct CardCatalog {
    cards: Vec<Card>,
    index: HashMap<CardId, usize>,
    payload: Arc<[u8]>,
    digest: String,
    hand_size: usize,
}

impl CardCatalog {
    /// Builds a catalog from already validated cards
    ///
    /// Cards are ordered by id. Duplicate ids are rejected.
    pub fn from_cards(mut cards: Vec<Card>, hand_size: usize) -> Result<Self, CatalogError> {
        cards.sort_by_key(Card::id);

        let mut index = HashMap::with_capacity(cards.len());
        for (position, card) in cards.iter().enumerate() {
            if index.insert(card.id(), position).is_some() {
                return Err(CatalogError::DuplicateId(card.id()));
            }
        }

        let payload = catalog::encode_cards(&cards)?;
        let digest = catalog::digest(&payload);

        Ok(Self {
            cards,
            index,
            payload: payload.into(),
            digest,
            hand_size,
        })
    }

    /// Loads the JSON card file written by the card storage
    ///
    /// Any invalid card makes the whole catalog invalid.
    pub fn load(path: impl AsRef<Path>, hand_size: usize) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let records: Vec<CardRecord> = serde_json::from_slice(&data)?;
        let cards = records
            .into_iter()
            .map(CardRecord::into_card)
            .collect::<Result<Vec<_>, _>>()?;

        let catalog = Self::from_cards(cards, hand_size)?;
        info!(
            "Loaded {} cards ({} white, {} black) from {}, digest {}",
            catalog.len(),
            catalog.count(CardKind::White),
            catalog.count(CardKind::Black),
            path.display(),
            catalog.digest()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn get(&self, id: CardId) -> Option<&Card> {
        self.index.get(&id).map(|position| &self.cards[*position])
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn ids(&self, kind: CardKind) -> Vec<CardId> {
        self.cards
            .iter()
            .filter(|card| card.kind() == kind)
            .map(Card::id)
            .collect()
    }

    pub fn count(&self, kind: CardKind) -> usize {
        self.cards.iter().filter(|card| card.kind() == kind).count()
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Canonical serialized catalog, cheap to clone into outbound queues
    pub fn payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.payload)
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn hand_size(&self) -> usize {
        self.hand_size
    }

    /// Most members a game can hold while every hand stays disjoint
    pub fn max_players_per_game(&self) -> usize {
        if self.count(CardKind::Black) == 0 || self.hand_size == 0 {
            return 0;
        }
        self.count(CardKind::White) / self.hand_size
    }

    /// Display text of a card with its links resolved through this catalog
    pub fn render(&self, card: &Card) -> String {
        card.render(&|id| self.get(id))
    }
}
