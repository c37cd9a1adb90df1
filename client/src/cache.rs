//! On-disk cache of the card catalog
//!
//! The cache keeps the raw payload exactly as the server sent it, together
//! with its digest, so a returning client can answer a `CatalogHash` without
//! pulling the whole catalog again.

use crate::error::ClientError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use shared::catalog::{decode_cards, digest};
use shared::{Card, CardId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File layout of the cache
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    digest: String,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct CatalogCache {
    path: Option<PathBuf>,
    digest: Option<String>,
    cards: HashMap<CardId, Card>,
}

impl CatalogCache {
    /// Cache that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the cache at `path`
    ///
    /// A missing file gives an empty cache. A damaged one is ignored with a
    /// warning and gets replaced on the next pull.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut cache = Self {
            path: Some(path.clone()),
            ..Self::default()
        };

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return cache,
            Err(e) => {
                warn!("Cannot read catalog cache {}: {}", path.display(), e);
                return cache;
            }
        };

        match Self::load(&bytes) {
            Ok((digest, cards)) => {
                info!("Loaded {} cached cards from {}", cards.len(), path.display());
                cache.digest = Some(digest);
                cache.cards = cards;
            }
            Err(e) => warn!("Ignoring catalog cache {}: {}", path.display(), e),
        }
        cache
    }

    fn load(bytes: &[u8]) -> Result<(String, HashMap<CardId, Card>), ClientError> {
        let file: CacheFile = bincode::deserialize(bytes)?;
        let actual = digest(&file.payload);
        if actual != file.digest {
            return Err(ClientError::DigestMismatch {
                expected: file.digest,
                actual,
            });
        }
        let cards = decode_cards(&file.payload)?;
        Ok((actual, index(cards)))
    }

    /// Digest of the cached payload, if any
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Replaces the cached catalog with a freshly pulled payload
    ///
    /// `expected` is the digest the server announced. Nothing changes unless
    /// the payload matches it and decodes into valid cards.
    pub fn store(&mut self, payload: Vec<u8>, expected: &str) -> Result<(), ClientError> {
        let actual = digest(&payload);
        if actual != expected {
            return Err(ClientError::DigestMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        let cards = decode_cards(&payload)?;

        if let Some(path) = &self.path {
            let file = CacheFile {
                digest: actual.clone(),
                payload,
            };
            std::fs::write(path, bincode::serialize(&file)?)?;
        }

        self.digest = Some(actual);
        self.cards = index(cards);
        Ok(())
    }

    pub fn get(&self, id: CardId) -> Option<&Card> {
        self.cards.get(&id)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Card text with linked cards filled in
    pub fn render(&self, id: CardId) -> Option<String> {
        let card = self.get(id)?;
        Some(card.render(&|linked| self.get(linked)))
    }
}

fn index(cards: Vec<Card>) -> HashMap<CardId, Card> {
    cards.into_iter().map(|card| (card.id(), card)).collect()
}
