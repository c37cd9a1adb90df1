//! Card content model shared by the server and the client
//!
//! A card is either white (an answer) or black (a prompt). Black cards carry
//! one or more unnamed placeholders, written `{}` in the template text, which
//! get filled with white cards while a round is resolved. Literal braces are
//! written `{{` and `}}`.
//!
//! The identity, kind and text of a card never change once the catalog is
//! loaded. Only the link slots are mutable, and games mutate their own copy
//! of the black card, never the catalog's.

use crate::PLACEHOLDER_FILLER;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable card identifier assigned by the card storage
pub type CardId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    White,
    Black,
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardKind::White => write!(f, "white"),
            CardKind::Black => write!(f, "black"),
        }
    }
}

/// Errors raised by the card model
///
/// Validity errors describe a card whose text breaks the placeholder rules,
/// link errors describe an illegal change to the link slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardError {
    Validity { id: CardId, reason: String },
    Link(String),
}

impl fmt::Display for CardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardError::Validity { id, reason } => write!(f, "invalid card {}: {}", id, reason),
            CardError::Link(reason) => write!(f, "card link error: {}", reason),
        }
    }
}

impl std::error::Error for CardError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot,
}

/// Characters that terminate a blank when converting author text
const BLANK_TERMINATORS: [char; 9] = ['.', ',', '?', '!', ':', ';', '-', '/', ' '];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    id: CardId,
    kind: CardKind,
    text: String,
    segments: Vec<Segment>,
    links: Vec<Option<CardId>>,
}

impl Card {
    /// Creates a card from its internal template text
    ///
    /// Fails with a validity error if the text breaks the rules of the kind:
    /// white cards need text and no placeholders, black cards need at least
    /// one placeholder.
    pub fn new(id: CardId, kind: CardKind, text: &str) -> Result<Self, CardError> {
        let segments = validate(id, kind, text)?;
        let slots = count_slots(&segments);

        Ok(Self {
            id,
            kind,
            text: text.to_string(),
            segments,
            links: vec![None; slots],
        })
    }

    /// Creates a card from author-facing text where `__` marks a blank
    pub fn from_card_text(id: CardId, kind: CardKind, text: &str) -> Result<Self, CardError> {
        let template = author_text_to_template(id, text)?;
        Self::new(id, kind, &template)
    }

    pub fn id(&self) -> CardId {
        self.id
    }

    pub fn kind(&self) -> CardKind {
        self.kind
    }

    pub fn is_white(&self) -> bool {
        self.kind == CardKind::White
    }

    pub fn is_black(&self) -> bool {
        self.kind == CardKind::Black
    }

    /// Internal template text, placeholders included
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replaces the template text after validating it, resetting all links
    pub fn set_text(&mut self, text: &str) -> Result<(), CardError> {
        let segments = validate(self.id, self.kind, text)?;
        self.links = vec![None; count_slots(&segments)];
        self.segments = segments;
        self.text = text.to_string();
        Ok(())
    }

    /// Replaces the text from author-facing form, see [`Card::from_card_text`]
    pub fn set_card_text(&mut self, text: &str) -> Result<(), CardError> {
        let template = author_text_to_template(self.id, text)?;
        self.set_text(&template)
    }

    pub fn placeholders(&self) -> usize {
        self.links.len()
    }

    pub fn links(&self) -> &[Option<CardId>] {
        &self.links
    }

    /// Ids of the filled slots in slot order
    pub fn linked_cards(&self) -> Vec<CardId> {
        self.links.iter().flatten().copied().collect()
    }

    /// Links a white card into a slot of this black card
    ///
    /// Without an index the first empty slot is used. Returns the slot index
    /// that was filled.
    pub fn link(&mut self, card: &Card, index: Option<usize>) -> Result<usize, CardError> {
        if self.kind != CardKind::Black {
            return Err(CardError::Link("only black cards may link cards".to_string()));
        }
        if card.kind != CardKind::White {
            return Err(CardError::Link(
                "only white cards may be linked to black cards".to_string(),
            ));
        }

        let index = match index {
            Some(index) => index,
            None => self
                .links
                .iter()
                .position(Option::is_none)
                .ok_or_else(|| CardError::Link("placeholders exceeded".to_string()))?,
        };

        let slot = self
            .links
            .get_mut(index)
            .ok_or_else(|| CardError::Link(format!("index {} out of range", index)))?;
        *slot = Some(card.id);
        Ok(index)
    }

    /// Empties the first slot holding the given card, returning its index
    pub fn unlink(&mut self, card_id: CardId) -> Result<usize, CardError> {
        let index = self
            .links
            .iter()
            .position(|link| *link == Some(card_id))
            .ok_or_else(|| CardError::Link(format!("card {} not linked", card_id)))?;
        self.links[index] = None;
        Ok(index)
    }

    pub fn unlink_all(&mut self) {
        self.links.iter_mut().for_each(|link| *link = None);
    }

    /// Renders the display text
    ///
    /// Filled slots are replaced by the rendered text of the linked card as
    /// returned by `resolve`, empty or unresolvable slots by the filler.
    pub fn render<'a>(&self, resolve: &dyn Fn(CardId) -> Option<&'a Card>) -> String {
        let mut output = String::with_capacity(self.text.len());
        let mut slots = self.links.iter();

        for segment in &self.segments {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Slot => {
                    match slots.next().copied().flatten().and_then(|id| resolve(id)) {
                        Some(card) => output.push_str(&card.render(resolve)),
                        None => output.push_str(PLACEHOLDER_FILLER),
                    }
                }
            }
        }

        output
    }
}

fn count_slots(segments: &[Segment]) -> usize {
    segments.iter().filter(|s| **s == Segment::Slot).count()
}

fn validate(id: CardId, kind: CardKind, text: &str) -> Result<Vec<Segment>, CardError> {
    let segments = parse_template(id, text)?;
    let slots = count_slots(&segments);

    let reason = match kind {
        CardKind::White if slots > 0 => Some("white cards may not have any placeholders"),
        CardKind::White if text.trim().is_empty() => Some("white cards need to contain some text"),
        CardKind::Black if slots == 0 => Some("black cards must contain at least one placeholder"),
        _ => None,
    };

    match reason {
        Some(reason) => Err(CardError::Validity {
            id,
            reason: reason.to_string(),
        }),
        None => Ok(segments),
    }
}

fn parse_template(id: CardId, text: &str) -> Result<Vec<Segment>, CardError> {
    let invalid = |reason: String| CardError::Validity { id, reason };
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, chars.peek().copied()) {
            ('{', Some('{')) | ('}', Some('}')) => {
                chars.next();
                literal.push(c);
            }
            ('{', Some('}')) => {
                chars.next();
                if !literal.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Slot);
            }
            ('{', _) => {
                return Err(invalid(
                    "only unnamed placeholders `{}` are allowed".to_string(),
                ))
            }
            ('}', _) => return Err(invalid("unmatched `}` in card text".to_string())),
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Text(literal));
    }

    Ok(segments)
}

/// Turns blanks written as two or more underscores into `{}` placeholders
///
/// A blank only counts when it is followed by a terminator character or ends
/// the text; shorter or embedded underscore runs stay literal.
fn author_text_to_template(id: CardId, text: &str) -> Result<String, CardError> {
    if text.contains(['{', '}']) {
        return Err(CardError::Validity {
            id,
            reason: "braces are not allowed inside the card text".to_string(),
        });
    }

    let chars: Vec<char> = text.chars().collect();
    let mut output = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '_' {
            output.push(chars[i]);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i] == '_' {
            i += 1;
        }
        let run = i - start;
        let terminated = chars
            .get(i)
            .map_or(true, |next| BLANK_TERMINATORS.contains(next));

        if run >= 2 && terminated {
            output.push_str("{}");
        } else {
            output.extend(std::iter::repeat('_').take(run));
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn white(id: CardId, text: &str) -> Card {
        Card::new(id, CardKind::White, text).unwrap()
    }

    fn black(id: CardId, text: &str) -> Card {
        Card::new(id, CardKind::Black, text).unwrap()
    }

    #[test]
    fn test_white_card_rejects_placeholders() {
        let err = Card::new(1, CardKind::White, "a {} b").unwrap_err();
        assert!(matches!(err, CardError::Validity { id: 1, .. }));
    }

    #[test]
    fn test_white_card_rejects_blank_text() {
        assert!(Card::new(1, CardKind::White, "").is_err());
        assert!(Card::new(1, CardKind::White, "   ").is_err());
    }

    #[test]
    fn test_black_card_requires_placeholder() {
        assert!(Card::new(2, CardKind::Black, "No blanks here.").is_err());
        assert_eq!(black(2, "Why {}?").placeholders(), 1);
    }

    #[test]
    fn test_named_placeholders_are_invalid() {
        assert!(Card::new(3, CardKind::Black, "Hello {name}").is_err());
        assert!(Card::new(3, CardKind::Black, "Hello {0}").is_err());
        assert!(Card::new(3, CardKind::Black, "Stray } {}").is_err());
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let card = black(4, "{{literal}} {}.");
        assert_eq!(card.placeholders(), 1);
        let lookup: HashMap<CardId, Card> = HashMap::new();
        assert_eq!(card.render(&|id| lookup.get(&id)), "{literal} ___.");
    }

    #[test]
    fn test_links_length_matches_placeholders() {
        let mut card = black(10, "{} and {} and {}");
        let answer = white(1, "cats");
        assert_eq!(card.links().len(), 3);

        card.link(&answer, None).unwrap();
        card.link(&answer, Some(2)).unwrap();
        assert_eq!(card.links().len(), 3);

        card.unlink(1).unwrap();
        assert_eq!(card.links().len(), 3);

        card.unlink_all();
        assert_eq!(card.links(), &[None, None, None]);
    }

    #[test]
    fn test_link_fills_first_empty_slot() {
        let mut card = black(10, "{} beats {}.");
        let a = white(1, "Rock");
        let b = white(2, "Scissors");

        assert_eq!(card.link(&a, Some(1)).unwrap(), 1);
        assert_eq!(card.link(&b, None).unwrap(), 0);
        assert_eq!(card.linked_cards(), vec![2, 1]);
    }

    #[test]
    fn test_link_errors() {
        let mut card = black(10, "Only {}.");
        let host = white(1, "white host");
        let other_black = black(11, "Another {}");
        let answer = white(2, "answer");

        assert!(matches!(
            host.clone().link(&answer, None),
            Err(CardError::Link(_))
        ));
        assert!(matches!(
            card.link(&other_black, None),
            Err(CardError::Link(_))
        ));
        assert!(matches!(card.link(&answer, Some(5)), Err(CardError::Link(_))));

        card.link(&answer, None).unwrap();
        assert!(matches!(card.link(&answer, None), Err(CardError::Link(_))));
        assert!(matches!(card.unlink(99), Err(CardError::Link(_))));
    }

    #[test]
    fn test_render_substitution_order() {
        let mut card = black(10, "First {}, then {}.");
        let a = white(1, "apples");
        let b = white(2, "bananas");
        let lookup: HashMap<CardId, Card> = [(1, a.clone()), (2, b.clone())].into_iter().collect();

        assert_eq!(card.render(&|id| lookup.get(&id)), "First ___, then ___.");

        card.link(&a, None).unwrap();
        card.link(&b, None).unwrap();
        assert_eq!(card.render(&|id| lookup.get(&id)), "First apples, then bananas.");

        card.unlink(1).unwrap();
        assert_eq!(card.render(&|id| lookup.get(&id)), "First ___, then bananas.");
    }

    #[test]
    fn test_render_unresolvable_link_uses_filler() {
        let mut card = black(10, "Lost {}");
        card.link(&white(7, "ghost"), None).unwrap();
        let lookup: HashMap<CardId, Card> = HashMap::new();
        assert_eq!(card.render(&|id| lookup.get(&id)), "Lost ___");
    }

    #[test]
    fn test_author_text_conversion() {
        let card = Card::from_card_text(1, CardKind::Black, "I drink __ and __.").unwrap();
        assert_eq!(card.text(), "I drink {} and {}.");
        assert_eq!(card.placeholders(), 2);

        let card = Card::from_card_text(2, CardKind::Black, "What is ____?").unwrap();
        assert_eq!(card.text(), "What is {}?");

        let card = Card::from_card_text(3, CardKind::White, "snake_case").unwrap();
        assert_eq!(card.text(), "snake_case");
    }

    #[test]
    fn test_author_text_blank_at_end() {
        let card = Card::from_card_text(4, CardKind::Black, "Hello __").unwrap();
        assert_eq!(card.text(), "Hello {}");
        assert_eq!(card.placeholders(), 1);
    }

    #[test]
    fn test_author_text_rejects_braces() {
        assert!(Card::from_card_text(1, CardKind::Black, "{} and __.").is_err());
    }

    #[test]
    fn test_set_text_resets_links() {
        let mut card = black(10, "{}");
        card.link(&white(1, "x"), None).unwrap();

        card.set_text("{} and {}").unwrap();
        assert_eq!(card.links(), &[None, None]);

        assert!(card.set_text("nothing").is_err());
        assert_eq!(card.text(), "{} and {}");

        card.set_card_text("Just __.").unwrap();
        assert_eq!(card.text(), "Just {}.");
        assert_eq!(card.placeholders(), 1);
    }
}
