//! Spender attribution from card-number patterns

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spender used when nothing identifies a card holder
pub const JOINT: &str = "Joint";

/// A card-number fragment (usually the last four digits) and its holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPattern {
    pub number: String,
    pub spender: String,
}

/// Household profile: who holds which card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub default_spender: String,
    pub spenders: Vec<String>,
    /// Checked in order; the first fragment found wins
    pub cards: Vec<CardPattern>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            default_spender: JOINT.to_string(),
            spenders: vec![JOINT.to_string()],
            cards: Vec::new(),
        }
    }
}

impl UserProfile {
    /// Add a card pattern (builder style, mostly for tests and callers without a config file)
    pub fn with_card(mut self, number: &str, spender: &str) -> Self {
        self.cards.push(CardPattern {
            number: number.to_string(),
            spender: spender.to_string(),
        });
        if !self.spenders.iter().any(|s| s == spender) {
            self.spenders.push(spender.to_string());
        }
        self
    }

    /// Card number fragments, in configured order
    pub fn card_numbers(&self) -> impl Iterator<Item = &str> {
        self.cards.iter().map(|c| c.number.as_str())
    }

    /// Spender whose card number appears in the text, if any
    pub fn match_card(&self, text: &str) -> Option<&str> {
        self.cards
            .iter()
            .filter(|c| !c.number.is_empty())
            .find(|c| text.contains(&c.number))
            .map(|c| c.spender.as_str())
    }

    /// Guess the owner of a whole file from every card number it mentions
    ///
    /// One spender found: that spender. Several: `Joint`. None: `None`.
    pub fn detect_file_owner(&self, content: &str) -> Option<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for card in self.cards.iter().filter(|c| !c.number.is_empty()) {
            *counts.entry(card.spender.as_str()).or_insert(0) +=
                content.matches(card.number.as_str()).count();
        }

        let found: Vec<&str> = counts
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(spender, _)| spender)
            .collect();

        match found.as_slice() {
            [] => None,
            [only] => Some((*only).to_string()),
            _ => Some(JOINT.to_string()),
        }
    }

    /// Default spender for one file: its detected owner unless that is `Joint`
    pub fn file_default(&self, content: &str) -> String {
        match self.detect_file_owner(content) {
            Some(owner) if owner != JOINT => owner,
            _ => self.default_spender.clone(),
        }
    }
}

/// Resolves the spender of each row of one file
#[derive(Debug, Clone)]
pub struct SpenderResolver<'a> {
    profile: &'a UserProfile,
    file_default: String,
}

impl<'a> SpenderResolver<'a> {
    pub fn new(profile: &'a UserProfile, file_content: &str) -> Self {
        Self {
            profile,
            file_default: profile.file_default(file_content),
        }
    }

    /// First matching card pattern in any of the texts, else the file default
    pub fn resolve(&self, texts: &[&str]) -> String {
        texts
            .iter()
            .find_map(|t| self.profile.match_card(t))
            .map(str::to_string)
            .unwrap_or_else(|| self.file_default.clone())
    }

    pub fn file_default(&self) -> &str {
        &self.file_default
    }
}
