//! Parse-time category inference
//!
//! Keyword rules run in a fixed priority order against the search text of a
//! row (lowercased, possibly with its reversed form appended). The first rule
//! whose amount condition and keywords match decides the category. This is a
//! best-effort default that manual edits or AI re-categorization override.

use regex::Regex;
use tracing::warn;

use crate::models::Category;
use crate::profile::UserProfile;

/// Which rule table applies to a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSet {
    Bank,
    Card,
}

/// Amount condition of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum When {
    Any,
    Positive,
    Negative,
}

impl When {
    fn accepts(&self, amount: f64) -> bool {
        match self {
            Self::Any => true,
            Self::Positive => amount > 0.0,
            Self::Negative => amount < 0.0,
        }
    }
}

/// A single keyword
///
/// Latin keywords match whole words only, so "max" does not fire on
/// "maxim" and "cal" not on "local". Hebrew keywords and digit runs are plain
/// substrings.
#[derive(Debug, Clone)]
enum Keyword {
    Contains(String),
    Word(Regex),
}

impl Keyword {
    fn new(keyword: &str) -> Self {
        let lowered = keyword.to_lowercase();
        if !lowered.chars().any(|c| c.is_ascii_alphabetic()) {
            return Self::Contains(lowered);
        }
        match Regex::new(&format!(r"\b{}\b", regex::escape(&lowered))) {
            Ok(re) => Self::Word(re),
            Err(e) => {
                warn!("Keyword '{}' falls back to substring match: {}", keyword, e);
                Self::Contains(lowered)
            }
        }
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Self::Contains(k) => text.contains(k.as_str()),
            Self::Word(re) => re.is_match(text),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    /// Short label reported by `Categorizer::reason`
    name: &'static str,
    category: Category,
    when: When,
    /// Empty means the rule matches on the amount condition alone
    keywords: Vec<Keyword>,
}

impl Rule {
    fn new(name: &'static str, category: Category, when: When, keywords: &[&str]) -> Self {
        Self {
            name,
            category,
            when,
            keywords: keywords.iter().map(|k| Keyword::new(k)).collect(),
        }
    }

    fn with_cards(mut self, profile: &UserProfile) -> Self {
        self.keywords
            .extend(profile.card_numbers().filter(|n| !n.is_empty()).map(Keyword::new));
        self
    }

    fn matches(&self, text: &str, amount: f64) -> bool {
        self.when.accepts(amount)
            && (self.keywords.is_empty() || self.keywords.iter().any(|k| k.matches(text)))
    }
}

const SALARY: &[&str] = &["משכורת", "salary", "ממופ\"ת", "מופ\"ת", "מופת"];
const BENEFITS: &[&str] = &["ביטוח לאומי", "בטוח לאומי", "ב\"ל", "מילואים", "מענק"];
const PENSION: &[&str] = &["משהבט", "קופ\"ג", "פנסיה"];
const INTEREST: &[&str] = &["ריבית"];
const CARD_REFUND: &[&str] = &["כרטיס", "ישראכרט"];
const INTERNAL_TRANSFER: &[&str] = &["הפועלים", "מזרחי", "לחשבון", "withdrawal"];
const PAYMENT_TRANSFER: &[&str] = &["העברה", "bit", "paybox"];
const SAVINGS_WITHDRAWAL: &[&str] = &["משיכה מחיסכון", "פירעון"];
const CARD_ISSUERS: &[&str] = &[
    "isracard", "ישראכרט", "max", "מקס", "cal", "כאל", "visa", "ויזה", "amex",
];

/// Rule tables for bank and card sources
#[derive(Debug, Clone)]
pub struct Categorizer {
    bank: Vec<Rule>,
    card: Vec<Rule>,
}

impl Categorizer {
    /// Build the rule tables; card numbers from the profile count as card keywords
    pub fn new(profile: &UserProfile) -> Self {
        let bank = vec![
            Rule::new("salary", Category::Salary, When::Any, SALARY),
            Rule::new("benefits", Category::Benefits, When::Any, BENEFITS),
            Rule::new("pension", Category::Income, When::Any, PENSION),
            Rule::new("interest", Category::Interest, When::Any, INTEREST),
            Rule::new("card refund", Category::Refund, When::Positive, CARD_REFUND)
                .with_cards(profile),
            Rule::new("internal transfer", Category::Transfer, When::Positive, INTERNAL_TRANSFER),
            Rule::new("payment transfer", Category::Income, When::Positive, PAYMENT_TRANSFER),
            Rule::new("savings withdrawal", Category::Income, When::Positive, SAVINGS_WITHDRAWAL),
            Rule::new("other income", Category::Income, When::Positive, &[]),
            Rule::new("card payoff", Category::CreditCardPayoff, When::Negative, CARD_ISSUERS)
                .with_cards(profile),
        ];
        // Card statements only tell refunds apart; everything else is left for
        // manual or AI categorization
        let card = vec![Rule::new("refund", Category::Refund, When::Positive, &[])];

        Self { bank, card }
    }

    fn first_match(&self, rules: RuleSet, search_text: &str, amount: f64) -> Option<&Rule> {
        let table = match rules {
            RuleSet::Bank => &self.bank,
            RuleSet::Card => &self.card,
        };
        table.iter().find(|rule| rule.matches(search_text, amount))
    }

    /// Category for a row; `search_text` must already be lowercased
    pub fn categorize(&self, rules: RuleSet, search_text: &str, amount: f64) -> Category {
        self.first_match(rules, search_text, amount)
            .map(|rule| rule.category)
            .unwrap_or_default()
    }

    /// Label of the rule that decides the category, `None` when nothing matched
    pub fn reason(&self, rules: RuleSet, search_text: &str, amount: f64) -> Option<&'static str> {
        self.first_match(rules, search_text, amount).map(|rule| rule.name)
    }
}
