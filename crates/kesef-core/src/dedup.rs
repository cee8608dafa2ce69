//! Duplicate detection
//!
//! Exact duplicates share an identity hash and never reach this module. What
//! is left are records describing the same money movement in different words:
//! the bank's card-payoff line next to the card statement, the same account
//! exported once as Excel and once as PDF, and so on. Pairs are scored with
//! additive evidence and grouped transitively.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::models::{Category, DuplicateGroup, NearDuplicate, Transaction};
use crate::normalize::normalize_description;

const SAME_DATE: f64 = 0.30;
const SAME_AMOUNT: f64 = 0.35;
const CLOSE_AMOUNT: f64 = 0.25;
const CLOSE_AMOUNT_TOLERANCE: f64 = 0.05;
const DESCRIPTION_STRONG: f64 = 0.25;
const DESCRIPTION_WEAK: f64 = 0.15;
const SOURCE_OVERLAP: f64 = 0.20;
const SAME_SPENDER: f64 = 0.05;

/// Similarity ratio of two strings in `[0, 1]`
///
/// Twice the number of matched characters over the total length, where
/// matches are found by repeatedly taking the longest common block and
/// recursing on both sides of it. Two empty strings are identical.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, size) = longest_block(a, b);
    if size == 0 {
        return 0;
    }
    size + matched_chars(&a[..i], &b[..j]) + matched_chars(&a[i + size..], &b[j + size..])
}

/// Longest common contiguous block; ties go to the earliest position in `a`
fn longest_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut cur = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                cur[j + 1] = prev[j] + 1;
                let size = cur[j + 1];
                if size > best.2 {
                    best = (i + 1 - size, j + 1 - size, size);
                }
            }
        }
        prev = cur;
    }
    best
}

/// Score how likely two records describe the same money movement
///
/// Returns the confidence (capped at 1.0, two decimals) and a `"; "`-joined
/// list of the evidence that fired.
pub fn duplicate_confidence(a: &Transaction, b: &Transaction) -> (f64, String) {
    let mut score: f64 = 0.0;
    let mut reasons: Vec<String> = Vec::new();

    if a.date == b.date {
        score += SAME_DATE;
        reasons.push("same date".into());
    }

    let (amount_a, amount_b) = (a.amount.abs(), b.amount.abs());
    if (amount_a - amount_b).abs() < 0.005 {
        score += SAME_AMOUNT;
        reasons.push("same amount".into());
    } else if amount_a > 0.0 && (amount_a - amount_b).abs() / amount_a < CLOSE_AMOUNT_TOLERANCE {
        score += CLOSE_AMOUNT;
        reasons.push("similar amount".into());
    }

    let ratio = sequence_ratio(
        &normalize_description(&a.description),
        &normalize_description(&b.description),
    );
    if ratio > 0.8 {
        score += DESCRIPTION_STRONG;
        reasons.push(format!("desc {}%", (ratio * 100.0).floor()));
    } else if ratio > 0.6 {
        score += DESCRIPTION_WEAK;
        reasons.push(format!("desc {}%", (ratio * 100.0).floor()));
    }

    if let Some(overlap) = source_overlap(a, b) {
        score += SOURCE_OVERLAP;
        reasons.push(overlap.into());
    }

    match (&a.spender, &b.spender) {
        (Some(x), Some(y)) if !x.is_empty() && x == y => {
            score += SAME_SPENDER;
            reasons.push("same owner".into());
        }
        _ => {}
    }

    let confidence = (score.min(1.0) * 100.0).round() / 100.0;
    (confidence, reasons.join("; "))
}

fn source_overlap(a: &Transaction, b: &Transaction) -> Option<&'static str> {
    let payoff_vs_card = |bank: &Transaction, card: &Transaction| {
        bank.source_file.is_bank()
            && bank.category == Category::CreditCardPayoff
            && card.source_file.is_card()
    };
    if payoff_vs_card(a, b) || payoff_vs_card(b, a) {
        return Some("bank↔cc overlap");
    }
    if a.source_file.class() == b.source_file.class() && a.source_file != b.source_file {
        return Some("multi-format");
    }
    None
}

/// True if a reviewer marked the pair as distinct (in either direction)
pub fn marked_distinct(a: &Transaction, b: &Transaction) -> bool {
    a.not_duplicate_of.contains(&b.identity_hash) || b.not_duplicate_of.contains(&a.identity_hash)
}

/// Compare a candidate against stored records near its date
///
/// `window` should already be limited to the candidate's date range. Results
/// at or above `threshold` are returned, strongest first.
pub fn check_near_duplicates(
    candidate: &Transaction,
    window: &[Transaction],
    threshold: f64,
) -> Vec<NearDuplicate> {
    let mut found: Vec<NearDuplicate> = window
        .iter()
        .filter(|existing| existing.identity_hash != candidate.identity_hash)
        .filter(|existing| !marked_distinct(candidate, existing))
        .filter_map(|existing| {
            let (confidence, reason) = duplicate_confidence(candidate, existing);
            (confidence >= threshold).then(|| NearDuplicate {
                existing: existing.clone(),
                confidence,
                reason,
            })
        })
        .collect();

    found.sort_by(|x, y| y.confidence.total_cmp(&x.confidence));
    found
}

/// Disjoint-set forest over snapshot indices
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

/// Scan a snapshot for groups of likely duplicates
///
/// Only records sharing a date and an absolute amount (to the cent) are
/// compared; within such a bucket every pair is scored. Pairs at or above
/// `threshold` are joined transitively, so A~B and B~C put all three in one
/// group even when A and C alone score low. Each group reports its strongest
/// pair. Groups are sorted by confidence, strongest first.
pub fn find_potential_duplicates(snapshot: &[Transaction], threshold: f64) -> Vec<DuplicateGroup> {
    let mut buckets: HashMap<(NaiveDate, i64), Vec<usize>> = HashMap::new();
    for (idx, tx) in snapshot.iter().enumerate() {
        let cents = (tx.amount.abs() * 100.0).round() as i64;
        buckets.entry((tx.date, cents)).or_default().push(idx);
    }

    let mut sets = UnionFind::new(snapshot.len());
    let mut pairs = Vec::new();

    for members in buckets.values().filter(|m| m.len() > 1) {
        for (pos, &i) in members.iter().enumerate() {
            for &j in &members[pos + 1..] {
                let (a, b) = (&snapshot[i], &snapshot[j]);
                if a.identity_hash == b.identity_hash || marked_distinct(a, b) {
                    continue;
                }
                let (confidence, reason) = duplicate_confidence(a, b);
                if confidence >= threshold {
                    sets.union(i, j);
                    pairs.push((i, j, confidence, reason));
                }
            }
        }
    }

    // Strongest pair per group, keyed by the group's root
    let mut strongest: HashMap<usize, (f64, String)> = HashMap::new();
    for (i, j, confidence, reason) in pairs {
        debug!(
            "Duplicate pair {} ~ {} ({:.2})",
            snapshot[i].identity_hash, snapshot[j].identity_hash, confidence
        );
        let root = sets.find(i);
        match strongest.get(&root) {
            Some((best, _)) if *best >= confidence => {}
            _ => {
                strongest.insert(root, (confidence, reason));
            }
        }
    }

    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for idx in 0..snapshot.len() {
        let root = sets.find(idx);
        if strongest.contains_key(&root) {
            members.entry(root).or_default().push(idx);
        }
    }

    let mut groups: Vec<DuplicateGroup> = members
        .into_iter()
        .filter_map(|(root, indices)| {
            let (confidence, reason) = strongest.remove(&root)?;
            Some(DuplicateGroup {
                transactions: indices.into_iter().map(|i| snapshot[i].clone()).collect(),
                confidence,
                reason,
            })
        })
        .collect();

    groups.sort_by(|x, y| {
        y.confidence
            .total_cmp(&x.confidence)
            .then_with(|| x.transactions[0].date.cmp(&y.transactions[0].date))
    });
    debug!("Found {} potential duplicate groups", groups.len());
    groups
}
