//! Financial summary over a set of transactions

use serde::Serialize;

use crate::models::Transaction;

/// Totals for a period
///
/// `expenses` and `savings` are reported as positive numbers. `net` is
/// income minus expenses; money moved to savings still counts toward it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FinancialSummary {
    pub income: f64,
    pub expenses: f64,
    pub savings: f64,
    pub net: f64,
    pub count: usize,
}

pub fn summarize(transactions: &[Transaction]) -> FinancialSummary {
    if transactions.is_empty() {
        return FinancialSummary::default();
    }

    let mut income = 0.0;
    let mut savings = 0.0;
    let mut expenses_net = 0.0;

    for tx in transactions {
        let category = tx.category;
        if category.is_income() {
            income += tx.amount;
        } else if category.is_savings() {
            savings += tx.amount;
        } else if !category.is_ignored_for_expenses() {
            // Refunds and uncategorized credits offset spending
            expenses_net += tx.amount;
        }
    }

    FinancialSummary {
        income,
        expenses: f64::abs(expenses_net),
        savings: f64::abs(savings),
        net: income + expenses_net,
        count: transactions.len(),
    }
}
