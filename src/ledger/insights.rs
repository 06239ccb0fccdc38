//! Month summaries and per-category spend

use crate::ledger::{total, Subscription, Transaction, TransactionKind};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Income, expense and net for one calendar month
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthSummary {
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorySpend {
    pub category: String,
    pub total: Decimal,
    /// Share of the month's expense, 0..=100, two decimal places
    pub percent: Decimal,
}

/// Derived figures for the insights page and dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct Insights {
    pub year: i32,
    pub month: u32,
    pub summary: MonthSummary,
    /// Expense categories, largest first
    pub categories: Vec<CategorySpend>,
    /// Sum of active subscriptions normalized to a month
    pub subscription_burn: Decimal,
}

fn in_month(date: NaiveDate, year: i32, month: u32) -> bool {
    date.year() == year && date.month() == month
}

/// `part` as a percentage of `whole`; `whole` must be non-zero
fn share_percent(part: Decimal, whole: Decimal) -> Decimal {
    match part.checked_mul(Decimal::from(100)) {
        Some(scaled) => (scaled / whole).round_dp(2),
        None => (part / whole * Decimal::from(100)).round_dp(2),
    }
}

impl MonthSummary {
    pub fn compute(transactions: &[Transaction], year: i32, month: u32) -> Self {
        let mut summary = MonthSummary::default();

        for tx in transactions.iter().filter(|t| in_month(t.date, year, month)) {
            match tx.kind {
                TransactionKind::Income => summary.income = total([summary.income, tx.amount]),
                TransactionKind::Expense => summary.expense = total([summary.expense, tx.amount]),
            }
            summary.count += 1;
        }

        summary.net = summary
            .income
            .checked_sub(summary.expense)
            .unwrap_or(Decimal::MIN);
        summary
    }
}

impl Insights {
    pub fn compute(
        transactions: &[Transaction],
        subscriptions: &[Subscription],
        year: i32,
        month: u32,
    ) -> Self {
        let summary = MonthSummary::compute(transactions, year, month);

        let mut by_category: HashMap<&str, Decimal> = HashMap::new();
        for tx in transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Expense && in_month(t.date, year, month))
        {
            let spent = by_category.entry(tx.category.as_str()).or_default();
            *spent = total([*spent, tx.amount]);
        }

        let mut categories: Vec<CategorySpend> = by_category
            .into_iter()
            .map(|(category, total)| {
                let percent = if summary.expense.is_zero() {
                    Decimal::ZERO
                } else {
                    share_percent(total, summary.expense)
                };
                CategorySpend {
                    category: category.to_string(),
                    total,
                    percent,
                }
            })
            .collect();
        categories.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category.cmp(&b.category)));

        let subscription_burn = total(
            subscriptions
                .iter()
                .filter(|s| s.active)
                .map(Subscription::monthly_cost),
        );

        Self {
            year,
            month,
            summary,
            categories,
            subscription_burn,
        }
    }
}
