//! Ledger records: transactions, subscriptions, loans and notifications
//!
//! Users are identified by their normalized (trimmed, lower-cased) email.

mod insights;

pub use insights::{CategorySpend, Insights, MonthSummary};

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Exclusive upper bound for a single recorded amount; fits `NUMERIC(14, 2)`
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0); // 1_000_000_000_000

/// Sum amounts, saturating at `Decimal::MAX` instead of overflowing
pub fn total<I>(amounts: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    amounts
        .into_iter()
        .fold(Decimal::ZERO, |sum, amount| sum.checked_add(amount).unwrap_or(Decimal::MAX))
}

/// Normalize an email address into a user key
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Expense,
    Income,
}

impl TransactionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "expense" => Some(Self::Expense),
            "income" => Some(Self::Income),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Expense => write!(f, "expense"),
            TransactionKind::Income => write!(f, "income"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user: String,
    pub kind: TransactionKind,
    /// Always positive; `kind` carries the sign
    pub amount: Decimal,
    pub category: String,
    pub note: Option<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        user: &str,
        kind: TransactionKind,
        amount: Decimal,
        category: &str,
        note: Option<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: normalize_email(user),
            kind,
            amount,
            category: category.trim().to_string(),
            note,
            date,
            created_at: Utc::now(),
        }
    }

    /// Amount with sign applied (expenses negative)
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Expense => -self.amount,
            TransactionKind::Income => self.amount,
        }
    }
}

/// Billing cadence of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Monthly,
    Yearly,
}

impl Cadence {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    /// The `n`th billing date counted from `anchor` (n = 0 is the anchor itself)
    ///
    /// Month arithmetic is done from the anchor each time, so a subscription
    /// started on the 31st bills on the last day of shorter months and
    /// returns to the 31st afterwards.
    pub fn nth_date(&self, anchor: NaiveDate, n: u32) -> Option<NaiveDate> {
        match self {
            Cadence::Weekly => anchor.checked_add_days(Days::new(7 * u64::from(n))),
            Cadence::Monthly => anchor.checked_add_months(Months::new(n)),
            Cadence::Yearly => anchor.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// Amount normalized to a monthly figure, saturating on overflow
    pub fn monthly_equivalent(&self, amount: Decimal) -> Decimal {
        match self {
            Cadence::Weekly => amount
                .checked_mul(Decimal::from(52))
                .map_or(Decimal::MAX, |yearly| yearly / Decimal::from(12))
                .round_dp(2),
            Cadence::Monthly => amount,
            Cadence::Yearly => (amount / Decimal::from(12)).round_dp(2),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Weekly => write!(f, "weekly"),
            Cadence::Monthly => write!(f, "monthly"),
            Cadence::Yearly => write!(f, "yearly"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user: String,
    pub name: String,
    pub amount: Decimal,
    pub cadence: Cadence,
    /// First billing date; later ones are derived from it
    pub start_date: NaiveDate,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(user: &str, name: &str, amount: Decimal, cadence: Cadence, start_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: normalize_email(user),
            name: name.trim().to_string(),
            amount,
            cadence,
            start_date,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// The first billing date on or after `from`
    pub fn next_due(&self, from: NaiveDate) -> Option<NaiveDate> {
        if self.start_date >= from {
            return Some(self.start_date);
        }

        // Jump close to `from` before stepping so long-lived subscriptions stay cheap
        let mut n = match self.cadence {
            Cadence::Weekly => ((from - self.start_date).num_days() / 7) as u32,
            Cadence::Monthly => months_between(self.start_date, from).saturating_sub(1),
            Cadence::Yearly => (from.year() - self.start_date.year()).max(1) as u32 - 1,
        };

        loop {
            let date = self.cadence.nth_date(self.start_date, n)?;
            if date >= from {
                return Some(date);
            }
            n = n.checked_add(1)?;
        }
    }

    /// Whether this subscription bills on exactly `date`
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        self.active && self.next_due(date) == Some(date)
    }

    pub fn monthly_cost(&self) -> Decimal {
        self.cadence.monthly_equivalent(self.amount)
    }
}

fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    months.max(0) as u32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub user: String,
    /// Who the money is owed to (or by)
    pub counterparty: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub settled: bool,
    pub created_at: DateTime<Utc>,
}

impl Loan {
    pub fn new(user: &str, counterparty: &str, amount: Decimal, due_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: normalize_email(user),
            counterparty: counterparty.trim().to_string(),
            amount,
            due_date,
            settled: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user: String,
    pub title: String,
    pub body: String,
    /// Unique per user; repeated reminders for the same due item collapse
    pub dedupe_key: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(user: &str, title: String, body: String, dedupe_key: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: normalize_email(user),
            title,
            body,
            dedupe_key,
            created_at: Utc::now(),
            read: false,
        }
    }
}

/// Format an amount for display with two decimal places
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_monthly_next_due_clamps_to_month_end() {
        let sub = Subscription::new("a@b.c", "Rent", dec("100"), Cadence::Monthly, date("2024-01-31"));

        assert_eq!(sub.next_due(date("2024-01-31")), Some(date("2024-01-31")));
        assert_eq!(sub.next_due(date("2024-02-01")), Some(date("2024-02-29")));
        assert_eq!(sub.next_due(date("2024-03-01")), Some(date("2024-03-31")));
        assert_eq!(sub.next_due(date("2024-04-01")), Some(date("2024-04-30")));
    }

    #[test]
    fn test_weekly_next_due() {
        let sub = Subscription::new("a@b.c", "Milk", dec("5"), Cadence::Weekly, date("2024-05-01"));

        assert_eq!(sub.next_due(date("2024-05-02")), Some(date("2024-05-08")));
        assert_eq!(sub.next_due(date("2024-05-08")), Some(date("2024-05-08")));
        assert_eq!(sub.next_due(date("2024-06-30")), Some(date("2024-07-03")));
    }

    #[test]
    fn test_yearly_next_due() {
        let sub = Subscription::new("a@b.c", "Domain", dec("12"), Cadence::Yearly, date("2020-02-29"));

        assert_eq!(sub.next_due(date("2021-01-01")), Some(date("2021-02-28")));
        assert_eq!(sub.next_due(date("2024-01-01")), Some(date("2024-02-29")));
    }

    #[test]
    fn test_future_start_is_next_due() {
        let sub = Subscription::new("a@b.c", "Gym", dec("30"), Cadence::Monthly, date("2030-01-15"));
        assert_eq!(sub.next_due(date("2024-01-01")), Some(date("2030-01-15")));
    }

    #[test]
    fn test_inactive_never_due() {
        let mut sub = Subscription::new("a@b.c", "Gym", dec("30"), Cadence::Monthly, date("2024-01-15"));
        assert!(sub.is_due_on(date("2024-02-15")));
        sub.active = false;
        assert!(!sub.is_due_on(date("2024-02-15")));
    }

    #[test]
    fn test_monthly_equivalent() {
        assert_eq!(Cadence::Monthly.monthly_equivalent(dec("9.99")), dec("9.99"));
        assert_eq!(Cadence::Yearly.monthly_equivalent(dec("120")), dec("10"));
        assert_eq!(Cadence::Weekly.monthly_equivalent(dec("3")), dec("13"));
    }

    #[test]
    fn test_monthly_equivalent_saturates() {
        assert_eq!(Cadence::Weekly.monthly_equivalent(Decimal::MAX), Decimal::MAX);
        assert_eq!(Cadence::Weekly.monthly_equivalent(MAX_AMOUNT), dec("4333333333333.33"));
    }

    #[test]
    fn test_total_saturates() {
        assert_eq!(total([dec("1.25"), dec("2.75")]), dec("4"));
        assert_eq!(total([Decimal::MAX, dec("1")]), Decimal::MAX);
        assert_eq!(total([Decimal::MAX, Decimal::MAX, dec("0.01")]), Decimal::MAX);
        assert_eq!(total(Vec::new()), Decimal::ZERO);
    }

    #[test]
    fn test_signed_amount_and_normalized_user() {
        let tx = Transaction::new(
            "  Asha@Example.COM ",
            TransactionKind::Expense,
            dec("12.50"),
            " Food ",
            None,
            date("2024-05-01"),
        );
        assert_eq!(tx.user, "asha@example.com");
        assert_eq!(tx.category, "Food");
        assert_eq!(tx.signed_amount(), dec("-12.50"));
    }

    #[test]
    fn test_kind_and_cadence_parse() {
        assert_eq!(TransactionKind::parse("Income"), Some(TransactionKind::Income));
        assert_eq!(TransactionKind::parse("gift"), None);
        assert_eq!(Cadence::parse("YEARLY"), Some(Cadence::Yearly));
        assert_eq!(Cadence::parse("daily"), None);
    }
}
