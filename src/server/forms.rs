//! Form input for the ledger pages
//!
//! Fields arrive as raw strings so a bad value re-renders the form with a
//! message instead of failing extraction.

use crate::ledger::{Cadence, Loan, Subscription, Transaction, TransactionKind, MAX_AMOUNT};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const AMOUNT_MESSAGE: &str = "Enter an amount greater than zero.";
const AMOUNT_LIMIT_MESSAGE: &str = "Enter an amount below 1,000,000,000,000.";
const DATE_MESSAGE: &str = "Enter a valid date.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignInForm {
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

/// Parse a positive amount below [`MAX_AMOUNT`], rounded to two decimal places
fn parse_amount(raw: &str) -> Result<Decimal, &'static str> {
    let amount: Decimal = raw.trim().replace(',', "").parse().map_err(|_| AMOUNT_MESSAGE)?;
    let amount = amount.round_dp(2);
    if amount <= Decimal::ZERO {
        return Err(AMOUNT_MESSAGE);
    }
    if amount >= MAX_AMOUNT {
        return Err(AMOUNT_LIMIT_MESSAGE);
    }
    Ok(amount)
}

/// Parse an ISO date; a blank field falls back to `default`
fn parse_date(raw: &str, default: Option<NaiveDate>) -> Result<NaiveDate, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return default.ok_or(DATE_MESSAGE);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| DATE_MESSAGE)
}

fn required<'a>(raw: &'a str, message: &'static str) -> Result<&'a str, &'static str> {
    let value = raw.trim();
    if value.is_empty() {
        Err(message)
    } else {
        Ok(value)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionForm {
    pub kind: String,
    pub amount: String,
    pub category: String,
    pub note: String,
    pub date: String,
}

impl TransactionForm {
    /// Blank form with the date prefilled
    pub fn blank(today: NaiveDate) -> Self {
        Self {
            kind: TransactionKind::Expense.to_string(),
            date: today.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self, user: &str, today: NaiveDate) -> Result<Transaction, &'static str> {
        let kind = TransactionKind::parse(self.kind.trim()).ok_or("Choose expense or income.")?;
        let amount = parse_amount(&self.amount)?;
        let category = required(&self.category, "Enter a category.")?;
        let date = parse_date(&self.date, Some(today))?;
        let note = Some(self.note.trim()).filter(|n| !n.is_empty()).map(str::to_string);

        Ok(Transaction::new(user, kind, amount, category, note, date))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionForm {
    pub name: String,
    pub amount: String,
    pub cadence: String,
    pub start_date: String,
}

impl SubscriptionForm {
    pub fn blank(today: NaiveDate) -> Self {
        Self {
            cadence: Cadence::Monthly.to_string(),
            start_date: today.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self, user: &str, today: NaiveDate) -> Result<Subscription, &'static str> {
        let name = required(&self.name, "Enter a name.")?;
        let amount = parse_amount(&self.amount)?;
        let cadence = Cadence::parse(self.cadence.trim()).ok_or("Choose a billing cadence.")?;
        let start_date = parse_date(&self.start_date, Some(today))?;

        Ok(Subscription::new(user, name, amount, cadence, start_date))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoanForm {
    pub counterparty: String,
    pub amount: String,
    pub due_date: String,
}

impl LoanForm {
    pub fn validate(&self, user: &str) -> Result<Loan, &'static str> {
        let counterparty = required(&self.counterparty, "Enter who the loan is with.")?;
        let amount = parse_amount(&self.amount)?;
        let due_date = parse_date(&self.due_date, None)?;

        Ok(Loan::new(user, counterparty, amount, due_date))
    }
}
