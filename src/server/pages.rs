//! Page handlers

use crate::auth::{AuthError, SessionToken, TokenError};
use crate::cn;
use crate::ledger::{
    format_amount, total, Insights, Loan, MonthSummary, Notification, Subscription, Transaction,
};
use crate::server::error::AppError;
use crate::server::forms::{
    LoanForm, SignInForm, SubscriptionForm, TransactionForm, VerifyQuery,
};
use crate::server::router::title;
use crate::server::views::amount_class;
use crate::server::AppState;
use crate::session::{session_cookie, Session};
use crate::signin::{SubmitOutcome, SIGN_IN_SENT_MESSAGE};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use chrono::{Datelike, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Shown when a sign-in link fails verification
pub const INVALID_LINK_MESSAGE: &str = "This sign-in link is invalid or has expired. Request a new one.";

/// How far ahead the dashboard lists due dates
const UPCOMING_DAYS: u64 = 30;
const RECENT_TRANSACTIONS: usize = 5;

type PageResult = Result<Response, AppError>;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn month_label(date: NaiveDate) -> String {
    date.format("%B %Y").to_string()
}

fn page(status: StatusCode, html: String) -> Response {
    (status, Html(html)).into_response()
}

// View models

#[derive(Debug, Serialize)]
struct SignInView<'a> {
    email: &'a str,
    status: Option<&'a str>,
    status_class: String,
}

impl<'a> SignInView<'a> {
    fn new(email: &'a str, status: Option<&'a str>) -> Self {
        let failed = status.is_some_and(|s| s != SIGN_IN_SENT_MESSAGE);
        Self {
            email,
            status,
            status_class: cn!("mt-4 text-sm", [("text-red-600", failed), ("text-slate-600", !failed)]),
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryView {
    income: String,
    expense: String,
    net: String,
    net_class: String,
    count: usize,
}

impl From<&MonthSummary> for SummaryView {
    fn from(s: &MonthSummary) -> Self {
        let negative = s.net < Decimal::ZERO;
        Self {
            income: format_amount(s.income),
            expense: format_amount(s.expense),
            net: format_amount(s.net),
            net_class: cn!(
                "text-xl font-semibold",
                [("text-red-600", negative), ("text-emerald-700", !negative)]
            ),
            count: s.count,
        }
    }
}

#[derive(Debug, Serialize)]
struct TransactionRow {
    date: String,
    category: String,
    note: Option<String>,
    amount: String,
    amount_class: String,
}

impl From<&Transaction> for TransactionRow {
    fn from(tx: &Transaction) -> Self {
        let signed = tx.signed_amount();
        Self {
            date: tx.date.to_string(),
            category: tx.category.clone(),
            note: tx.note.clone(),
            amount: format_amount(signed),
            amount_class: amount_class(signed < Decimal::ZERO),
        }
    }
}

#[derive(Debug, Serialize)]
struct NotificationView {
    title: String,
    body: String,
}

impl From<&Notification> for NotificationView {
    fn from(n: &Notification) -> Self {
        Self {
            title: n.title.clone(),
            body: n.body.clone(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct UpcomingItem {
    label: String,
    date: NaiveDate,
    amount: String,
}

/// Subscription renewals and open loans due within `days` of `today`, soonest first
fn upcoming(subscriptions: &[Subscription], loans: &[Loan], today: NaiveDate, days: u64) -> Vec<UpcomingItem> {
    let Some(horizon) = today.checked_add_days(Days::new(days)) else {
        return Vec::new();
    };

    let renewals = subscriptions
        .iter()
        .filter(|s| s.active)
        .filter_map(|s| {
            let due = s.next_due(today).filter(|d| *d <= horizon)?;
            Some(UpcomingItem {
                label: format!("{} renewal", s.name),
                date: due,
                amount: format_amount(s.amount),
            })
        });

    let loans = loans
        .iter()
        .filter(|l| !l.settled && l.due_date >= today && l.due_date <= horizon)
        .map(|l| UpcomingItem {
            label: format!("Loan with {}", l.counterparty),
            date: l.due_date,
            amount: format_amount(l.amount),
        });

    let mut items: Vec<UpcomingItem> = renewals.chain(loans).collect();
    items.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.label.cmp(&b.label)));
    items
}

#[derive(Debug, Serialize)]
struct SubscriptionRow {
    name: String,
    amount: String,
    cadence: String,
    next_due: Option<NaiveDate>,
    monthly: String,
}

#[derive(Debug, Serialize)]
struct LoanRow {
    id: Uuid,
    counterparty: String,
    amount: String,
    due_date: NaiveDate,
    settled: bool,
    class: String,
}

impl From<&Loan> for LoanRow {
    fn from(l: &Loan) -> Self {
        Self {
            id: l.id,
            counterparty: l.counterparty.clone(),
            amount: format_amount(l.amount),
            due_date: l.due_date,
            settled: l.settled,
            class: cn!("text-sm", [("text-slate-400 line-through", l.settled)]),
        }
    }
}

// Gate views

/// Neutral page served while the session is unresolved; the browser retries
pub fn waiting_page(state: &AppState, path: &str) -> Response {
    match state.views.render("waiting.html", title(path), path, None, ()) {
        Ok(html) => (
            [
                (HeaderName::from_static("refresh"), "2"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            Html(html),
        )
            .into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

/// Sign-in form served in place of a protected page
pub fn sign_in_required(state: &AppState) -> Response {
    match state
        .views
        .render("signin.html", "Sign in", "/signin", None, SignInView::new("", None))
    {
        Ok(html) => page(StatusCode::UNAUTHORIZED, html),
        Err(e) => AppError::from(e).into_response(),
    }
}

// Public pages

pub async fn home(State(state): State<AppState>, headers: HeaderMap) -> PageResult {
    let session_state = state.sessions.resolve_headers(&headers).await;
    let user = session_state.session().map(|s| s.email.as_str());
    let html = state.views.render(
        "home.html",
        "Home",
        "/",
        user,
        minijinja::context! { signed_in => user.is_some() },
    )?;
    Ok(page(StatusCode::OK, html))
}

pub async fn sign_in_page(State(state): State<AppState>, headers: HeaderMap) -> PageResult {
    if state.sessions.resolve_headers(&headers).await.is_authenticated() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    let html = state
        .views
        .render("signin.html", "Sign in", "/signin", None, SignInView::new("", None))?;
    Ok(page(StatusCode::OK, html))
}

pub async fn sign_in(State(state): State<AppState>, Form(form): Form<SignInForm>) -> PageResult {
    // Dropping this handler (client went away) cancels the in-flight request
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let (outcome, status) = state.sign_in.submit(&form.email, &cancel).await;
    debug!(outcome = ?outcome, "Sign-in submitted");

    let code = match outcome {
        SubmitOutcome::Rejected => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };
    let html = state.views.render(
        "signin.html",
        "Sign in",
        "/signin",
        None,
        SignInView::new(form.email.trim(), status.as_deref()),
    )?;
    Ok(page(code, html))
}

pub async fn verify_link(State(state): State<AppState>, Query(query): Query<VerifyQuery>) -> PageResult {
    let token = query.token.unwrap_or_default();

    let result = if token.is_empty() {
        Err(AuthError::Token(TokenError::InvalidFormat))
    } else {
        state.auth.complete(&token).await
    };

    match result {
        Ok((session, _)) => Ok((
            AppendHeaders([(header::SET_COOKIE, state.cookies.set(&session))]),
            Redirect::to("/dashboard"),
        )
            .into_response()),
        Err(AuthError::Token(_) | AuthError::LinkUsed) => {
            let html = state.views.render(
                "signin.html",
                "Sign in",
                "/signin",
                None,
                SignInView::new("", Some(INVALID_LINK_MESSAGE)),
            )?;
            Ok(page(StatusCode::BAD_REQUEST, html))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> PageResult {
    if let Some(token) = session_cookie(&headers).and_then(|raw| SessionToken::parse(raw).ok()) {
        state.auth.sign_out(&token).await?;
    }
    Ok((
        AppendHeaders([(header::SET_COOKIE, state.cookies.clear())]),
        Redirect::to("/"),
    )
        .into_response())
}

// Protected pages

pub async fn dashboard(State(state): State<AppState>, Extension(session): Extension<Session>) -> PageResult {
    let today = today();
    let user = session.email.as_str();

    let transactions = state.ledger.list_transactions(user).await?;
    let subscriptions = state.ledger.list_subscriptions(user).await?;
    let loans = state.ledger.list_loans(user).await?;
    let notifications = state.notifications.list_notifications(user, true).await?;

    let summary = MonthSummary::compute(&transactions, today.year(), today.month());
    let html = state.views.render(
        "dashboard.html",
        "Dashboard",
        "/dashboard",
        Some(user),
        minijinja::context! {
            month => month_label(today),
            summary => SummaryView::from(&summary),
            transactions => transactions.iter().take(RECENT_TRANSACTIONS).map(TransactionRow::from).collect::<Vec<_>>(),
            upcoming => upcoming(&subscriptions, &loans, today, UPCOMING_DAYS),
            notifications => notifications.iter().map(NotificationView::from).collect::<Vec<_>>(),
        },
    )?;
    Ok(page(StatusCode::OK, html))
}

async fn render_transactions(
    state: &AppState,
    session: &Session,
    form: &TransactionForm,
    error: Option<&str>,
) -> Result<String, AppError> {
    let transactions = state.ledger.list_transactions(&session.email).await?;
    Ok(state.views.render(
        "transactions.html",
        "Transactions",
        "/transactions",
        Some(&session.email),
        minijinja::context! {
            form => form,
            error => error,
            transactions => transactions.iter().map(TransactionRow::from).collect::<Vec<_>>(),
        },
    )?)
}

pub async fn transactions(State(state): State<AppState>, Extension(session): Extension<Session>) -> PageResult {
    let html = render_transactions(&state, &session, &TransactionForm::blank(today()), None).await?;
    Ok(page(StatusCode::OK, html))
}

pub async fn add_transaction(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Form(form): Form<TransactionForm>,
) -> PageResult {
    match form.validate(&session.email, today()) {
        Ok(tx) => {
            state.ledger.add_transaction(&tx).await?;
            info!(user = %session.email, kind = %tx.kind, "Transaction added");
            Ok(Redirect::to("/transactions").into_response())
        }
        Err(message) => {
            let html = render_transactions(&state, &session, &form, Some(message)).await?;
            Ok(page(StatusCode::BAD_REQUEST, html))
        }
    }
}

#[derive(Default)]
struct SubscriptionForms<'a> {
    subscription: Option<&'a SubscriptionForm>,
    subscription_error: Option<&'a str>,
    loan: Option<&'a LoanForm>,
    loan_error: Option<&'a str>,
}

async fn render_subscriptions(
    state: &AppState,
    session: &Session,
    forms: SubscriptionForms<'_>,
) -> Result<String, AppError> {
    let today = today();
    let subscriptions = state.ledger.list_subscriptions(&session.email).await?;
    let loans = state.ledger.list_loans(&session.email).await?;

    let rows: Vec<SubscriptionRow> = subscriptions
        .iter()
        .filter(|s| s.active)
        .map(|s| SubscriptionRow {
            name: s.name.clone(),
            amount: format_amount(s.amount),
            cadence: s.cadence.to_string(),
            next_due: s.next_due(today),
            monthly: format_amount(s.monthly_cost()),
        })
        .collect();
    let burn = total(subscriptions.iter().filter(|s| s.active).map(Subscription::monthly_cost));

    let blank_subscription = SubscriptionForm::blank(today);
    let blank_loan = LoanForm::default();

    Ok(state.views.render(
        "subscriptions.html",
        "Subscriptions",
        "/subscriptions",
        Some(&session.email),
        minijinja::context! {
            subscriptions => rows,
            burn => format_amount(burn),
            loans => loans.iter().map(LoanRow::from).collect::<Vec<_>>(),
            subscription_form => forms.subscription.unwrap_or(&blank_subscription),
            subscription_error => forms.subscription_error,
            loan_form => forms.loan.unwrap_or(&blank_loan),
            loan_error => forms.loan_error,
        },
    )?)
}

pub async fn subscriptions(State(state): State<AppState>, Extension(session): Extension<Session>) -> PageResult {
    let html = render_subscriptions(&state, &session, SubscriptionForms::default()).await?;
    Ok(page(StatusCode::OK, html))
}

pub async fn add_subscription(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Form(form): Form<SubscriptionForm>,
) -> PageResult {
    match form.validate(&session.email, today()) {
        Ok(sub) => {
            state.ledger.add_subscription(&sub).await?;
            info!(user = %session.email, cadence = %sub.cadence, "Subscription added");
            Ok(Redirect::to("/subscriptions").into_response())
        }
        Err(message) => {
            let forms = SubscriptionForms {
                subscription: Some(&form),
                subscription_error: Some(message),
                ..SubscriptionForms::default()
            };
            let html = render_subscriptions(&state, &session, forms).await?;
            Ok(page(StatusCode::BAD_REQUEST, html))
        }
    }
}

pub async fn add_loan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Form(form): Form<LoanForm>,
) -> PageResult {
    match form.validate(&session.email) {
        Ok(loan) => {
            state.ledger.add_loan(&loan).await?;
            info!(user = %session.email, due = %loan.due_date, "Loan added");
            Ok(Redirect::to("/subscriptions").into_response())
        }
        Err(message) => {
            let forms = SubscriptionForms {
                loan: Some(&form),
                loan_error: Some(message),
                ..SubscriptionForms::default()
            };
            let html = render_subscriptions(&state, &session, forms).await?;
            Ok(page(StatusCode::BAD_REQUEST, html))
        }
    }
}

pub async fn settle_loan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> PageResult {
    state.ledger.settle_loan(&session.email, id).await?;
    info!(user = %session.email, loan = %id, "Loan settled");
    Ok(Redirect::to("/subscriptions").into_response())
}

pub async fn insights(State(state): State<AppState>, Extension(session): Extension<Session>) -> PageResult {
    let today = today();
    let transactions = state.ledger.list_transactions(&session.email).await?;
    let subscriptions = state.ledger.list_subscriptions(&session.email).await?;
    let insights = Insights::compute(&transactions, &subscriptions, today.year(), today.month());

    #[derive(Serialize)]
    struct CategoryRow {
        category: String,
        total: String,
        percent: String,
    }

    let categories: Vec<CategoryRow> = insights
        .categories
        .iter()
        .map(|c| CategoryRow {
            category: c.category.clone(),
            total: format_amount(c.total),
            percent: format_amount(c.percent),
        })
        .collect();

    let html = state.views.render(
        "insights.html",
        "Insights",
        "/insights",
        Some(&session.email),
        minijinja::context! {
            month => month_label(today),
            summary => SummaryView::from(&insights.summary),
            categories => categories,
            burn => format_amount(insights.subscription_burn),
        },
    )?;
    Ok(page(StatusCode::OK, html))
}

pub async fn settings(State(state): State<AppState>, Extension(session): Extension<Session>) -> PageResult {
    let html = state.views.render(
        "settings.html",
        "Settings",
        "/settings",
        Some(&session.email),
        minijinja::context! { schedule => &*state.schedule },
    )?;
    Ok(page(StatusCode::OK, html))
}

pub async fn mark_notifications_read(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> PageResult {
    let changed = state.notifications.mark_all_read(&session.email).await?;
    debug!(user = %session.email, changed, "Notifications marked read");
    Ok(Redirect::to("/dashboard").into_response())
}
