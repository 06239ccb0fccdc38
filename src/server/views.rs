//! HTML views
//!
//! Templates live in `templates/` and are compiled into the binary. Every
//! page extends `layout.html`, which draws the navigation bar for signed-in
//! users from the `ROUTES` table.

use crate::cn;
use crate::server::router::ROUTES;
use minijinja::{context, Environment, Value};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../../templates/layout.html")),
    ("home.html", include_str!("../../templates/home.html")),
    ("signin.html", include_str!("../../templates/signin.html")),
    ("waiting.html", include_str!("../../templates/waiting.html")),
    ("dashboard.html", include_str!("../../templates/dashboard.html")),
    ("transaction_rows.html", include_str!("../../templates/transaction_rows.html")),
    ("transactions.html", include_str!("../../templates/transactions.html")),
    ("subscriptions.html", include_str!("../../templates/subscriptions.html")),
    ("insights.html", include_str!("../../templates/insights.html")),
    ("settings.html", include_str!("../../templates/settings.html")),
];

const BUTTON_BASE: &str = "inline-flex items-center rounded px-4 py-2 text-sm font-medium";
const NAV_LINK: &str = "rounded px-3 py-2 text-sm";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NavItem {
    pub path: &'static str,
    pub title: &'static str,
    pub class: String,
}

/// Navigation entries with the current page highlighted
pub fn nav(current_path: &str) -> Vec<NavItem> {
    ROUTES
        .iter()
        .filter(|route| route.in_nav)
        .map(|route| {
            let active = route.path == current_path;
            NavItem {
                path: route.path,
                title: route.title,
                class: cn!(
                    NAV_LINK,
                    [
                        ("bg-emerald-50 font-semibold text-emerald-700", active),
                        ("text-slate-600 hover:bg-slate-100", !active),
                    ]
                ),
            }
        })
        .collect()
}

/// Text colour for a signed amount
pub fn amount_class(negative: bool) -> String {
    cn!("py-2 text-right", [("text-red-600", negative), ("text-emerald-700", !negative)])
}

/// Compiled templates
pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> Result<Self, ViewError> {
        let mut env = Environment::new();
        for (name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }

        env.add_global(
            "buttons",
            context! {
                primary => cn!(BUTTON_BASE, "bg-emerald-600 text-white hover:bg-emerald-700"),
                secondary => cn!(BUTTON_BASE, "border bg-white text-slate-700 hover:bg-slate-50", "px-3"),
                danger => cn!(BUTTON_BASE, "bg-red-600 text-white hover:bg-red-700"),
            },
        );
        env.add_global(
            "cards",
            context! {
                base => cn!("rounded-lg border bg-white p-4", "shadow-sm"),
            },
        );

        Ok(Self { env })
    }

    /// Render `template` inside the layout
    ///
    /// The navigation bar is drawn only when `user` is set. Page-specific
    /// values are available to the template as `page`.
    pub fn render(
        &self,
        template: &str,
        title: &str,
        current_path: &str,
        user: Option<&str>,
        page: impl Serialize,
    ) -> Result<String, ViewError> {
        let nav = user.map(|_| nav(current_path)).unwrap_or_default();
        let html = self.env.get_template(template)?.render(context! {
            title => title,
            nav => nav,
            user => user,
            page => Value::from_serialize(&page),
        })?;
        Ok(html)
    }
}
