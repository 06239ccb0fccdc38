//! CSS class-name composition
//!
//! [`merge`] joins class values, skipping empty and disabled ones, and
//! resolves conflicting utility classes so the later one wins:
//! `p-4 p-8` becomes `p-8`, `px-2 p-4` becomes `p-4`, while `p-4 px-2`
//! keeps both. Variants (`hover:`, `md:`) and the `!` modifier are part of
//! the conflict key, so `p-2 md:p-4` keeps both.
//!
//! Use the [`cn!`](crate::cn) macro at call sites.

use std::collections::HashSet;

/// One argument to [`merge`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassValue<'a> {
    None,
    Str(&'a str),
    /// `(classes, enabled)` pairs; only enabled entries are emitted
    Toggles(Vec<(&'a str, bool)>),
}

impl<'a> From<&'a str> for ClassValue<'a> {
    fn from(s: &'a str) -> Self {
        ClassValue::Str(s)
    }
}

impl<'a> From<&'a String> for ClassValue<'a> {
    fn from(s: &'a String) -> Self {
        ClassValue::Str(s)
    }
}

impl<'a> From<Option<&'a str>> for ClassValue<'a> {
    fn from(s: Option<&'a str>) -> Self {
        s.map_or(ClassValue::None, ClassValue::Str)
    }
}

impl<'a> From<bool> for ClassValue<'a> {
    /// Bare booleans contribute nothing (`cond && "class"` style)
    fn from(_: bool) -> Self {
        ClassValue::None
    }
}

impl<'a, const N: usize> From<[(&'a str, bool); N]> for ClassValue<'a> {
    fn from(pairs: [(&'a str, bool); N]) -> Self {
        ClassValue::Toggles(pairs.to_vec())
    }
}

impl<'a> From<Vec<(&'a str, bool)>> for ClassValue<'a> {
    fn from(pairs: Vec<(&'a str, bool)>) -> Self {
        ClassValue::Toggles(pairs)
    }
}

/// Compose class values into a single class attribute
///
/// ```
/// use kharcha::cn;
///
/// assert_eq!(cn!("p-4", "p-8"), "p-8");
/// assert_eq!(cn!("base", None, None, "end"), "base end");
/// assert_eq!(cn!([("active-class", true), ("inactive-class", false)]), "active-class");
/// ```
#[macro_export]
macro_rules! cn {
    ($($value:expr),* $(,)?) => {
        $crate::classes::merge([$($crate::classes::ClassValue::from($value)),*])
    };
}

/// Join class values and resolve utility conflicts
pub fn merge<'a>(values: impl IntoIterator<Item = ClassValue<'a>>) -> String {
    let mut tokens: Vec<&'a str> = Vec::new();

    for value in values {
        match value {
            ClassValue::None => {}
            ClassValue::Str(s) => tokens.extend(s.split_whitespace()),
            ClassValue::Toggles(pairs) => {
                for (classes, enabled) in pairs {
                    if enabled {
                        tokens.extend(classes.split_whitespace());
                    }
                }
            }
        }
    }

    resolve_conflicts(&tokens).join(" ")
}

/// Walk backwards, dropping any class whose group a later class already claimed
fn resolve_conflicts<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let mut claimed: HashSet<(String, &'static str)> = HashSet::new();
    let mut kept: Vec<&'a str> = Vec::with_capacity(tokens.len());

    for &token in tokens.iter().rev() {
        let (modifiers, utility) = split_modifiers(token);

        let Some(group) = class_group(utility) else {
            kept.push(token);
            continue;
        };

        if claimed.contains(&(modifiers.to_string(), group)) {
            continue;
        }

        claimed.insert((modifiers.to_string(), group));
        for &conflict in conflicting_groups(group) {
            claimed.insert((modifiers.to_string(), conflict));
        }
        kept.push(token);
    }

    kept.reverse();
    kept
}

/// Split `md:hover:!p-4` into (`md:hover:!`, `p-4`)
fn split_modifiers(token: &str) -> (&str, &str) {
    // Variants end at the last ':' outside an arbitrary value like `bg-[url(a:b)]`
    let mut depth = 0usize;
    let mut split = 0;
    for (i, c) in token.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => split = i + 1,
            _ => {}
        }
    }

    let (variants, rest) = token.split_at(split);
    let bang = usize::from(rest.starts_with('!'));
    let (prefix, utility) = token.split_at(variants.len() + bang);
    (prefix, utility)
}

const FONT_SIZES: &[&str] = &[
    "xs", "sm", "base", "lg", "xl", "2xl", "3xl", "4xl", "5xl", "6xl", "7xl", "8xl", "9xl",
];
const TEXT_ALIGN: &[&str] = &["left", "center", "right", "justify", "start", "end"];
const FONT_WEIGHTS: &[&str] = &[
    "thin", "extralight", "light", "normal", "medium", "semibold", "bold", "extrabold", "black",
];
const DISPLAY: &[&str] = &[
    "block", "inline-block", "inline", "flex", "inline-flex", "grid", "inline-grid", "table",
    "contents", "hidden", "flow-root", "list-item",
];
const POSITION: &[&str] = &["static", "fixed", "absolute", "relative", "sticky"];
const BORDER_STYLES: &[&str] = &["solid", "dashed", "dotted", "double", "hidden", "none"];

/// Prefixed utilities whose value never changes the group, longest first
const PREFIX_GROUPS: &[(&str, &str)] = &[
    ("min-w-", "min-w"),
    ("max-w-", "max-w"),
    ("min-h-", "min-h"),
    ("max-h-", "max-h"),
    ("gap-x-", "gap-x"),
    ("gap-y-", "gap-y"),
    ("space-x-", "space-x"),
    ("space-y-", "space-y"),
    ("leading-", "leading"),
    ("tracking-", "tracking"),
    ("opacity-", "opacity"),
    ("shadow-", "shadow"),
    ("items-", "align-items"),
    ("justify-", "justify-content"),
    ("inset-", "inset"),
    ("gap-", "gap"),
    ("px-", "px"),
    ("py-", "py"),
    ("pt-", "pt"),
    ("pr-", "pr"),
    ("pb-", "pb"),
    ("pl-", "pl"),
    ("p-", "p"),
    ("mx-", "mx"),
    ("my-", "my"),
    ("mt-", "mt"),
    ("mr-", "mr"),
    ("mb-", "mb"),
    ("ml-", "ml"),
    ("m-", "m"),
    ("w-", "w"),
    ("h-", "h"),
    ("z-", "z"),
];

/// The conflict group of a utility class, `None` for unknown classes
fn class_group(utility: &str) -> Option<&'static str> {
    // Negative values share the positive group: `-mt-2` vs `mt-4`
    let utility = utility.strip_prefix('-').unwrap_or(utility);

    if DISPLAY.contains(&utility) {
        return Some("display");
    }
    if POSITION.contains(&utility) {
        return Some("position");
    }
    if matches!(utility, "rounded" | "shadow" | "border") {
        return Some(match utility {
            "rounded" => "rounded",
            "shadow" => "shadow",
            _ => "border-w",
        });
    }

    if let Some(value) = utility.strip_prefix("text-") {
        return Some(if FONT_SIZES.contains(&value) || is_arbitrary_length(value) {
            "font-size"
        } else if TEXT_ALIGN.contains(&value) {
            "text-align"
        } else {
            "text-color"
        });
    }
    if let Some(value) = utility.strip_prefix("font-") {
        return Some(if FONT_WEIGHTS.contains(&value) {
            "font-weight"
        } else {
            "font-family"
        });
    }
    if let Some(value) = utility.strip_prefix("border-") {
        // Per-side borders are left alone
        if matches!(value.split('-').next(), Some("t" | "r" | "b" | "l" | "x" | "y")) {
            return None;
        }
        return Some(if value.chars().all(|c| c.is_ascii_digit()) || is_arbitrary_length(value) {
            "border-w"
        } else if BORDER_STYLES.contains(&value) {
            "border-style"
        } else {
            "border-color"
        });
    }
    if let Some(value) = utility.strip_prefix("bg-") {
        return Some(match value {
            "fixed" | "local" | "scroll" => "bg-attachment",
            "cover" | "contain" | "auto" => "bg-size",
            _ => "bg-color",
        });
    }
    if let Some(value) = utility.strip_prefix("flex-") {
        return Some(match value {
            "row" | "row-reverse" | "col" | "col-reverse" => "flex-direction",
            "wrap" | "wrap-reverse" | "nowrap" => "flex-wrap",
            _ => "flex",
        });
    }
    if let Some(value) = utility.strip_prefix("rounded-") {
        return Some(match value.split('-').next() {
            Some("t") => "rounded-t",
            Some("r") => "rounded-r",
            Some("b") => "rounded-b",
            Some("l") => "rounded-l",
            _ => "rounded",
        });
    }

    PREFIX_GROUPS
        .iter()
        .find(|(prefix, _)| utility.starts_with(prefix) && utility.len() > prefix.len())
        .map(|(_, group)| *group)
}

fn is_arbitrary_length(value: &str) -> bool {
    value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .is_some_and(|v| v.chars().next().is_some_and(|c| c.is_ascii_digit()))
}

/// Groups a class overrides when it comes later
fn conflicting_groups(group: &str) -> &'static [&'static str] {
    match group {
        "p" => &["px", "py", "pt", "pr", "pb", "pl"],
        "px" => &["pr", "pl"],
        "py" => &["pt", "pb"],
        "m" => &["mx", "my", "mt", "mr", "mb", "ml"],
        "mx" => &["mr", "ml"],
        "my" => &["mt", "mb"],
        "gap" => &["gap-x", "gap-y"],
        "rounded" => &["rounded-t", "rounded-r", "rounded-b", "rounded-l"],
        _ => &[],
    }
}
