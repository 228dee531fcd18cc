//! Context Resolver
//!
//! Merges the classifier's extracted symbols with session memory so that
//! follow-up queries ("compare with Microsoft", "what about its news")
//! resolve to complete symbol sets. Pure function of its inputs.

use crate::models::{Classification, IntentKind, Symbol};
use crate::session::SessionContext;

pub const CLARIFY_NO_SYMBOL: &str =
    "Which company would you like me to look at? Please name a company or ticker.";
pub const CLARIFY_NEED_TWO: &str =
    "I need two different companies to run a comparison. Please name both.";

/// Outcome of symbol resolution for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Vec<Symbol>),
    ClarificationNeeded(&'static str),
}

/// Resolve a classified query against session memory.
///
/// Rule order matters: a compare intent carrying one new symbol is a
/// stronger signal than a completely empty extraction, so the follow-up
/// compare synthesis runs before generic reuse.
pub fn resolve(extracted: &Classification, session: &SessionContext) -> Resolution {
    // The classifier's fail-soft path hands back the raw query as a
    // pseudo-symbol; anything that is not ticker-shaped is a placeholder,
    // not a subject, and must never reach a data fetch.
    let mut symbols: Vec<Symbol> = extracted
        .symbols
        .iter()
        .filter(|s| s.is_ticker_shaped())
        .cloned()
        .collect();

    // Rule 1: "compare X with the previous subject"
    if extracted.intent == IntentKind::CompareStocks
        && symbols.len() == 1
        && !session.last_symbols.is_empty()
    {
        symbols = vec![session.last_symbols[0].clone(), symbols[0].clone()];
    }
    // Rule 2: pure follow-up, reuse prior subjects verbatim
    else if symbols.is_empty() && !session.last_symbols.is_empty() {
        symbols = session.last_symbols.clone();
    }

    dedupe(&mut symbols);

    // Rule 3: nothing to work with
    if symbols.is_empty() {
        return Resolution::ClarificationNeeded(CLARIFY_NO_SYMBOL);
    }

    // Rule 4: a comparison needs exactly two distinct subjects
    if extracted.intent == IntentKind::CompareStocks {
        if symbols.len() < 2 {
            return Resolution::ClarificationNeeded(CLARIFY_NEED_TWO);
        }
        symbols.truncate(2);
    }

    Resolution::Resolved(symbols)
}

/// Order-preserving dedupe. Symbols are normalized at construction, so this
/// is case-insensitive on the original inputs.
fn dedupe(symbols: &mut Vec<Symbol>) {
    let mut seen = Vec::with_capacity(symbols.len());
    symbols.retain(|symbol| {
        if seen.contains(symbol) {
            false
        } else {
            seen.push(symbol.clone());
            true
        }
    });
}
