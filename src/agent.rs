//! Research orchestrator - the conversational turn state machine
//!
//! One turn is a strict pipeline:
//! Start → Classified → Resolved → Gathering(single|pair) → Synthesizing → Done
//! with a short-circuit terminal (ClarifiedAway) reachable from Resolved.
//!
//! Transitions are pure functions of the intent and the resolved symbol
//! count. One classification call per turn; no path re-enters Classified.
//! Session memory commits exactly once, after synthesis succeeds.

use crate::aggregator::DataAggregator;
use crate::classifier::IntentClassifier;
use crate::models::{ConversationTurn, IntentKind, Symbol, TurnOutcome};
use crate::session::SessionStore;
use crate::synthesizer::NarrativeSynthesizer;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CLARIFY_EMPTY_QUERY: &str =
    "Please ask a question about a public company, e.g. \"Tesla stock price\".";

/// Phases of one routed turn, traced as the pipeline advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Start,
    Classified,
    Resolved,
    GatheringSingle,
    GatheringPair,
    Synthesizing,
    Done,
    ClarifiedAway,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnPhase::Start => "start",
            TurnPhase::Classified => "classified",
            TurnPhase::Resolved => "resolved",
            TurnPhase::GatheringSingle => "gathering_single",
            TurnPhase::GatheringPair => "gathering_pair",
            TurnPhase::Synthesizing => "synthesizing",
            TurnPhase::Done => "done",
            TurnPhase::ClarifiedAway => "clarified_away",
        };
        write!(f, "{}", s)
    }
}

/// Terminal pipeline selected for a resolved turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pipeline {
    Single(Symbol),
    Pair(Symbol, Symbol),
}

/// Deterministic routing: pure in the intent and the resolved symbols.
/// GatherInfo always takes the single-subject branch; CompareStocks always
/// the pair branch. `None` means the resolver let an invalid set through,
/// which the orchestrator treats as a clarification rather than a panic.
pub fn route(intent: IntentKind, symbols: &[Symbol]) -> Option<Pipeline> {
    match (intent, symbols) {
        (IntentKind::CompareStocks, [left, right, ..]) => {
            Some(Pipeline::Pair(left.clone(), right.clone()))
        }
        (IntentKind::CompareStocks, _) => None,
        (IntentKind::GatherInfo, [first, ..]) => Some(Pipeline::Single(first.clone())),
        (IntentKind::GatherInfo, []) => None,
    }
}

pub struct ResearchOrchestrator {
    classifier: IntentClassifier,
    aggregator: DataAggregator,
    synthesizer: NarrativeSynthesizer,
    sessions: Arc<dyn SessionStore>,
    // Serializes turns within one session; cross-session turns are
    // fully independent.
    turn_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ResearchOrchestrator {
    pub fn new(
        classifier: IntentClassifier,
        aggregator: DataAggregator,
        synthesizer: NarrativeSynthesizer,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            classifier,
            aggregator,
            synthesizer,
            sessions,
            turn_locks: RwLock::new(HashMap::new()),
        }
    }

    async fn session_lock(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        {
            let locks = self.turn_locks.read().await;
            if let Some(lock) = locks.get(&session_id) {
                return lock.clone();
            }
        }

        let mut locks = self.turn_locks.write().await;
        locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Evict the registry entry once no turn holds or awaits this session's
    /// lock. Clones are only handed out under the registry lock, so after
    /// dropping ours a strong count of 1 means the registry holds the last
    /// reference.
    async fn release_session_lock(&self, session_id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.turn_locks.write().await;
        drop(lock);
        if let Some(entry) = locks.get(&session_id) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(&session_id);
            }
        }
    }

    /// Run one conversational turn. Clarifications and no-data outcomes are
    /// successful `TurnOutcome::Clarification` values; only a failed
    /// narrative generation (or a broken session store) is an error.
    pub async fn handle_turn(&self, session_id: Uuid, query: &str) -> crate::Result<TurnOutcome> {
        let lock = self.session_lock(session_id).await;
        let outcome = {
            let _turn_guard = lock.lock().await;
            self.run_turn(session_id, query).await
        };
        self.release_session_lock(session_id, lock).await;
        outcome
    }

    async fn run_turn(&self, session_id: Uuid, query: &str) -> crate::Result<TurnOutcome> {
        let mut phase = TurnPhase::Start;
        debug!(session_id = %session_id, phase = %phase, "Turn started");

        let query = query.trim();
        if query.is_empty() {
            return Ok(TurnOutcome::Clarification(CLARIFY_EMPTY_QUERY.to_string()));
        }

        let mut session = self.sessions.load(session_id).await?;

        // === CLASSIFY === (one LLM classification per turn, always)
        let classification = self.classifier.classify(query, &session).await;
        phase = TurnPhase::Classified;
        debug!(
            session_id = %session_id,
            phase = %phase,
            intent = %classification.intent,
            extracted = ?classification.symbols,
            "Intent classified"
        );

        // === RESOLVE ===
        let symbols = match crate::resolver::resolve(&classification, &session) {
            crate::resolver::Resolution::Resolved(symbols) => symbols,
            crate::resolver::Resolution::ClarificationNeeded(message) => {
                phase = TurnPhase::ClarifiedAway;
                info!(session_id = %session_id, phase = %phase, "Turn needs clarification");
                return Ok(TurnOutcome::Clarification(message.to_string()));
            }
        };
        phase = TurnPhase::Resolved;
        debug!(session_id = %session_id, phase = %phase, symbols = ?symbols, "Symbols resolved");

        // === ROUTE + GATHER ===
        let Some(pipeline) = route(classification.intent, &symbols) else {
            warn!(session_id = %session_id, "Router rejected resolved symbol set");
            return Ok(TurnOutcome::Clarification(
                crate::resolver::CLARIFY_NO_SYMBOL.to_string(),
            ));
        };

        let (bundles, used_symbols) = match &pipeline {
            Pipeline::Single(symbol) => {
                phase = TurnPhase::GatheringSingle;
                debug!(session_id = %session_id, phase = %phase, symbol = %symbol, "Gathering");

                let Some(bundle) = self.aggregator.gather(symbol).await else {
                    return Ok(TurnOutcome::Clarification(no_data_message(&[symbol])));
                };
                (vec![bundle], vec![symbol.clone()])
            }
            Pipeline::Pair(left, right) => {
                phase = TurnPhase::GatheringPair;
                debug!(
                    session_id = %session_id,
                    phase = %phase,
                    left = %left,
                    right = %right,
                    "Gathering pair"
                );

                let (left_bundle, right_bundle) =
                    tokio::join!(self.aggregator.gather(left), self.aggregator.gather(right));

                match (left_bundle, right_bundle) {
                    (Some(a), Some(b)) => (vec![a, b], vec![left.clone(), right.clone()]),
                    (None, Some(_)) => {
                        return Ok(TurnOutcome::Clarification(no_data_message(&[left])))
                    }
                    (Some(_), None) => {
                        return Ok(TurnOutcome::Clarification(no_data_message(&[right])))
                    }
                    (None, None) => {
                        return Ok(TurnOutcome::Clarification(no_data_message(&[left, right])))
                    }
                }
            }
        };

        // === SYNTHESIZE ===
        phase = TurnPhase::Synthesizing;
        debug!(session_id = %session_id, phase = %phase, "Synthesizing narrative");

        let narrative = self
            .synthesizer
            .synthesize(classification.intent, &bundles)
            .await?;

        // === COMMIT SESSION ===
        // Only now, after the turn fully completed, and with the symbols
        // actually used by the pipeline rather than what was extracted.
        session.record_turn(ConversationTurn::new(
            query.to_string(),
            classification.intent,
            used_symbols,
        ));
        self.sessions.save(session_id, &session).await?;

        phase = TurnPhase::Done;
        info!(session_id = %session_id, phase = %phase, "Turn complete");

        Ok(TurnOutcome::Narrative(narrative))
    }
}

/// Wire a full orchestrator from environment configuration: Gemini for text
/// generation and sentiment, Alpha Vantage for quotes, FMP for fundamentals,
/// NewsAPI for headlines, and the env-selected session store. Missing API
/// keys degrade to absent fields at fetch time rather than failing startup.
pub fn create_default_orchestrator() -> crate::Result<ResearchOrchestrator> {
    use crate::gemini::GeminiClient;
    use crate::providers::{
        AlphaVantageClient, FmpClient, LlmSentimentClassifier, NewsApiClient,
    };
    use std::env;

    let gemini: Arc<dyn crate::gemini::TextGenerator> = Arc::new(GeminiClient::new(
        env::var("GEMINI_API_KEY").unwrap_or_default(),
    )?);

    let market = Arc::new(AlphaVantageClient::new(
        env::var("STOCK_API_KEY").unwrap_or_default(),
    )?);
    let fundamentals = Arc::new(FmpClient::new(
        env::var("FMP_API_KEY").unwrap_or_default(),
    )?);
    let news = Arc::new(NewsApiClient::new(
        env::var("NEWS_API_KEY").unwrap_or_default(),
    )?);
    let sentiment = Arc::new(LlmSentimentClassifier::new(gemini.clone()));

    Ok(ResearchOrchestrator::new(
        IntentClassifier::new(gemini.clone()),
        DataAggregator::new(market, fundamentals, news, sentiment),
        NarrativeSynthesizer::new(gemini),
        crate::session::build_session_store(),
    ))
}

fn no_data_message(symbols: &[&Symbol]) -> String {
    let names = symbols
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Sorry, no data found for {}.", names)
}
