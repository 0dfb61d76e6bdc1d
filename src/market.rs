//! Emote marketplace and score ledger
//!
//! Chat users `buy`/`sell` emote classes. When a token of that class leaves
//! the board, its score is credited to every owner if it exited on the
//! right half and debited if it exited on the left. Chat messages arrive
//! through a channel so the chat side never touches simulation state.

use std::collections::{BTreeMap, VecDeque};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};

use crate::sim::pool::TokenId;

/// Recent transactions kept for display
pub const LEDGER_HISTORY: usize = 256;

/// Which half of the board a token left through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitSide {
    Left,
    Right,
}

impl ExitSide {
    /// Right of x = 0 wins
    pub fn from_x(x: f32) -> Self {
        if x > 0.0 { ExitSide::Right } else { ExitSide::Left }
    }

    /// Signed ledger delta for a token worth `score`
    pub fn signed(&self, score: u32) -> i64 {
        match self {
            ExitSide::Right => score as i64,
            ExitSide::Left => -(score as i64),
        }
    }
}

/// One ledger transaction, created when a token despawns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    pub token: TokenId,
    pub emote: String,
    pub score: u32,
    pub side: ExitSide,
    /// Simulated time of the despawn
    pub at: f64,
    /// Owners the transaction was applied to
    pub owners: Vec<String>,
}

/// Chat command understood by the marketplace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketCommand {
    Buy { emote: String },
    Sell { emote: String },
}

impl MarketCommand {
    /// Parse `buy <emote>` / `sell <emote>` (case-insensitive)
    pub fn parse(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        let mut parts = lower.split_whitespace();
        let verb = parts.next()?;
        let emote = parts.next()?.to_string();
        match verb {
            "buy" => Some(MarketCommand::Buy { emote }),
            "sell" => Some(MarketCommand::Sell { emote }),
            _ => None,
        }
    }
}

/// A raw chat line
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub username: String,
    pub text: String,
}

/// Sending half handed to the chat collaborator
#[derive(Debug, Clone)]
pub struct MarketInbox {
    tx: Sender<ChatMessage>,
}

impl MarketInbox {
    /// Queue a chat line; false once the marketplace is gone
    pub fn send(&self, username: impl Into<String>, text: impl Into<String>) -> bool {
        self.tx
            .send(ChatMessage {
                username: username.into(),
                text: text.into(),
            })
            .is_ok()
    }
}

/// Participant balances and transaction history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    balances: BTreeMap<String, i64>,
    recent: VecDeque<Impact>,
    transaction_count: u64,
}

impl Ledger {
    /// Make sure a participant has a balance entry
    pub fn register(&mut self, username: &str) {
        self.balances.entry(username.to_lowercase()).or_insert(0);
    }

    /// Usernames are case-insensitive
    pub fn balance(&self, username: &str) -> Option<i64> {
        self.balances.get(&username.to_lowercase()).copied()
    }

    pub fn balances(&self) -> impl Iterator<Item = (&str, i64)> {
        self.balances.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Apply an impact to its owners and record it
    pub fn apply(&mut self, impact: Impact) {
        let delta = impact.side.signed(impact.score);
        for owner in &impact.owners {
            let balance = self.balances.entry(owner.clone()).or_insert(0);
            *balance = balance.saturating_add(delta);
        }
        self.transaction_count += 1;
        if self.recent.len() >= LEDGER_HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(impact);
    }

    pub fn transaction_count(&self) -> u64 {
        self.transaction_count
    }

    /// Most recent transactions, oldest first
    pub fn recent(&self) -> impl Iterator<Item = &Impact> {
        self.recent.iter()
    }
}

/// Ownership book plus ledger
#[derive(Debug)]
pub struct Marketplace {
    ledger: Ledger,
    owners: BTreeMap<String, Vec<String>>,
    tx: Sender<ChatMessage>,
    rx: Receiver<ChatMessage>,
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new()
    }
}

impl Marketplace {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            ledger: Ledger::default(),
            owners: BTreeMap::new(),
            tx,
            rx,
        }
    }

    /// New sender for chat messages
    pub fn inbox(&self) -> MarketInbox {
        MarketInbox {
            tx: self.tx.clone(),
        }
    }

    /// Apply every queued chat message; returns how many commands were applied
    pub fn process_inbox(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.rx.try_recv() {
            if self.handle_message(&message.username, &message.text).is_some() {
                applied += 1;
            }
        }
        applied
    }

    /// Handle one chat line; any speaker becomes a participant
    pub fn handle_message(&mut self, username: &str, text: &str) -> Option<MarketCommand> {
        let username = username.to_lowercase();
        self.ledger.register(&username);

        let command = MarketCommand::parse(text)?;
        match &command {
            MarketCommand::Buy { emote } => {
                self.buy(&username, emote);
                log::debug!("{} bought {}", username, emote);
            }
            MarketCommand::Sell { emote } => {
                self.sell(&username, emote);
                log::debug!("{} sold {}", username, emote);
            }
        }
        Some(command)
    }

    pub fn buy(&mut self, username: &str, emote: &str) {
        let username = username.to_lowercase();
        self.ledger.register(&username);
        let owners = self.owners.entry(emote.to_lowercase()).or_default();
        if !owners.contains(&username) {
            owners.push(username);
        }
    }

    pub fn sell(&mut self, username: &str, emote: &str) {
        let username = username.to_lowercase();
        if let Some(owners) = self.owners.get_mut(&emote.to_lowercase()) {
            owners.retain(|o| *o != username);
        }
    }

    /// Owners of an emote class
    pub fn owners(&self, emote: &str) -> &[String] {
        self.owners
            .get(&emote.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Book the impact of a despawned token
    pub fn record_impact(&mut self, token: TokenId, emote: &str, score: u32, side: ExitSide, at: f64) {
        let impact = Impact {
            token,
            emote: emote.to_string(),
            score,
            side,
            at,
            owners: self.owners(emote).to_vec(),
        };
        log::debug!(
            "Impact: {} worth {} exited {:?} ({} owners)",
            impact.emote,
            impact.score,
            impact.side,
            impact.owners.len()
        );
        self.ledger.apply(impact);
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(slot: u32) -> TokenId {
        TokenId {
            slot,
            generation: 0,
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            MarketCommand::parse("BUY Kappa"),
            Some(MarketCommand::Buy {
                emote: "kappa".to_string()
            })
        );
        assert_eq!(
            MarketCommand::parse("sell   pogchamp now"),
            Some(MarketCommand::Sell {
                emote: "pogchamp".to_string()
            })
        );
        assert_eq!(MarketCommand::parse("buy"), None);
        assert_eq!(MarketCommand::parse("hello there"), None);
        assert_eq!(MarketCommand::parse(""), None);
    }

    #[test]
    fn test_exit_side() {
        assert_eq!(ExitSide::from_x(0.1), ExitSide::Right);
        assert_eq!(ExitSide::from_x(0.0), ExitSide::Left);
        assert_eq!(ExitSide::from_x(-3.0), ExitSide::Left);
        assert_eq!(ExitSide::from_x(f32::NAN), ExitSide::Left);
        assert_eq!(ExitSide::Left.signed(4), -4);
    }

    #[test]
    fn test_impact_credits_and_debits_owners() {
        let mut market = Marketplace::new();
        market.handle_message("Alice", "buy Kappa");
        market.handle_message("bob", "buy kappa");
        market.handle_message("carol", "hi chat");

        market.record_impact(token(0), "Kappa", 5, ExitSide::Right, 1.0);
        market.record_impact(token(1), "kappa", 2, ExitSide::Left, 2.0);

        let ledger = market.ledger();
        assert_eq!(ledger.balance("alice"), Some(3));
        assert_eq!(ledger.balance("bob"), Some(3));
        assert_eq!(ledger.balance("carol"), Some(0));
        assert_eq!(ledger.transaction_count(), 2);
    }

    #[test]
    fn test_sell_stops_exposure() {
        let mut market = Marketplace::new();
        market.handle_message("alice", "buy kappa");
        market.handle_message("alice", "buy kappa");
        assert_eq!(market.owners("kappa").len(), 1);
        market.handle_message("alice", "sell kappa");
        assert!(market.owners("kappa").is_empty());
        // Selling something never bought is harmless
        market.handle_message("alice", "sell lul");

        market.record_impact(token(0), "kappa", 9, ExitSide::Right, 0.0);
        assert_eq!(market.ledger().balance("alice"), Some(0));
        // Still recorded as a transaction with no owners
        assert_eq!(market.ledger().transaction_count(), 1);
        assert!(market.ledger().recent().all(|i| i.owners.is_empty()));
    }

    #[test]
    fn test_usernames_are_case_insensitive() {
        let mut market = Marketplace::new();
        market.buy("Alice", "Kappa");
        market.buy("ALICE", "kappa");
        assert_eq!(market.owners("kappa"), ["alice".to_string()]);
        assert_eq!(market.ledger().balance("Alice"), Some(0));

        market.record_impact(token(0), "kappa", 4, ExitSide::Right, 0.0);
        assert_eq!(market.ledger().balance("Alice"), Some(4));
        assert_eq!(market.ledger().balance("aLiCe"), Some(4));

        market.sell("ALICE", "KAPPA");
        assert!(market.owners("kappa").is_empty());
    }

    #[test]
    fn test_inbox_is_applied_on_process() {
        let mut market = Marketplace::new();
        let inbox = market.inbox();
        let sender = std::thread::spawn(move || {
            inbox.send("dave", "buy LUL");
            inbox.send("dave", "nothing");
        });
        sender.join().unwrap();

        assert!(market.owners("lul").is_empty());
        assert_eq!(market.process_inbox(), 1);
        assert_eq!(market.owners("lul"), ["dave".to_string()]);
        assert_eq!(market.ledger().balance("dave"), Some(0));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut ledger = Ledger::default();
        for i in 0..(LEDGER_HISTORY as u32 + 10) {
            ledger.apply(Impact {
                token: token(i),
                emote: "kappa".to_string(),
                score: 1,
                side: ExitSide::Left,
                at: 0.0,
                owners: Vec::new(),
            });
        }
        assert_eq!(ledger.recent().count(), LEDGER_HISTORY);
        assert_eq!(ledger.transaction_count(), LEDGER_HISTORY as u64 + 10);
    }
}
