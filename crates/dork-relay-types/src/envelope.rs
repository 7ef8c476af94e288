//! The envelope and its budget — the immutable unit of delivery.

use dork_core::{time, EnvelopeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-envelope delivery budget.
///
/// Composed once at mint time and never mutated: forwarding produces a
/// *new* envelope with a derived budget rather than editing this one in
/// place (see [`Envelope::forward`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Number of hops this envelope has already traveled.
    #[serde(rename = "hopCount")]
    pub hop_count: u32,
    /// Maximum number of hops permitted before the envelope is dead-lettered.
    #[serde(rename = "maxHops")]
    pub max_hops: u32,
    /// Ordered list of sender subjects seen along the delivery path.
    #[serde(rename = "ancestorChain")]
    pub ancestor_chain: Vec<String>,
    /// Absolute wall-clock expiry, milliseconds since the Unix epoch.
    pub ttl: i64,
    /// Remaining adapter/handler calls this envelope may trigger.
    #[serde(rename = "callBudgetRemaining")]
    pub call_budget_remaining: i64,
}

impl Budget {
    /// Construct a fresh budget for a newly minted envelope.
    #[must_use]
    pub fn new(max_hops: u32, ttl_millis: i64, call_budget: i64) -> Self {
        Self {
            hop_count: 0,
            max_hops,
            ancestor_chain: Vec::new(),
            ttl: ttl_millis,
            call_budget_remaining: call_budget,
        }
    }

    /// Default budget applied when the caller supplies none: 16 hops, a
    /// 5-minute TTL from now, and 64 calls.
    #[must_use]
    pub fn default_for_now() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self::new(16, now + 5 * 60 * 1000, 64)
    }

    /// Has this budget exceeded its hop limit?
    #[must_use]
    pub fn hops_exceeded(&self) -> bool {
        self.hop_count > self.max_hops
    }

    /// Has this budget's TTL passed, relative to `now_millis`?
    #[must_use]
    pub fn ttl_exceeded(&self, now_millis: i64) -> bool {
        self.ttl < now_millis
    }

    /// Is there no remaining call budget?
    #[must_use]
    pub fn calls_exhausted(&self) -> bool {
        self.call_budget_remaining <= 0
    }

    /// Derive the budget for a forwarded descendant: one more hop, the
    /// sender appended to the ancestor chain, everything else unchanged.
    #[must_use]
    pub fn advance(&self, sender: &str) -> Self {
        let mut ancestor_chain = self.ancestor_chain.clone();
        ancestor_chain.push(sender.to_owned());
        Self {
            hop_count: self.hop_count + 1,
            max_hops: self.max_hops,
            ancestor_chain,
            ttl: self.ttl,
            call_budget_remaining: self.call_budget_remaining,
        }
    }
}

/// An immutable record flowing through the relay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique, time-ordered identifier.
    pub id: EnvelopeId,
    /// Target subject.
    pub subject: String,
    /// Sender subject.
    pub from: String,
    /// Optional subject for responses.
    #[serde(rename = "replyTo", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// ISO-8601 creation timestamp, millisecond precision.
    #[serde(rename = "createdAt")]
    pub created_at: String,
    /// Arbitrary structured payload.
    pub payload: Value,
    /// Delivery budget.
    pub budget: Budget,
}

impl Envelope {
    /// Mint a brand-new envelope with a fresh id and current timestamp.
    #[must_use]
    pub fn mint(subject: String, from: String, reply_to: Option<String>, payload: Value, budget: Budget) -> Self {
        Self {
            id: EnvelopeId::new(),
            subject,
            from,
            reply_to,
            created_at: time::now_iso(),
            payload,
            budget,
        }
    }

    /// Produce a descendant of this envelope for the next hop: a fresh id,
    /// a new timestamp, an advanced budget, and the new hop's `subject`/
    /// `from`. The original envelope is left untouched.
    #[must_use]
    pub fn forward(&self, new_subject: String, new_from: String) -> Self {
        Self {
            id: EnvelopeId::new(),
            subject: new_subject,
            from: new_from.clone(),
            reply_to: self.reply_to.clone(),
            created_at: time::now_iso(),
            payload: self.payload.clone(),
            budget: self.budget.advance(&self.from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mint_assigns_fresh_id_and_zero_hops() {
        let env = Envelope::mint(
            "relay.agent.backend".into(),
            "relay.agent.frontend".into(),
            None,
            json!({"hello": "world"}),
            Budget::default_for_now(),
        );
        assert_eq!(env.budget.hop_count, 0);
    }

    #[test]
    fn forward_advances_hop_count_and_ancestor_chain() {
        let env = Envelope::mint(
            "relay.agent.backend".into(),
            "relay.agent.frontend".into(),
            None,
            json!({}),
            Budget::default_for_now(),
        );
        let fwd = env.forward("relay.agent.downstream".into(), "relay.agent.backend".into());
        assert_eq!(fwd.budget.hop_count, 1);
        assert_eq!(fwd.budget.ancestor_chain, vec!["relay.agent.frontend".to_owned()]);
        assert_ne!(fwd.id, env.id);
    }

    #[test]
    fn forward_does_not_mutate_original() {
        let env = Envelope::mint(
            "relay.agent.backend".into(),
            "relay.agent.frontend".into(),
            None,
            json!({}),
            Budget::default_for_now(),
        );
        let original_hop_count = env.budget.hop_count;
        let _ = env.forward("relay.agent.downstream".into(), "relay.agent.backend".into());
        assert_eq!(env.budget.hop_count, original_hop_count);
    }

    #[test]
    fn budget_hops_exceeded() {
        let mut b = Budget::new(2, i64::MAX, 10);
        b.hop_count = 3;
        assert!(b.hops_exceeded());
    }

    #[test]
    fn budget_ttl_exceeded() {
        let b = Budget::new(10, 1000, 10);
        assert!(b.ttl_exceeded(2000));
        assert!(!b.ttl_exceeded(500));
    }

    #[test]
    fn budget_calls_exhausted() {
        let b = Budget::new(10, i64::MAX, 0);
        assert!(b.calls_exhausted());
        let b = Budget::new(10, i64::MAX, 1);
        assert!(!b.calls_exhausted());
    }

    #[test]
    fn envelope_serializes_with_camel_case_fields() {
        let env = Envelope::mint(
            "relay.agent.backend".into(),
            "relay.agent.frontend".into(),
            Some("relay.agent.frontend.reply".into()),
            json!({}),
            Budget::default_for_now(),
        );
        let value = serde_json::to_value(&env).unwrap();
        assert!(value.get("replyTo").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value["budget"].get("hopCount").is_some());
    }
}
