//! Addressed envelopes exchanged between agents.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use industry_core::Address;

use crate::actors::ActorError;

/// Speech act of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performative {
    Request,
    Agree,
    Refuse,
    Inform,
    Failure,
}

impl Performative {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Agree => "agree",
            Self::Refuse => "refuse",
            Self::Inform => "inform",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message on the bus.
///
/// `body` is JSON text; `correlation` ties replies to the exchange that
/// caused them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub to: Address,
    pub sender: Address,
    pub performative: Performative,
    pub body: String,
    #[serde(default)]
    pub correlation: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Envelope {
    /// Create an envelope with an empty body.
    #[must_use]
    pub fn new(sender: Address, to: Address, performative: Performative) -> Self {
        Self {
            id: format!("msg-{}", Uuid::new_v4()),
            to,
            sender,
            performative,
            body: String::new(),
            correlation: None,
            created_at: Utc::now(),
        }
    }

    /// Set the body text.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Encode `payload` as the body.
    ///
    /// # Errors
    ///
    /// `Codec` if the payload cannot be serialized.
    pub fn with_payload<T: Serialize>(self, payload: &T) -> Result<Self, ActorError> {
        let body = serde_json::to_string(payload).map_err(|e| ActorError::codec(e.to_string()))?;
        Ok(self.with_body(body))
    }

    /// Set the correlation token.
    #[must_use]
    pub fn with_correlation(mut self, correlation: impl Into<String>) -> Self {
        self.correlation = Some(correlation.into());
        self
    }

    /// Build a reply: addresses swapped, correlation kept, body empty.
    #[must_use]
    pub fn reply(&self, performative: Performative) -> Self {
        let reply = Self::new(self.to.clone(), self.sender.clone(), performative);
        match &self.correlation {
            Some(correlation) => reply.with_correlation(correlation.clone()),
            None => reply,
        }
    }

    /// Decode the body as `T`.
    ///
    /// # Errors
    ///
    /// `Codec` if the body is not a valid `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ActorError> {
        serde_json::from_str(&self.body).map_err(|e| {
            ActorError::codec(format!(
                "{} from {}: {e}",
                self.performative, self.sender
            ))
        })
    }

    /// The correlation token parsed as an order id.
    #[must_use]
    pub fn correlated_order(&self) -> Option<u64> {
        self.correlation.as_deref().and_then(|c| c.parse().ok())
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.performative, self.sender, self.to
        )?;
        if let Some(correlation) = &self.correlation {
            write!(f, " [{correlation}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use industry_core::{Operation, StageRequest};

    fn request() -> Envelope {
        Envelope::new(
            Address::new("manager"),
            Address::new("gom-1"),
            Performative::Request,
        )
        .with_correlation("12")
    }

    #[test]
    fn should_generate_unique_ids() {
        assert_ne!(request().id, request().id);
    }

    #[test]
    fn should_swap_addresses_and_keep_correlation_in_reply() {
        let original = request();
        let reply = original.reply(Performative::Agree);
        assert_eq!(reply.to, Address::new("manager"));
        assert_eq!(reply.sender, Address::new("gom-1"));
        assert_eq!(reply.correlation.as_deref(), Some("12"));
        assert_eq!(reply.performative, Performative::Agree);
        assert!(reply.body.is_empty());
    }

    #[test]
    fn should_carry_typed_payload() {
        let payload = StageRequest {
            priority: 1,
            order_id: 12,
            location: Address::warehouse(),
            operation: Operation::Drill,
            tr_count: 1,
        };
        let envelope = request().with_payload(&payload);
        let decoded = envelope.and_then(|e| e.decode::<StageRequest>());
        assert_eq!(decoded.ok(), Some(payload));
    }

    #[test]
    fn should_report_codec_error_for_malformed_body() {
        let envelope = request().with_body("{oops");
        let decoded = envelope.decode::<StageRequest>();
        assert!(matches!(decoded, Err(ActorError::Codec(_))));
    }

    #[test]
    fn should_parse_order_correlation() {
        assert_eq!(request().correlated_order(), Some(12));
        let other = request().with_correlation("carry-12-tr-1-0");
        assert_eq!(other.correlated_order(), None);
    }

    #[test]
    fn should_serialize_performative_lowercase() {
        let json = serde_json::to_string(&Performative::Failure).unwrap_or_default();
        assert_eq!(json, "\"failure\"");
    }
}
