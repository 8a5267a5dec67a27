//! Predicate templates for classifying inbound envelopes.

use industry_core::Address;

use super::envelope::{Envelope, Performative};

/// A composable predicate over envelopes.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// Matches every envelope.
    Any,
    Sender(Address),
    Performative(Performative),
    Correlation(String),
    /// Exact body text.
    Body(String),
    And(Box<Template>, Box<Template>),
    Or(Box<Template>, Box<Template>),
    Not(Box<Template>),
}

impl Template {
    #[must_use]
    pub fn sender(address: impl Into<Address>) -> Self {
        Self::Sender(address.into())
    }

    #[must_use]
    pub const fn performative(performative: Performative) -> Self {
        Self::Performative(performative)
    }

    #[must_use]
    pub fn correlation(correlation: impl Into<String>) -> Self {
        Self::Correlation(correlation.into())
    }

    #[must_use]
    pub fn body(body: impl Into<String>) -> Self {
        Self::Body(body.into())
    }

    /// Matches a sender from `addresses`; an empty set matches nothing.
    #[must_use]
    pub fn any_sender<'a>(addresses: impl IntoIterator<Item = &'a Address>) -> Self {
        addresses
            .into_iter()
            .map(|a| Self::Sender(a.clone()))
            .reduce(Self::or)
            .unwrap_or_else(|| Self::Not(Box::new(Self::Any)))
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    #[must_use]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        match self {
            Self::Any => true,
            Self::Sender(address) => &envelope.sender == address,
            Self::Performative(p) => envelope.performative == *p,
            Self::Correlation(c) => envelope.correlation.as_deref() == Some(c.as_str()),
            Self::Body(b) => &envelope.body == b,
            Self::And(a, b) => a.matches(envelope) && b.matches(envelope),
            Self::Or(a, b) => a.matches(envelope) || b.matches(envelope),
            Self::Not(t) => !t.matches(envelope),
        }
    }
}

/// Ordered template table; the first matching entry wins.
#[derive(Debug, Clone)]
pub struct Router<R> {
    routes: Vec<(Template, R)>,
}

impl<R: Copy> Router<R> {
    #[must_use]
    pub const fn new() -> Self {
        Self { routes: Vec::new() }
    }

    #[must_use]
    pub fn route(mut self, template: Template, kind: R) -> Self {
        self.routes.push((template, kind));
        self
    }

    /// Classify `envelope`; `None` when no template matches.
    #[must_use]
    pub fn classify(&self, envelope: &Envelope) -> Option<R> {
        self.routes
            .iter()
            .find(|(template, _)| template.matches(envelope))
            .map(|(_, kind)| *kind)
    }
}

impl<R: Copy> Default for Router<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(sender: &str, performative: Performative) -> Envelope {
        Envelope::new(Address::new(sender), Address::new("manager"), performative)
            .with_correlation("4")
            .with_body("{}")
    }

    #[test]
    fn should_match_on_each_field() {
        let env = envelope("gom-1", Performative::Inform);
        assert!(Template::sender("gom-1").matches(&env));
        assert!(!Template::sender("gom-2").matches(&env));
        assert!(Template::performative(Performative::Inform).matches(&env));
        assert!(Template::correlation("4").matches(&env));
        assert!(!Template::correlation("5").matches(&env));
        assert!(Template::body("{}").matches(&env));
    }

    #[test]
    fn should_combine_with_and_or_not() {
        let env = envelope("gom-1", Performative::Refuse);
        let refuse_from_cell =
            Template::sender("gom-1").and(Template::performative(Performative::Refuse));
        assert!(refuse_from_cell.matches(&env));
        assert!(!refuse_from_cell.clone().not().matches(&env));

        let agree_or_refuse = Template::performative(Performative::Agree)
            .or(Template::performative(Performative::Refuse));
        assert!(agree_or_refuse.matches(&env));
    }

    #[test]
    fn should_match_any_of_a_sender_set() {
        let robots = [Address::new("tr-1"), Address::new("tr-2")];
        let template = Template::any_sender(&robots);
        assert!(template.matches(&envelope("tr-2", Performative::Agree)));
        assert!(!template.matches(&envelope("gom-1", Performative::Agree)));
    }

    #[test]
    fn should_match_nothing_for_empty_sender_set() {
        let template = Template::any_sender(std::iter::empty::<&Address>());
        assert!(!template.matches(&envelope("tr-1", Performative::Agree)));
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Kind {
        Cell,
        Fallback,
    }

    #[test]
    fn should_route_to_first_matching_template() {
        let router = Router::new()
            .route(Template::sender("gom-1"), Kind::Cell)
            .route(Template::Any, Kind::Fallback);
        assert_eq!(
            router.classify(&envelope("gom-1", Performative::Agree)),
            Some(Kind::Cell)
        );
        assert_eq!(
            router.classify(&envelope("tr-1", Performative::Agree)),
            Some(Kind::Fallback)
        );
        let empty: Router<Kind> = Router::new();
        assert_eq!(empty.classify(&envelope("tr-1", Performative::Agree)), None);
    }
}
