//! Conversation participant definitions.
//!
//! A participant is one language model with a name and a persona. Two of them
//! debate; a third one moderates.

use serde::{Deserialize, Serialize};

use crate::prompts::render;

/// Position a participant occupies at the table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Seat {
    /// First debater, speaks first in every round.
    DebaterA,
    /// Second debater.
    DebaterB,
    /// Opens and closes rounds and the whole session.
    Moderator,
}

impl Seat {
    pub fn is_moderator(&self) -> bool {
        matches!(self, Seat::Moderator)
    }
}

/// A language model taking part in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    /// Display name, unique within a session.
    pub name: String,
    /// Model identifier resolved through the model registry.
    pub model: String,
    /// System persona. May contain `{name}`, `{topic}` and `{opponent_name}`.
    #[serde(default)]
    pub persona: String,
}

impl Participant {
    /// Create a new participant with the given name and model and an empty persona.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            persona: String::new(),
        }
    }

    /// Set the persona.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    /// Persona with placeholders replaced.
    pub fn render_persona(&self, topic: &str, opponent_name: &str) -> String {
        render(
            &self.persona,
            &[
                ("name", self.name.as_str()),
                ("topic", topic),
                ("opponent_name", opponent_name),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_persona_placeholders() {
        let p = Participant::new("Alice", "m1")
            .with_persona("I am {name}. We talk about {topic} with {opponent_name}.");
        assert_eq!(
            p.render_persona("tea", "Bob"),
            "I am Alice. We talk about tea with Bob."
        );
    }

    #[test]
    fn test_render_persona_without_placeholders() {
        let p = Participant::new("Alice", "m1").with_persona("plain");
        assert_eq!(p.render_persona("tea", "Bob"), "plain");
    }

    #[test]
    fn test_topic_placeholders_are_not_expanded_twice() {
        let p = Participant::new("Alice", "m1").with_persona("{name} on {topic}");
        assert_eq!(
            p.render_persona("why {opponent_name} is wrong", "Bob"),
            "Alice on why {opponent_name} is wrong"
        );
    }

    #[test]
    fn test_seat_helpers() {
        assert!(Seat::Moderator.is_moderator());
        assert!(!Seat::DebaterA.is_moderator());
        assert!(!Seat::DebaterB.is_moderator());
    }
}
