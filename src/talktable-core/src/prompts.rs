//! Moderator instruction templates.
//!
//! Each moderator sub-role has its own template. Placeholders use the
//! `{name}` form and are filled by [`render`].

use serde::Deserialize;

/// Moderator templates, each overridable from the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Placeholders: `{topic}`, `{debater_a}`, `{model_a}`, `{debater_b}`, `{model_b}`, `{total_rounds}`.
    pub intro: String,
    /// Placeholders: `{topic}`, `{round}`, `{total_rounds}`, `{next_speaker}`, `{next_model}`.
    pub round_open: String,
    /// Placeholders: `{topic}`, `{round}`, `{next_round}`, `{total_rounds}`,
    /// `{debater_a}`, `{response_a}`, `{debater_b}`, `{response_b}`, `{next_speaker}`.
    pub round_transition: String,
    /// Same placeholders as `round_transition` minus the next-round ones.
    pub round_close: String,
    /// Placeholders: `{topic}`, `{total_rounds}`, `{debater_a}`, `{debater_b}`.
    pub conclusion: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            intro: DEFAULT_INTRO.to_string(),
            round_open: DEFAULT_ROUND_OPEN.to_string(),
            round_transition: DEFAULT_ROUND_TRANSITION.to_string(),
            round_close: DEFAULT_ROUND_CLOSE.to_string(),
            conclusion: DEFAULT_CONCLUSION.to_string(),
        }
    }
}

/// Replace every `{key}` in `template` with its value.
///
/// The template is scanned once, so substituted values are copied verbatim
/// even when they contain `{...}` themselves. Unknown placeholders are kept.
pub fn render<V: AsRef<str>>(template: &str, vars: &[(&str, V)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substitution = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (value.as_ref(), close))
        });
        match substitution {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    out
}

const DEFAULT_INTRO: &str = "Open today's conversation on the topic \"{topic}\". \
Introduce the two speakers, {debater_a} (model {model_a}) and {debater_b} (model {model_b}), \
and tell the audience there will be {total_rounds} rounds. Keep it under 100 words.";

const DEFAULT_ROUND_OPEN: &str = "Announce the start of round {round} of {total_rounds} \
on \"{topic}\" and hand the floor to {next_speaker} (model {next_model}). One or two sentences.";

const DEFAULT_ROUND_TRANSITION: &str = "Round {round} of {total_rounds} on \"{topic}\" is over.\n\n\
{debater_a} said:\n{response_a}\n\n\
{debater_b} said:\n{response_b}\n\n\
Summarize both positions in a few neutral sentences, then announce round {next_round} \
and hand the floor to {next_speaker}.";

const DEFAULT_ROUND_CLOSE: &str = "Round {round} of {total_rounds} on \"{topic}\" was the final round.\n\n\
{debater_a} said:\n{response_a}\n\n\
{debater_b} said:\n{response_b}\n\n\
Summarize both positions in a few neutral sentences.";

const DEFAULT_CONCLUSION: &str = "The conversation on \"{topic}\" between {debater_a} and {debater_b} \
has finished after {total_rounds} rounds. Using the transcript provided, summarize the whole \
discussion, note where the speakers agreed and disagreed, and close the session.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_all_occurrences() {
        let out = render("{a} and {a} vs {b}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and x vs y");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        assert_eq!(render("{unknown}", &[("a", "x")]), "{unknown}");
    }

    #[test]
    fn test_render_does_not_expand_inside_values() {
        let out = render(
            "A: {response_a} / B: {response_b}",
            &[("response_a", "see {response_b}"), ("response_b", "SECRET")],
        );
        assert_eq!(out, "A: see {response_b} / B: SECRET");
    }

    #[test]
    fn test_render_handles_stray_braces() {
        assert_eq!(render("{{a}} and {", &[("a", "x")]), "{x} and {");
        assert_eq!(render("no close {a", &[("a", "x")]), "no close {a");
    }

    #[test]
    fn test_templates_are_distinct() {
        let p = PromptsConfig::default();
        let all = [
            &p.intro,
            &p.round_open,
            &p.round_transition,
            &p.round_close,
            &p.conclusion,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let p: PromptsConfig = serde_yaml::from_str("intro: \"Hi {topic}\"").unwrap();
        assert_eq!(p.intro, "Hi {topic}");
        assert_eq!(p.conclusion, DEFAULT_CONCLUSION);
    }
}
