//! Stream aggregation.
//!
//! Consumes a model reply, forwarding each fragment to the display sink as it
//! arrives and returning the concatenated response.

use futures::StreamExt;

use crate::display::DisplaySink;
use crate::error::TalkTableError;
use crate::gateway::ModelReply;

/// Drain `reply` into a single string.
///
/// On success the returned text equals the in-order concatenation of every
/// fragment handed to `sink`. A complete text counts as one fragment; an empty
/// stream yields an empty string. An error item stops consumption.
pub async fn aggregate(
    reply: ModelReply,
    speaker: &str,
    sink: &dyn DisplaySink,
) -> Result<String, TalkTableError> {
    match reply {
        ModelReply::Text(text) => {
            if !text.is_empty() {
                sink.write_fragment(speaker, &text);
            }
            Ok(text)
        }
        ModelReply::Stream(mut fragments) => {
            let mut full_text = String::new();
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                sink.write_fragment(speaker, &fragment);
                full_text.push_str(&fragment);
            }
            Ok(full_text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use futures::stream;

    fn stream_of(parts: &[&str]) -> ModelReply {
        let items: Vec<Result<String, TalkTableError>> =
            parts.iter().map(|p| Ok(p.to_string())).collect();
        ModelReply::Stream(Box::pin(stream::iter(items)))
    }

    #[tokio::test]
    async fn test_concatenation_matches_forwarded_fragments() {
        let sink = RecordingSink::default();
        let text = aggregate(stream_of(&["Hel", "lo", ", ", "world"]), "Alice", &sink)
            .await
            .unwrap();
        assert_eq!(text, "Hello, world");
        assert_eq!(sink.fragments_for("Alice"), vec!["Hel", "lo", ", ", "world"]);
        assert_eq!(sink.fragments_for("Alice").concat(), text);
    }

    #[tokio::test]
    async fn test_empty_stream_is_empty_string() {
        let sink = RecordingSink::default();
        let text = aggregate(stream_of(&[]), "Alice", &sink).await.unwrap();
        assert_eq!(text, "");
        assert!(sink.fragments_for("Alice").is_empty());
    }

    #[tokio::test]
    async fn test_complete_text_is_single_fragment() {
        let sink = RecordingSink::default();
        let text = aggregate(ModelReply::Text("whole".into()), "Bob", &sink)
            .await
            .unwrap();
        assert_eq!(text, "whole");
        assert_eq!(sink.fragments_for("Bob"), vec!["whole"]);
    }

    #[tokio::test]
    async fn test_fragments_are_forwarded_before_failure() {
        let sink = RecordingSink::default();
        let items: Vec<Result<String, TalkTableError>> = vec![
            Ok("partial".into()),
            Err(TalkTableError::invocation("m1", "connection reset")),
            Ok("never".into()),
        ];
        let err = aggregate(ModelReply::Stream(Box::pin(stream::iter(items))), "Alice", &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, TalkTableError::ModelInvocation { .. }));
        assert_eq!(sink.fragments_for("Alice"), vec!["partial"]);
    }

    #[tokio::test]
    async fn test_unicode_fragments_keep_order() {
        let sink = RecordingSink::default();
        let text = aggregate(stream_of(&["こん", "にち", "は"]), "MC", &sink)
            .await
            .unwrap();
        assert_eq!(text, "こんにちは");
        assert_eq!(sink.fragments_for("MC").concat(), text);
    }
}
