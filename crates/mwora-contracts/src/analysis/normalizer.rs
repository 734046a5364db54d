use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AnalyzeError;

use super::{AnalysisResult, ConversationTone, EmojiUsage, Formality, SuggestedReply};

/// Lines the model sometimes injects around the JSON object. Dropped only
/// when a line is exactly one of these, case-insensitive.
const FILLER_LINES: &[&str] = &["validates fine", "looks good", "ok"];

pub const FALLBACK_REPLY_ID: &str = "fallback-1";
pub const FALLBACK_REPLY_TEXT: &str =
    "죄송해요, 지금은 적절한 답변을 찾기 어렵네요. 좀 더 일반적인 안부 인사를 해보는 건 어때요?";
pub const FALLBACK_FLOW_TEXT: &str =
    "대화 흐름에 대한 조언을 받지 못했습니다. 일반적인 대화를 이어나가 보세요.";
pub const EMPTY_REPLY_TEXT: &str = "내용 없음";
pub const DEFAULT_TONE_STYLE: &str = "친근한 말투";

/// Turns the raw text the model returned into a well-formed
/// [`AnalysisResult`], or fails with a classified shape error.
///
/// The text is cleaned first (fence stripping, filler-line removal), parsed
/// as an untyped tree, shape-checked, and only then lifted into the typed
/// result with fallbacks substituted for missing optional content.
pub fn normalize_response(raw: &str) -> Result<AnalysisResult, AnalyzeError> {
    let cleaned = drop_filler_lines(strip_code_fence(raw));

    let parsed: Value = serde_json::from_str(&cleaned)
        .map_err(|err| AnalyzeError::malformed(err.to_string(), cleaned.clone()))?;

    let Some(reply_entries) = parsed.get("suggestedReplies").and_then(Value::as_array) else {
        return Err(AnalyzeError::malformed(
            "suggestedReplies 목록이 없습니다",
            cleaned,
        ));
    };
    let Some(flow) = parsed.get("conversationFlow").and_then(Value::as_str) else {
        return Err(AnalyzeError::malformed(
            "conversationFlow 문자열이 없습니다",
            cleaned,
        ));
    };

    let mut suggested_replies: Vec<SuggestedReply> =
        reply_entries.iter().map(reply_from_value).collect();
    if suggested_replies.is_empty() {
        suggested_replies.push(SuggestedReply {
            id: FALLBACK_REPLY_ID.to_string(),
            text: FALLBACK_REPLY_TEXT.to_string(),
        });
    }

    let conversation_tone = parsed
        .get("conversationTone")
        .and_then(Value::as_object)
        .map(tone_from_value);

    let conversation_flow = if flow.trim().is_empty() {
        FALLBACK_FLOW_TEXT.to_string()
    } else {
        flow.to_string()
    };

    Ok(AnalysisResult {
        conversation_tone,
        suggested_replies,
        conversation_flow,
    })
}

/// Strips a surrounding markdown fence, optionally tagged (```json), keeping
/// only the interior. Text without a full fence pair is returned trimmed.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(tail) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = tail.strip_suffix("```") else {
        return trimmed;
    };
    let inner = match inner.split_once('\n') {
        Some((first_line, body))
            if first_line
                .trim()
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric()) =>
        {
            body
        }
        _ => inner,
    };
    inner.trim()
}

/// Removes lines consisting solely of known filler phrases.
pub fn drop_filler_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let lowered = line.trim().to_ascii_lowercase();
            !FILLER_LINES.contains(&lowered.as_str())
        })
        .collect::<Vec<&str>>()
        .join("\n")
}

fn reply_from_value(entry: &Value) -> SuggestedReply {
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("reply-{}", Uuid::new_v4()));
    let text = entry
        .get("text")
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(EMPTY_REPLY_TEXT)
        .to_string();
    SuggestedReply { id, text }
}

fn tone_from_value(tone: &Map<String, Value>) -> ConversationTone {
    let formality = match tone.get("formality").and_then(Value::as_str) {
        Some("formal") => Formality::Formal,
        _ => Formality::Informal,
    };
    let emoji_usage = match tone.get("emojiUsage").and_then(Value::as_str) {
        Some("high") => EmojiUsage::High,
        Some("low") => EmojiUsage::Low,
        _ => EmojiUsage::Medium,
    };
    let style = tone
        .get("style")
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(DEFAULT_TONE_STYLE)
        .to_string();
    ConversationTone {
        formality,
        emoji_usage,
        style,
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::{AnalysisResult, EmojiUsage, Formality};
    use crate::error::AnalyzeError;

    use super::{
        drop_filler_lines, normalize_response, strip_code_fence, FALLBACK_FLOW_TEXT,
        FALLBACK_REPLY_ID, FALLBACK_REPLY_TEXT, EMPTY_REPLY_TEXT,
    };

    #[test]
    fn fenced_valid_json_round_trips_without_substitution() {
        let raw = "```json\n{\"conversationTone\":{\"formality\":\"formal\",\"emojiUsage\":\"low\",\"style\":\"차분한\"},\"suggestedReplies\":[{\"id\":\"reply1\",\"text\":\"좋아요\"}],\"conversationFlow\":\"천천히 답하세요\"}\n```";
        let result = normalize_response(raw).expect("normalize");
        let tone = result.conversation_tone.expect("tone");
        assert_eq!(tone.formality, Formality::Formal);
        assert_eq!(tone.emoji_usage, EmojiUsage::Low);
        assert_eq!(tone.style, "차분한");
        assert_eq!(result.suggested_replies.len(), 1);
        assert_eq!(result.suggested_replies[0].id, "reply1");
        assert_eq!(result.suggested_replies[0].text, "좋아요");
        assert_eq!(result.conversation_flow, "천천히 답하세요");
    }

    #[test]
    fn bare_json_without_fence_parses() {
        let result =
            normalize_response("{\"suggestedReplies\":[{\"text\":\"hi\"}],\"conversationFlow\":\"x\"}")
                .expect("normalize");
        assert_eq!(result.suggested_replies[0].text, "hi");
    }

    #[test]
    fn filler_lines_are_dropped_before_parsing() {
        let raw = "Looks good\n{\"suggestedReplies\":[{\"id\":\"r\",\"text\":\"t\"}],\"conversationFlow\":\"f\"}\nok";
        let result = normalize_response(raw).expect("normalize");
        assert_eq!(result.conversation_flow, "f");
    }

    #[test]
    fn filler_matching_is_exact_per_line() {
        let kept = drop_filler_lines("ok then\nok\nokay");
        assert_eq!(kept, "ok then\nokay");
    }

    #[test]
    fn unparseable_text_is_malformed_with_diagnostics() {
        let err = normalize_response("not json at all").unwrap_err();
        match err {
            AnalyzeError::MalformedResponse { raw, .. } => assert_eq!(raw, "not json at all"),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn missing_replies_field_is_malformed_not_upstream() {
        let err = normalize_response("{\"conversationFlow\":\"f\"}").unwrap_err();
        assert!(matches!(err, AnalyzeError::MalformedResponse { .. }));
    }

    #[test]
    fn non_array_replies_is_malformed() {
        let err =
            normalize_response("{\"suggestedReplies\":\"nope\",\"conversationFlow\":\"f\"}")
                .unwrap_err();
        assert!(matches!(err, AnalyzeError::MalformedResponse { .. }));
    }

    #[test]
    fn non_string_flow_is_malformed() {
        let err = normalize_response("{\"suggestedReplies\":[],\"conversationFlow\":7}")
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::MalformedResponse { .. }));
    }

    #[test]
    fn empty_replies_and_flow_get_fixed_fallbacks() {
        let raw = "```json\n{\"suggestedReplies\":[],\"conversationFlow\":\"\"}\n```";
        let result = normalize_response(raw).expect("normalize");
        assert_eq!(
            result,
            AnalysisResult {
                conversation_tone: None,
                suggested_replies: vec![super::SuggestedReply {
                    id: FALLBACK_REPLY_ID.to_string(),
                    text: FALLBACK_REPLY_TEXT.to_string(),
                }],
                conversation_flow: FALLBACK_FLOW_TEXT.to_string(),
            }
        );
    }

    #[test]
    fn reply_id_and_text_are_backfilled() {
        let raw = "{\"suggestedReplies\":[{},{\"id\":\"keep\"}],\"conversationFlow\":\"f\"}";
        let result = normalize_response(raw).expect("normalize");
        assert!(result.suggested_replies[0].id.starts_with("reply-"));
        assert_eq!(result.suggested_replies[0].text, EMPTY_REPLY_TEXT);
        assert_eq!(result.suggested_replies[1].id, "keep");
        assert_eq!(result.suggested_replies[1].text, EMPTY_REPLY_TEXT);
    }

    #[test]
    fn partial_tone_is_backfilled_absent_tone_stays_unset() {
        let raw = "{\"conversationTone\":{\"formality\":\"formal\"},\"suggestedReplies\":[{\"id\":\"r\",\"text\":\"t\"}],\"conversationFlow\":\"f\"}";
        let tone = normalize_response(raw)
            .expect("normalize")
            .conversation_tone
            .expect("tone");
        assert_eq!(tone.formality, Formality::Formal);
        assert_eq!(tone.emoji_usage, EmojiUsage::Medium);
        assert_eq!(tone.style, super::DEFAULT_TONE_STYLE);

        let without = normalize_response(
            "{\"suggestedReplies\":[{\"id\":\"r\",\"text\":\"t\"}],\"conversationFlow\":\"f\"}",
        )
        .expect("normalize");
        assert!(without.conversation_tone.is_none());
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
        // An opening fence without a closing one is left alone.
        assert_eq!(strip_code_fence("```json\n{\"a\":1}"), "```json\n{\"a\":1}");
    }
}
