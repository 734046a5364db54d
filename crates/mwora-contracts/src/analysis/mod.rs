mod normalizer;

pub use normalizer::normalize_response;

use serde::{Deserialize, Serialize};

/// One copy-ready reply candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedReply {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Formality {
    Formal,
    Informal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmojiUsage {
    High,
    Medium,
    Low,
}

/// The model's read on how the observed conversation sounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTone {
    pub formality: Formality,
    #[serde(rename = "emojiUsage")]
    pub emoji_usage: EmojiUsage,
    pub style: String,
}

/// Normalized outcome of one analysis request. `suggested_replies` and
/// `conversation_flow` are always populated; the tone is present only when
/// the model returned one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_tone: Option<ConversationTone>,
    pub suggested_replies: Vec<SuggestedReply>,
    pub conversation_flow: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AnalysisResult, EmojiUsage, Formality};

    #[test]
    fn wire_names_are_camel_case() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "conversationTone": {
                "formality": "formal",
                "emojiUsage": "low",
                "style": "건조한"
            },
            "suggestedReplies": [{"id": "reply1", "text": "안녕하세요"}],
            "conversationFlow": "짧게 답하세요"
        }))
        .expect("deserialize");

        let tone = result.conversation_tone.expect("tone");
        assert_eq!(tone.formality, Formality::Formal);
        assert_eq!(tone.emoji_usage, EmojiUsage::Low);

        let round = serde_json::to_value(AnalysisResult {
            conversation_tone: None,
            suggested_replies: result.suggested_replies.clone(),
            conversation_flow: result.conversation_flow.clone(),
        })
        .expect("serialize");
        assert!(round.get("suggestedReplies").is_some());
        assert!(round.get("conversationFlow").is_some());
        assert!(round.get("conversationTone").is_none());
    }
}
