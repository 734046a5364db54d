use std::collections::BTreeMap;

use serde_json::Value;

use crate::tags::split_tag_input;

use super::command_registry::{
    CommandSpec, ID_ARG_COMMANDS, MULTI_PATH_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS,
};

/// One parsed line of session input. Bare text becomes a tag addition; the
/// session has no free-form prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(action: &str, raw: &str, key: &str, value: Value) -> Self {
        let mut intent = Self::new(action, raw);
        intent.command_args.insert(key.to_string(), value);
        intent
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let remainder = &slash_tail[command_len..];
            let arg = if remainder.is_empty() {
                ""
            } else {
                remainder.trim()
            };

            if let Some(action) = find_action(&command, MULTI_PATH_COMMANDS) {
                return Intent::with_arg(
                    action,
                    text,
                    "paths",
                    Value::Array(
                        parse_path_args(arg)
                            .into_iter()
                            .map(Value::String)
                            .collect(),
                    ),
                );
            }

            if let Some(action) = find_action(&command, ID_ARG_COMMANDS) {
                return Intent::with_arg(action, text, "id", Value::String(arg.to_string()));
            }

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let key = if action == "set_model" { "model" } else { "tag" };
                return Intent::with_arg(action, text, key, Value::String(arg.to_string()));
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    Intent::with_arg(
        "add_tags",
        text,
        "tags",
        Value::Array(
            split_tag_input(raw_trimmed)
                .into_iter()
                .map(Value::String)
                .collect(),
        ),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn parse_add_quoted_paths() {
        let intent = parse_intent("/add \"/tmp/a b.png\" c.jpg");
        assert_eq!(intent.action, "add_images");
        assert_eq!(intent.command_args["paths"], json!(["/tmp/a b.png", "c.jpg"]));
    }

    #[test]
    fn parse_add_without_args_yields_empty_list() {
        let intent = parse_intent("/add");
        assert_eq!(intent.action, "add_images");
        assert_eq!(intent.command_args["paths"], json!([]));
    }

    #[test]
    fn parse_id_commands() {
        let remove = parse_intent("/remove img-a1b2c3d4");
        assert_eq!(remove.action, "remove_image");
        assert_eq!(remove.command_args["id"], json!("img-a1b2c3d4"));

        assert_eq!(parse_intent("/up img-1").action, "move_up");
        assert_eq!(parse_intent("/down img-1").action, "move_down");
    }

    #[test]
    fn parse_untag_and_model() {
        let untag = parse_intent("/untag #친절하게");
        assert_eq!(untag.action, "remove_tag");
        assert_eq!(untag.command_args["tag"], json!("#친절하게"));

        let model = parse_intent("/model gemini-2.5-flash-preview-04-17");
        assert_eq!(model.action, "set_model");
        assert_eq!(
            model.command_args["model"],
            json!("gemini-2.5-flash-preview-04-17")
        );
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_intent("/tags").action, "list_tags");
        assert_eq!(parse_intent("/status").action, "status");
        assert_eq!(parse_intent("/analyze").action, "analyze");
        assert_eq!(parse_intent("/reset").action, "reset");
        assert_eq!(parse_intent("/help").action, "help");
        assert_eq!(parse_intent("/quit").action, "quit");
        assert_eq!(parse_intent("/exit").action, "quit");
    }

    #[test]
    fn bare_text_becomes_tag_additions() {
        let intent = parse_intent("친절, 데이트 #썸");
        assert_eq!(intent.action, "add_tags");
        assert_eq!(intent.command_args["tags"], json!(["친절", "데이트", "#썸"]));
    }

    #[test]
    fn empty_input_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn unknown_command_carries_command_and_arg() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }
}
