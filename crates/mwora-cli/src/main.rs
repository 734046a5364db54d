use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mwora_contracts::analysis::{AnalysisResult, EmojiUsage, Formality};
use mwora_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use mwora_contracts::error::AnalyzeError;
use mwora_contracts::events::{EventPayload, SessionLog};
use mwora_contracts::tags::{TagSet, RECOMMENDED_TAGS};
use mwora_engine::{
    AddOutcome, CandidateFile, GeminiClient, GeminiConfig, ImageCollection, ReorderDirection,
    MAX_IMAGES,
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "mwora", version, about = "메신저 대화 스크린샷 분석 CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// One-shot analysis of screenshots given in conversation order.
    Analyze(AnalyzeArgs),
    /// Interactive session driven by slash commands.
    Chat(ChatArgs),
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    /// Screenshot paths, in conversation order.
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Prompt tags; replaces the default set when given.
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long)]
    model: Option<String>,
    /// Append session events to this JSONL file.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Print the normalized result as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    model: Option<String>,
    /// Append session events to this JSONL file.
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("mwora error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Chat(args) => run_chat(args),
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let log = session_log(args.events.as_deref());
    let mut collection = ImageCollection::new();

    let mut candidates = Vec::new();
    for path in &args.images {
        candidates.push(CandidateFile::read(path)?);
    }
    let outcome = collection.add_files(candidates);
    report_add_outcome(&outcome, &log)?;
    if collection.is_empty() {
        bail!("{}", AnalyzeError::NoImages);
    }

    let tags = tags_from_args(&args.tags);
    let mut config = GeminiConfig::from_env()?;
    if let Some(model) = args.model {
        config.model = model;
    }
    let client = GeminiClient::new(config);

    log.record("analyze_requested", count_payload(&collection, &tags))?;
    match client.analyze(collection.assets(), &tags) {
        Ok(result) => {
            log.record("analyze_succeeded", EventPayload::new())?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
            Ok(0)
        }
        Err(err) => {
            report_analyze_error(&log, &err)?;
            Ok(1)
        }
    }
}

fn run_chat(args: ChatArgs) -> Result<i32> {
    let log = session_log(args.events.as_deref());
    let mut collection = ImageCollection::new();
    let mut tags = TagSet::default();
    let mut last_result: Option<AnalysisResult> = None;
    let mut model_override = args.model;

    log.record("session_started", EventPayload::new())?;
    println!("뭐라해? 대화 분석 세션입니다. /help 로 명령을 확인하세요.");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("mwora> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let intent = parse_intent(&line?);
        match intent.action.as_str() {
            "noop" => {}
            "quit" => break,
            "help" => print_help(),
            "status" => print_status(&collection, &tags, last_result.as_ref()),
            "list_tags" => print_tags(&tags),
            "add_images" => add_images(&intent, &mut collection, &log)?,
            "remove_image" => {
                let id = string_arg(&intent, "id");
                if id.is_empty() {
                    println!("삭제할 이미지 id를 입력하세요: /remove <id>");
                } else if collection.remove(&id) {
                    println!("삭제했습니다. (현재 {}/{MAX_IMAGES}개)", collection.len());
                } else {
                    println!("해당 id의 이미지가 없습니다: {id}");
                }
            }
            "move_up" | "move_down" => {
                let id = string_arg(&intent, "id");
                let direction = if intent.action == "move_up" {
                    ReorderDirection::Up
                } else {
                    ReorderDirection::Down
                };
                if id.is_empty() {
                    println!("이동할 이미지 id를 입력하세요.");
                } else if collection.reorder(&id, direction) {
                    print_order(&collection);
                } else {
                    println!("이동할 수 없습니다: {id}");
                }
            }
            "add_tags" => {
                let added = tag_args(&intent)
                    .iter()
                    .filter(|fragment| tags.add(fragment))
                    .count();
                if added == 0 && tags.is_full() {
                    println!("태그는 최대 10개까지 추가할 수 있습니다.");
                } else {
                    print_tags(&tags);
                }
            }
            "remove_tag" => {
                let tag = string_arg(&intent, "tag");
                if tag.is_empty() {
                    println!("제거할 태그를 입력하세요: /untag <태그>");
                } else if tags.remove(&tag) {
                    print_tags(&tags);
                } else {
                    println!("해당 태그가 없습니다: {tag}");
                }
            }
            "set_model" => {
                let model = string_arg(&intent, "model");
                if model.is_empty() {
                    println!(
                        "현재 모델: {}",
                        model_override.as_deref().unwrap_or(mwora_engine::DEFAULT_MODEL)
                    );
                } else {
                    model_override = Some(model);
                }
            }
            "reset" => {
                collection.reset();
                tags.reset();
                last_result = None;
                log.record("session_reset", EventPayload::new())?;
                println!("초기 상태로 되돌렸습니다.");
            }
            "analyze" => {
                log.record("analyze_requested", count_payload(&collection, &tags))?;
                match analyze_once(&collection, &tags, model_override.as_deref()) {
                    Ok(result) => {
                        log.record("analyze_succeeded", EventPayload::new())?;
                        print_result(&result);
                        last_result = Some(result);
                    }
                    Err(err) => report_analyze_error(&log, &err)?,
                }
            }
            "unknown" => {
                let command = string_arg(&intent, "command");
                println!("알 수 없는 명령입니다: /{command} (/help 참고)");
            }
            _ => {}
        }
    }

    log.record("session_ended", EventPayload::new())?;
    Ok(0)
}

fn analyze_once(
    collection: &ImageCollection,
    tags: &TagSet,
    model_override: Option<&str>,
) -> Result<AnalysisResult, AnalyzeError> {
    if collection.is_empty() {
        return Err(AnalyzeError::NoImages);
    }
    let mut config = GeminiConfig::from_env()?;
    if let Some(model) = model_override {
        config.model = model.to_string();
    }
    GeminiClient::new(config).analyze(collection.assets(), tags)
}

fn add_images(
    intent: &Intent,
    collection: &mut ImageCollection,
    log: &SessionLog,
) -> Result<()> {
    let paths: Vec<String> = intent
        .command_args
        .get("paths")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if paths.is_empty() {
        println!("추가할 파일 경로를 입력하세요: /add <경로> ...");
        return Ok(());
    }

    let mut candidates = Vec::new();
    for path in &paths {
        match CandidateFile::read(Path::new(path)) {
            Ok(candidate) => candidates.push(candidate),
            Err(err) => eprintln!("'{path}' 파일을 읽을 수 없습니다: {err:#}"),
        }
    }
    let outcome = collection.add_files(candidates);
    report_add_outcome(&outcome, log)?;
    println!(
        "이미지 {}개 추가됨 (현재 {}/{MAX_IMAGES}개)",
        outcome.added,
        collection.len()
    );
    Ok(())
}

/// Explicit `--tag` flags replace the default set.
fn tags_from_args(raw: &[String]) -> TagSet {
    if raw.is_empty() {
        return TagSet::default();
    }
    let mut tags = TagSet::empty();
    for tag in raw {
        tags.add(tag);
    }
    tags
}

fn session_log(path: Option<&Path>) -> SessionLog {
    let session_id = format!("sess-{}", Uuid::new_v4());
    match path {
        Some(path) => SessionLog::new(path, session_id),
        None => SessionLog::disabled(session_id),
    }
}

fn report_add_outcome(outcome: &AddOutcome, log: &SessionLog) -> Result<()> {
    for notice in &outcome.notices {
        eprintln!("{notice}");
        let mut payload = EventPayload::new();
        payload.insert("message".to_string(), Value::String(notice.to_string()));
        log.record("file_rejected", payload)?;
    }
    Ok(())
}

fn report_analyze_error(log: &SessionLog, err: &AnalyzeError) -> Result<()> {
    let mut payload = EventPayload::new();
    payload.insert("message".to_string(), Value::String(err.to_string()));
    if let Some(raw) = err.raw_diagnostic() {
        let snippet = truncate_chars(raw, 512);
        eprintln!("응답 원문(진단용): {snippet}");
        payload.insert("raw_response".to_string(), Value::String(snippet));
    }
    log.record("analyze_failed", payload)?;
    eprintln!("{err}");
    Ok(())
}

fn count_payload(collection: &ImageCollection, tags: &TagSet) -> EventPayload {
    let mut payload = EventPayload::new();
    payload.insert("images".to_string(), Value::from(collection.len() as u64));
    payload.insert("tags".to_string(), Value::from(tags.len() as u64));
    payload
}

fn string_arg(intent: &Intent, key: &str) -> String {
    intent
        .command_args
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn tag_args(intent: &Intent) -> Vec<String> {
    intent
        .command_args
        .get("tags")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn print_result(result: &AnalysisResult) {
    if let Some(tone) = &result.conversation_tone {
        println!(
            "대화 톤: {} · 이모지 {} · {}",
            formality_label(tone.formality),
            emoji_label(tone.emoji_usage),
            tone.style
        );
        println!();
    }
    println!("추천 답변:");
    for (idx, reply) in result.suggested_replies.iter().enumerate() {
        println!("  {}. {}", idx + 1, reply.text);
    }
    println!();
    println!("대화 흐름 조언:");
    println!("  {}", result.conversation_flow);
}

fn formality_label(formality: Formality) -> &'static str {
    match formality {
        Formality::Formal => "격식체",
        Formality::Informal => "캐주얼",
    }
}

fn emoji_label(usage: EmojiUsage) -> &'static str {
    match usage {
        EmojiUsage::High => "높음",
        EmojiUsage::Medium => "보통",
        EmojiUsage::Low => "낮음",
    }
}

fn print_order(collection: &ImageCollection) {
    for (idx, asset) in collection.assets().iter().enumerate() {
        println!("  {}. [{}] {}", idx + 1, asset.id, asset.file_name);
    }
}

fn print_status(
    collection: &ImageCollection,
    tags: &TagSet,
    last_result: Option<&AnalysisResult>,
) {
    if collection.is_empty() {
        println!("업로드된 이미지가 없습니다. (0/{MAX_IMAGES}개)");
    } else {
        println!("이미지 ({}/{MAX_IMAGES}개):", collection.len());
        for (idx, asset) in collection.assets().iter().enumerate() {
            println!(
                "  {}. [{}] {} ({} bytes, {})",
                idx + 1,
                asset.id,
                asset.file_name,
                asset.byte_len,
                asset.mime_type
            );
        }
    }
    print_tags(tags);
    if last_result.is_some() {
        println!("최근 분석 결과가 있습니다. /analyze 로 새로 요청하면 대체됩니다.");
    }
}

fn print_tags(tags: &TagSet) {
    if tags.is_empty() {
        println!("태그가 없습니다.");
    } else {
        println!("태그 ({}개): {}", tags.len(), tags.prompt_fragment());
    }
}

fn print_help() {
    println!("명령: {}", CHAT_HELP_COMMANDS.join(" "));
    println!("명령 없이 입력한 텍스트는 태그로 추가됩니다.");
    println!("추천 태그: {}", RECOMMENDED_TAGS.join(" "));
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
