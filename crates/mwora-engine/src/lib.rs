use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use mwora_contracts::analysis::{normalize_response, AnalysisResult};
use mwora_contracts::error::AnalyzeError;
use mwora_contracts::tags::TagSet;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub const MAX_IMAGES: usize = 5;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-04-17";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const ALLOWED_MIME_TYPES: &[&str] = &["image/png", "image/jpeg"];
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Validated connection settings for the remote service. Constructed once at
/// session start and handed to whatever issues requests. The credential must
/// be non-empty.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    api_key: String,
    pub api_base: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self, AnalyzeError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AnalyzeError::MissingApiKey);
        }
        Ok(Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Reads `GEMINI_API_KEY` (or `GOOGLE_API_KEY`), with optional
    /// `GEMINI_API_BASE` and `GEMINI_MODEL` overrides.
    pub fn from_env() -> Result<Self, AnalyzeError> {
        let api_key = non_empty_env("GEMINI_API_KEY")
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .ok_or(AnalyzeError::MissingApiKey)?;
        let mut config = Self::new(api_key)?;
        if let Some(base) = non_empty_env("GEMINI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty_env("GEMINI_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

/// One user-selected file, as handed over by the host environment: a name,
/// a declared media type, and the raw bytes.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_for_path(path)
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(Self {
            name,
            mime_type,
            bytes,
        })
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// Per-file rejection notice. Each rejected file yields one of these; the
/// rest of the batch keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddNotice {
    NotAnImage { name: String },
    TooLarge { name: String },
    Duplicate { name: String },
    Corrupt { name: String },
    CapacityDropped { dropped: usize },
}

impl fmt::Display for AddNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddNotice::NotAnImage { name } => write!(
                f,
                "'{name}' 파일은 이미지 형식이 아닙니다. PNG, JPG, JPEG 파일만 가능합니다."
            ),
            AddNotice::TooLarge { name } => write!(
                f,
                "'{name}' 파일이 너무 큽니다. 10MB 이하의 파일만 업로드 가능합니다."
            ),
            AddNotice::Duplicate { name } => {
                write!(f, "'{name}' 파일은 이미 추가된 파일입니다.")
            }
            AddNotice::Corrupt { name } => write!(
                f,
                "'{name}' 파일 처리 중 오류 발생: 이미지 파일이 손상되었거나 유효하지 않습니다."
            ),
            AddNotice::CapacityDropped { dropped } => write!(
                f,
                "최대 {MAX_IMAGES}개의 이미지만 업로드할 수 있습니다. {dropped}개 파일이 제외되었습니다."
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AddOutcome {
    pub added: usize,
    pub notices: Vec<AddNotice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderDirection {
    Up,
    Down,
}

/// Revocable reference to an in-memory preview. Resolves only through the
/// owning collection; once revoked it resolves to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle(String);

#[derive(Debug, Default)]
struct PreviewRegistry {
    entries: HashMap<String, String>,
    issued: u64,
}

impl PreviewRegistry {
    fn issue(&mut self, mime_type: &str, data_b64: &str) -> PreviewHandle {
        self.issued += 1;
        let token = format!("preview-{}", self.issued);
        self.entries
            .insert(token.clone(), format!("data:{mime_type};base64,{data_b64}"));
        PreviewHandle(token)
    }

    fn resolve(&self, handle: &PreviewHandle) -> Option<&str> {
        self.entries.get(&handle.0).map(String::as_str)
    }

    fn revoke(&mut self, handle: &PreviewHandle) {
        self.entries.remove(&handle.0);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One accepted screenshot: validated, base64-encoded, preview-handled.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub id: String,
    pub file_name: String,
    pub byte_len: usize,
    pub mime_type: String,
    pub data_b64: String,
    pub preview: PreviewHandle,
}

/// The ordered screenshot collection. Order is conversation chronology and
/// is preserved exactly into the outbound request. All mutation goes through
/// the four operations below.
#[derive(Debug, Default)]
pub struct ImageCollection {
    assets: Vec<ImageAsset>,
    previews: PreviewRegistry,
    sequence: u64,
}

impl ImageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and appends a batch. Each file is checked in turn
    /// (capacity, declared type, byte ceiling, `(name, size)` duplicate,
    /// then an actual decode); one bad file never blocks the rest. Files
    /// that no longer fit are counted into a single capacity notice.
    pub fn add_files(&mut self, candidates: Vec<CandidateFile>) -> AddOutcome {
        let mut outcome = AddOutcome::default();
        let mut dropped = 0usize;

        for candidate in candidates {
            if self.assets.len() >= MAX_IMAGES {
                dropped += 1;
                continue;
            }
            if !ALLOWED_MIME_TYPES.contains(&candidate.mime_type.as_str()) {
                outcome.notices.push(AddNotice::NotAnImage {
                    name: candidate.name,
                });
                continue;
            }
            if candidate.bytes.len() > MAX_IMAGE_BYTES {
                outcome.notices.push(AddNotice::TooLarge {
                    name: candidate.name,
                });
                continue;
            }
            if self
                .assets
                .iter()
                .any(|asset| asset.file_name == candidate.name && asset.byte_len == candidate.bytes.len())
            {
                outcome.notices.push(AddNotice::Duplicate {
                    name: candidate.name,
                });
                continue;
            }
            if image::load_from_memory(&candidate.bytes).is_err() {
                outcome.notices.push(AddNotice::Corrupt {
                    name: candidate.name,
                });
                continue;
            }

            let data_b64 = BASE64.encode(&candidate.bytes);
            let preview = self.previews.issue(&candidate.mime_type, &data_b64);
            self.sequence += 1;
            let id = asset_id(&candidate.name, candidate.bytes.len(), self.sequence);
            self.assets.push(ImageAsset {
                id,
                file_name: candidate.name,
                byte_len: candidate.bytes.len(),
                mime_type: candidate.mime_type,
                data_b64,
                preview,
            });
            outcome.added += 1;
        }

        if dropped > 0 {
            outcome.notices.push(AddNotice::CapacityDropped { dropped });
        }
        outcome
    }

    /// Removes the asset and revokes its preview; no-op on an unknown id.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let asset = self.assets.remove(index);
        self.previews.revoke(&asset.preview);
        true
    }

    /// Swaps the asset with its neighbor; no-op at either boundary.
    pub fn reorder(&mut self, id: &str, direction: ReorderDirection) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        match direction {
            ReorderDirection::Up if index > 0 => {
                self.assets.swap(index - 1, index);
                true
            }
            ReorderDirection::Down if index + 1 < self.assets.len() => {
                self.assets.swap(index, index + 1);
                true
            }
            _ => false,
        }
    }

    /// Revokes every preview and empties the collection.
    pub fn reset(&mut self) {
        self.previews.clear();
        self.assets.clear();
    }

    pub fn assets(&self) -> &[ImageAsset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn preview_url(&self, handle: &PreviewHandle) -> Option<&str> {
        self.previews.resolve(handle)
    }

    pub fn live_previews(&self) -> usize {
        self.previews.len()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.assets.iter().position(|asset| asset.id == id)
    }
}

fn asset_id(name: &str, byte_len: usize, sequence: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(byte_len.to_be_bytes());
    hasher.update(sequence.to_be_bytes());
    let digest = hasher.finalize();
    format!("img-{}", hex::encode(&digest[..4]))
}

/// The instruction block sent after the image parts: states the count, pins
/// the order as chronology, embeds the tags, and fixes the JSON output
/// contract.
pub fn instruction_text(image_count: usize, tags: &TagSet) -> String {
    let tag_fragment = tags.prompt_fragment();
    format!(
        "당신은 메신저 대화 전문가입니다. 사용자가 제공한 {image_count}개의 대화 스크린샷 이미지(순서대로 제공됨)와 아래 태그들을 분석해주세요.\n\
         이 이미지들은 대화의 흐름을 나타냅니다. 이미지 순서가 중요합니다.\n\
         사용자의 다음 메시지로 사용할 만한 3가지 구체적인 답변을 추천하고, 대화를 어떻게 이끌어갈지에 대한 전략적 조언을 1~2문단으로 제공해주세요.\n\n\
         사용자 태그: {tag_fragment}\n\n\
         응답은 반드시 다음 JSON 형식으로 반환해주세요.\n\
         JSON 객체 외에는 다른 텍스트, 설명, 또는 주석을 절대 포함하지 마세요. 오직 순수한 JSON 데이터만 응답해야 합니다.\n\
         {{\n\
           \"conversationTone\": {{\"formality\": \"informal\", \"emojiUsage\": \"medium\", \"style\": \"친근한 말투\"}},\n\
           \"suggestedReplies\": [\n\
             {{\"id\": \"reply1\", \"text\": \"첫 번째 추천 답변입니다.\"}},\n\
             {{\"id\": \"reply2\", \"text\": \"두 번째 추천 답변입니다.\"}},\n\
             {{\"id\": \"reply3\", \"text\": \"세 번째 추천 답변입니다.\"}}\n\
           ],\n\
           \"conversationFlow\": \"대화 흐름에 대한 조언입니다. 예를 들어, 상대방의 반응을 살피고...\"\n\
         }}\n\
         conversationTone은 선택 항목이며, 판단이 어려우면 생략해도 됩니다.\n\n\
         제공하는 모든 텍스트는 한국어로 작성해주세요.\n\
         추천 답변은 사용자가 바로 복사해서 사용할 수 있도록 자연스럽고 완성된 문장 형태로 제공해주세요.\n\
         대화 흐름 조언은 사용자가 대화의 목적 (태그 기반)을 달성하는 데 도움이 되도록 구체적으로 작성해주세요."
    )
}

/// Assembles the `generateContent` body: the image parts in collection
/// order, then the single instruction part. Fails when there is nothing to
/// analyze.
pub fn build_generate_payload(
    assets: &[ImageAsset],
    tags: &TagSet,
) -> Result<Value, AnalyzeError> {
    if assets.is_empty() {
        return Err(AnalyzeError::NoImages);
    }

    let mut parts: Vec<Value> = assets
        .iter()
        .map(|asset| {
            json!({
                "inlineData": {
                    "mimeType": asset.mime_type,
                    "data": asset.data_b64,
                }
            })
        })
        .collect();
    parts.push(json!({ "text": instruction_text(assets.len(), tags) }));

    Ok(json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "temperature": 0.7,
            "topP": 0.9,
            "topK": 40,
        },
    }))
}

/// Blocking client for the analysis call. One request at a time, no
/// automatic retries; every failure is classified and handed back for the
/// user to retry manually.
pub struct GeminiClient {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    pub fn analyze(
        &self,
        assets: &[ImageAsset],
        tags: &TagSet,
    ) -> Result<AnalysisResult, AnalyzeError> {
        let payload = build_generate_payload(assets, tags)?;
        let endpoint = endpoint_for_model(&self.config.api_base, &self.config.model);

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.config.api_key())])
            .timeout(self.config.request_timeout)
            .json(&payload)
            .send()
            .map_err(|err| AnalyzeError::classify_upstream(&err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| AnalyzeError::classify_upstream(&err.to_string()))?;
        if !status.is_success() {
            return Err(AnalyzeError::classify_upstream(&upstream_error_message(
                status.as_u16(),
                &body,
            )));
        }

        let envelope: Value = serde_json::from_str(&body).map_err(|err| {
            AnalyzeError::malformed(err.to_string(), truncate_text(&body, 512))
        })?;
        let text = extract_candidate_text(&envelope);
        if text.trim().is_empty() {
            return Err(AnalyzeError::malformed(
                "응답에 텍스트가 없습니다",
                truncate_text(&body, 512),
            ));
        }

        normalize_response(&text)
    }
}

fn endpoint_for_model(api_base: &str, model: &str) -> String {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    format!("{}/{}:generateContent", api_base.trim_end_matches('/'), model_path)
}

/// Concatenates the text parts of every candidate. Tolerates both camelCase
/// and snake_case part keys.
fn extract_candidate_text(payload: &Value) -> String {
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = String::new();
    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
    }
    out
}

fn upstream_error_message(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate_text(body, 512));
    format!("HTTP {status}: {detail}")
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
