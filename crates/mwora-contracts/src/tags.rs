use indexmap::IndexSet;

pub const MAX_TAGS: usize = 10;

pub const DEFAULT_TAGS: &[&str] = &["#친절하게", "#일상대화", "#긍정적으로"];

pub const RECOMMENDED_TAGS: &[&str] = &[
    "#오랜만연락",
    "#약속잡기",
    "#남자친구에게",
    "#여자친구에게",
    "#썸타는중",
    "#사과하기",
    "#단호하게",
    "#회사동료",
    "#친구사이",
    "#새로운주제",
    "#축하하기",
    "#찐친",
    "#이모지사용😄",
];

/// Phrase embedded in the prompt when the user cleared every tag.
pub const NO_TAGS_FRAGMENT: &str = "일반적인 대화";

/// Ordered, deduplicated tag labels. Insertion order is preserved for
/// display; it carries no meaning in the outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet {
    tags: IndexSet<String>,
}

impl Default for TagSet {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TagSet {
    pub fn empty() -> Self {
        Self {
            tags: IndexSet::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut set = Self::empty();
        for tag in DEFAULT_TAGS {
            set.add(tag);
        }
        set
    }

    /// Adds one tag: trimmed, prefixed with `#` if missing, skipped when
    /// empty, already present, or the set is full. Returns whether the set
    /// changed.
    pub fn add(&mut self, raw: &str) -> bool {
        let Some(tag) = normalize_tag(raw) else {
            return false;
        };
        if self.tags.len() >= MAX_TAGS || self.tags.contains(&tag) {
            return false;
        }
        self.tags.insert(tag)
    }

    /// Paste behavior: splits on whitespace and commas, adds each fragment.
    /// Returns how many tags were actually added.
    pub fn add_many(&mut self, raw: &str) -> usize {
        split_tag_input(raw)
            .iter()
            .filter(|fragment| self.add(fragment))
            .count()
    }

    /// Removes a tag, accepting it with or without the `#` prefix.
    pub fn remove(&mut self, raw: &str) -> bool {
        let Some(tag) = normalize_tag(raw) else {
            return false;
        };
        self.tags.shift_remove(&tag)
    }

    /// Drops the most recently added tag (the input field's backspace path).
    pub fn pop(&mut self) -> Option<String> {
        self.tags.pop()
    }

    pub fn reset(&mut self) {
        *self = Self::with_defaults();
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tags.len() >= MAX_TAGS
    }

    pub fn contains(&self, raw: &str) -> bool {
        normalize_tag(raw)
            .map(|tag| self.tags.contains(&tag))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Tag list as embedded in the instruction block.
    pub fn prompt_fragment(&self) -> String {
        if self.tags.is_empty() {
            return NO_TAGS_FRAGMENT.to_string();
        }
        self.tags
            .iter()
            .map(String::as_str)
            .collect::<Vec<&str>>()
            .join(", ")
    }
}

fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "#" {
        return None;
    }
    if trimmed.starts_with('#') {
        Some(trimmed.to_string())
    } else {
        Some(format!("#{trimmed}"))
    }
}

/// Splits free text into tag fragments on whitespace and commas.
pub fn split_tag_input(raw: &str) -> Vec<String> {
    raw.split(|ch: char| ch.is_whitespace() || ch == ',')
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{split_tag_input, TagSet, DEFAULT_TAGS, MAX_TAGS, NO_TAGS_FRAGMENT};

    #[test]
    fn defaults_are_seeded_in_order() {
        let set = TagSet::default();
        assert_eq!(set.iter().collect::<Vec<&str>>(), DEFAULT_TAGS);
    }

    #[test]
    fn add_prefixes_and_appends() {
        let mut set = TagSet::default();
        assert!(set.add("친절"));
        assert_eq!(set.len(), 4);
        assert_eq!(set.iter().last(), Some("#친절"));
    }

    #[test]
    fn add_rejects_duplicates_and_empty() {
        let mut set = TagSet::default();
        assert!(!set.add("#친절하게"));
        assert!(!set.add("친절하게"));
        assert!(!set.add("   "));
        assert!(!set.add("#"));
        assert_eq!(set.len(), DEFAULT_TAGS.len());
    }

    #[test]
    fn eleventh_tag_is_rejected() {
        let mut set = TagSet::default();
        for idx in 0..MAX_TAGS {
            set.add(&format!("tag{idx}"));
        }
        assert_eq!(set.len(), MAX_TAGS);
        assert!(!set.add("넘침"));
        assert_eq!(set.len(), MAX_TAGS);
    }

    #[test]
    fn remove_accepts_bare_and_prefixed() {
        let mut set = TagSet::default();
        assert!(set.remove("일상대화"));
        assert!(set.remove("#친절하게"));
        assert!(!set.remove("#없는태그"));
        assert_eq!(set.iter().collect::<Vec<&str>>(), vec!["#긍정적으로"]);
    }

    #[test]
    fn pop_drops_most_recent() {
        let mut set = TagSet::default();
        set.add("마지막");
        assert_eq!(set.pop().as_deref(), Some("#마지막"));
        assert_eq!(set.len(), DEFAULT_TAGS.len());
    }

    #[test]
    fn reset_restores_defaults() {
        let mut set = TagSet::empty();
        set.add("하나");
        set.reset();
        assert_eq!(set.iter().collect::<Vec<&str>>(), DEFAULT_TAGS);
    }

    #[test]
    fn prompt_fragment_joins_or_falls_back() {
        let set = TagSet::default();
        assert_eq!(set.prompt_fragment(), "#친절하게, #일상대화, #긍정적으로");
        assert_eq!(TagSet::empty().prompt_fragment(), NO_TAGS_FRAGMENT);
    }

    #[test]
    fn add_many_splits_on_whitespace_and_commas() {
        let mut set = TagSet::empty();
        let added = set.add_many("친절, 데이트  #썸");
        assert_eq!(added, 3);
        assert_eq!(
            set.iter().collect::<Vec<&str>>(),
            vec!["#친절", "#데이트", "#썸"]
        );
    }

    #[test]
    fn split_tag_input_drops_empty_fragments() {
        assert_eq!(
            split_tag_input("  a,,b  c ,"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_tag_input("  ,  ").is_empty());
    }
}
