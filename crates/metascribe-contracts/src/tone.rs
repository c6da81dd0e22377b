/// Trailing characters of preceding text considered for tone inference.
pub const TONE_WINDOW_CHARS: usize = 1500;

/// Number of trailing sentence-like chunks kept from the window.
pub const TONE_CHUNK_COUNT: usize = 2;

const CASUAL_POLITE_ENDING: &str = "요";
const FORMAL_ENDING: &str = "니다";
const PLAIN_ENDING: &str = "다";

const SENTENCE_DELIMITERS: &[char] = &['.', '!', '?', '。', '！', '？', '…', '\n', '\r'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneCategory {
    CasualPolite,
    Formal,
    Plain,
    Insufficient,
}

impl ToneCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CasualPolite => "casual_polite",
            Self::Formal => "formal",
            Self::Plain => "plain",
            Self::Insufficient => "insufficient",
        }
    }

    /// Short style descriptor embedded in generation prompts.
    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::CasualPolite => "casual polite style ending sentences with -요 (해요체)",
            Self::Formal => "formal polite style ending sentences with -니다 (합니다체)",
            Self::Plain => "plain declarative style ending sentences with -다 (해라체)",
            Self::Insufficient => "no clear sentence-ending style; follow the writing profile",
        }
    }
}

/// Classifies the retained closing chunks of a window into a tone category.
///
/// Implementations must never fail; anything unclassifiable maps to
/// [`ToneCategory::Insufficient`].
pub trait ToneStrategy {
    fn classify(&self, chunks: &[&str]) -> ToneCategory;
}

/// Counts how many chunks end with each sentence ending and applies them in
/// priority order: casual-polite beats plain when it is strictly more
/// frequent, otherwise a formal ending wins, then any plain ending.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndingCountStrategy;

#[derive(Debug, Default)]
struct EndingCounts {
    casual: usize,
    formal: usize,
    plain: usize,
}

impl EndingCounts {
    fn tally(chunks: &[&str]) -> Self {
        let mut counts = Self::default();
        for chunk in chunks {
            let ending = chunk.trim_end_matches(|ch: char| !ch.is_alphanumeric());
            if ending.ends_with(CASUAL_POLITE_ENDING) {
                counts.casual += 1;
            } else if ending.ends_with(FORMAL_ENDING) {
                // 니다 also ends with 다; it never counts as plain.
                counts.formal += 1;
            } else if ending.ends_with(PLAIN_ENDING) {
                counts.plain += 1;
            }
        }
        counts
    }
}

impl ToneStrategy for EndingCountStrategy {
    fn classify(&self, chunks: &[&str]) -> ToneCategory {
        let counts = EndingCounts::tally(chunks);
        if counts.casual > counts.plain {
            ToneCategory::CasualPolite
        } else if counts.formal > 0 {
            ToneCategory::Formal
        } else if counts.plain > 0 {
            ToneCategory::Plain
        } else {
            ToneCategory::Insufficient
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneContext {
    pub category: ToneCategory,
    /// Up to the last two sentence-like chunks, joined by a space.
    pub excerpt: String,
}

impl ToneContext {
    pub fn insufficient() -> Self {
        Self {
            category: ToneCategory::Insufficient,
            excerpt: String::new(),
        }
    }
}

/// Keeps the trailing [`TONE_WINDOW_CHARS`] characters of `preceding`.
pub fn tone_window(preceding: &str) -> &str {
    let total = preceding.chars().count();
    if total <= TONE_WINDOW_CHARS {
        return preceding;
    }
    let skip = total - TONE_WINDOW_CHARS;
    let offset = preceding
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(preceding.len());
    &preceding[offset..]
}

pub fn retained_chunks(window: &str) -> Vec<&str> {
    let chunks: Vec<&str> = window
        .split(SENTENCE_DELIMITERS)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect();
    let keep_from = chunks.len().saturating_sub(TONE_CHUNK_COUNT);
    chunks[keep_from..].to_vec()
}

pub fn infer_tone(preceding: &str) -> ToneContext {
    infer_tone_with(&EndingCountStrategy, preceding)
}

pub fn infer_tone_with(strategy: &dyn ToneStrategy, preceding: &str) -> ToneContext {
    let chunks = retained_chunks(tone_window(preceding));
    if chunks.is_empty() {
        return ToneContext::insufficient();
    }
    ToneContext {
        category: strategy.classify(&chunks),
        excerpt: chunks.join(" "),
    }
}
