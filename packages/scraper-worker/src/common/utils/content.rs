//! Pure utility functions for turning fetched markup into clean text.
//!
//! These functions contain NO side effects - they take a markup string and
//! return text without touching the network or storage. Every input, including
//! empty or malformed markup, produces a string.
//!
//! The pipeline is:
//! 1. Split the document into text blocks (one per visible text node).
//! 2. Drop duplicate blocks.
//! 3. Join and collapse whitespace.
//! 4. Collapse immediately repeated phrases (n-grams).
//!
//! Decoding entities can turn text back into markup (`&lt;b&gt;` becomes
//! `<b>`), so the steps are reapplied to their own output until it is stable.

use std::collections::HashSet;

use scraper::{Html, Node};

/// Elements whose text content is never rendered to the reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Tuning knobs for [`normalize_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizerConfig {
    /// Longest phrase (in tokens) checked for immediate repetition.
    pub max_ngram: usize,
    /// Drop a single-token block that repeats the last kept single-token block.
    pub collapse_repeated_words: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_ngram: 20,
            collapse_repeated_words: true,
        }
    }
}

impl NormalizerConfig {
    pub fn with_max_ngram(max_ngram: usize) -> Self {
        Self {
            max_ngram,
            ..Default::default()
        }
    }
}

/// Normalize markup with the default settings.
pub fn normalize(html: &str) -> String {
    normalize_with(html, &NormalizerConfig::default())
}

/// Normalize markup into deduplicated plain text.
///
/// Same input always yields the same output, and normalizing the output
/// again returns it unchanged.
pub fn normalize_with(html: &str, config: &NormalizerConfig) -> String {
    let mut text = normalize_pass(html, config);

    // A pass over text only decodes or drops characters, so the length
    // shrinks until the text is stable.
    loop {
        let again = normalize_pass(&text, config);
        if again.len() >= text.len() {
            return text;
        }
        text = again;
    }
}

fn normalize_pass(html: &str, config: &NormalizerConfig) -> String {
    let blocks = extract_blocks(html);
    let kept = dedupe_blocks(blocks, config);
    let joined = collapse_whitespace(&kept.join(" "));
    collapse_repeated_ngrams(&joined, config.max_ngram)
}

/// Extract visible text blocks in document order.
///
/// Each text node becomes one block, trimmed. Whitespace-only nodes and any
/// text under a hidden element are skipped.
pub fn extract_blocks(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    document
        .tree
        .root()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
                });
                let trimmed = text.trim();
                (!hidden && !trimmed.is_empty()).then(|| trimmed.to_string())
            }
            _ => None,
        })
        .collect()
}

/// Drop duplicate blocks while preserving first-occurrence order.
///
/// Multi-token blocks are deduplicated across the whole document. A
/// single-token block is dropped only when it repeats the last kept
/// single-token block, so labels that recur later in the page survive while
/// an echoed label (`Menu Menu`) collapses.
pub fn dedupe_blocks<I, S>(blocks: I, config: &NormalizerConfig) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen_phrases: HashSet<String> = HashSet::new();
    let mut last_word: Option<String> = None;
    let mut kept = Vec::new();

    for block in blocks {
        let block = block.as_ref().trim();
        match block.split_whitespace().count() {
            0 => continue,
            1 => {
                if config.collapse_repeated_words && last_word.as_deref() == Some(block) {
                    continue;
                }
                last_word = Some(block.to_string());
                kept.push(block.to_string());
            }
            _ => {
                if seen_phrases.insert(block.to_string()) {
                    kept.push(block.to_string());
                }
            }
        }
    }

    kept
}

/// Collapse every run of whitespace to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse immediately repeated phrases of up to `max_ngram` tokens.
///
/// Passes are repeated until nothing changes, so the result never contains an
/// adjacent repeat the scan would collapse.
pub fn collapse_repeated_ngrams(text: &str, max_ngram: usize) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();

    loop {
        let collapsed = collapse_pass(&tokens, max_ngram);
        if collapsed.len() == tokens.len() {
            break;
        }
        tokens = collapsed;
    }

    tokens.join(" ")
}

/// One greedy left-to-right pass, preferring the longest repeat at each position.
fn collapse_pass<'a>(tokens: &[&'a str], max_ngram: usize) -> Vec<&'a str> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        let longest = max_ngram.min((tokens.len() - i) / 2);
        let repeat = (1..=longest)
            .rev()
            .find(|&n| tokens[i..i + n] == tokens[i + n..i + 2 * n]);

        match repeat {
            Some(n) => {
                let phrase = &tokens[i..i + n];
                out.extend_from_slice(phrase);
                let mut next = i + n;
                while next + n <= tokens.len() && &tokens[next..next + n] == phrase {
                    next += n;
                }
                i = next;
            }
            None => {
                out.push(tokens[i]);
                i += 1;
            }
        }
    }

    out
}
