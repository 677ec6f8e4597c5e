//! The sentence/word document model.
//!
//! A document is an ordered sequence of sentences, each terminated by `.`,
//! `!` or `?` and holding a space-separated word list. Rendering joins the
//! words of a sentence with single spaces, attaches the terminator, and
//! joins sentences with a single space, so parse/render round-trips for
//! canonically spaced documents.

/// Sentence terminator characters.
pub const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// One parsed sentence. The terminator is `None` only for a trailing
/// run of text with no closing delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub words: Vec<String>,
    pub terminator: Option<char>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditError {
    #[error("sentence index {index} out of range (document has {count} sentences)")]
    SentenceOutOfRange { index: usize, count: usize },
    #[error("word index {index} out of range (sentence has {count} words)")]
    WordOutOfRange { index: usize, count: usize },
}

/// Splits a document into sentences by delimiter scan.
pub fn parse_document(content: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in content.chars() {
        if SENTENCE_TERMINATORS.contains(&c) {
            sentences.push(Sentence {
                words: split_words(&current),
                terminator: Some(c),
            });
            current.clear();
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() {
        sentences.push(Sentence {
            words: split_words(&current),
            terminator: None,
        });
    }
    sentences
}

/// Renders sentences back into a single buffer: words joined by single
/// spaces, terminator attached to the last word, single space between
/// sentences.
pub fn render_document(sentences: &[Sentence]) -> String {
    let mut out = String::new();
    for sentence in sentences {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&sentence.words.join(" "));
        if let Some(t) = sentence.terminator {
            out.push(t);
        }
    }
    out
}

/// Replaces (or appends) one word of one sentence and returns the
/// re-rendered document.
///
/// Indices are 0-based. A word index equal to the sentence's word count
/// appends; a sentence index equal to the document's sentence count starts
/// a new sentence holding just the new word.
pub fn apply_word_edit(
    content: &str,
    sentence_idx: usize,
    word_idx: usize,
    new_word: &str,
) -> Result<String, EditError> {
    let mut sentences = parse_document(content);
    if sentence_idx > sentences.len() {
        return Err(EditError::SentenceOutOfRange {
            index: sentence_idx,
            count: sentences.len(),
        });
    }
    if sentence_idx == sentences.len() {
        sentences.push(Sentence {
            words: Vec::new(),
            terminator: None,
        });
    }
    let sentence = &mut sentences[sentence_idx];
    if word_idx > sentence.words.len() {
        return Err(EditError::WordOutOfRange {
            index: word_idx,
            count: sentence.words.len(),
        });
    }
    if word_idx == sentence.words.len() {
        sentence.words.push(new_word.to_string());
    } else {
        sentence.words[word_idx] = new_word.to_string();
    }
    Ok(render_document(&sentences))
}

/// Number of sentences in a document.
pub fn sentence_count(content: &str) -> usize {
    parse_document(content).len()
}

/// Number of whitespace-delimited words in a document.
pub fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

fn split_words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_render_round_trip() {
        for content in [
            "one. two. three.",
            "hello world! how are you? fine.",
            "trailing words with no delimiter",
            "",
        ] {
            assert_eq!(render_document(&parse_document(content)), content);
        }
    }

    #[test]
    fn replace_first_word() {
        let out = apply_word_edit("one. two. three.", 0, 0, "ONE").unwrap();
        assert_eq!(out, "ONE. two. three.");
    }

    #[test]
    fn replace_keeps_terminators() {
        let out = apply_word_edit("hello world! bye.", 0, 1, "there").unwrap();
        assert_eq!(out, "hello there! bye.");
    }

    #[test]
    fn word_index_at_count_appends() {
        let out = apply_word_edit("one two.", 0, 2, "three").unwrap();
        assert_eq!(out, "one two three.");
    }

    #[test]
    fn sentence_index_at_count_appends_sentence() {
        let out = apply_word_edit("one.", 1, 0, "two.").unwrap();
        assert_eq!(out, "one. two.");
    }

    #[test]
    fn empty_document_first_word() {
        let out = apply_word_edit("", 0, 0, "hello").unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert_eq!(
            apply_word_edit("one.", 2, 0, "x"),
            Err(EditError::SentenceOutOfRange { index: 2, count: 1 })
        );
        assert_eq!(
            apply_word_edit("one.", 0, 5, "x"),
            Err(EditError::WordOutOfRange { index: 5, count: 1 })
        );
    }

    #[test]
    fn counts() {
        assert_eq!(sentence_count("one. two! three?"), 3);
        assert_eq!(word_count("one two three. four"), 4);
        assert_eq!(sentence_count(""), 0);
    }
}
