use crate::encoding::Token;
use crate::vocab::Vocabulary;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// One supervised example: a window of ids and the id that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingPair {
    pub window: Vec<u32>,
    pub target: u32,
}

/// Concatenate encoded pieces into one corpus stream, following each piece
/// with `window_size` boundary tokens so no training window ever spans two
/// unrelated pieces without a boundary in sight.
pub fn concat_corpus(pieces: &[Vec<Token>], window_size: usize) -> Vec<Token> {
    let mut corpus = Vec::new();
    for piece in pieces {
        corpus.extend_from_slice(piece);
        corpus.extend(std::iter::repeat_n(Token::Boundary, window_size));
    }
    corpus
}

/// Map a token stream through the vocabulary. Any unknown token aborts.
pub fn to_ids(tokens: &[Token], vocab: &Vocabulary) -> Result<Vec<u32>> {
    tokens.iter().map(|t| vocab.id_of(t)).collect()
}

/// Slide a window of `window_size` ids over the corpus with stride 1,
/// pairing each window with the id that follows it.
///
/// Yields exactly `max(0, len - window_size)` pairs in corpus order; a
/// corpus shorter than the window yields none, which is not an error.
pub fn window(corpus_ids: &[u32], window_size: usize) -> Vec<TrainingPair> {
    corpus_ids
        .windows(window_size + 1)
        .map(|chunk| TrainingPair {
            window: chunk[..window_size].to_vec(),
            target: chunk[window_size],
        })
        .collect()
}

/// Write the corpus as one space-separated line of token strings.
pub fn save_corpus<P: AsRef<Path>>(tokens: &[Token], path: P) -> Result<()> {
    let text = tokens
        .iter()
        .map(Token::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    fs::write(path.as_ref(), text)
        .with_context(|| format!("Failed to write corpus to {}", path.as_ref().display()))
}

/// Read a corpus written by [`save_corpus`].
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<Token>> {
    let text = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read corpus from {}", path.as_ref().display()))?;
    text.split_whitespace().map(str::parse).collect()
}
