use crate::encoding::Token;
use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// A dense bijection between tokens and integer ids in `[0, len)`.
///
/// Built once per corpus and immutable afterwards. The reverse map is
/// materialized alongside the forward map so decode-time lookups are a
/// plain index instead of a scan over the whole mapping.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    forward: HashMap<Token, u32>,
    reverse: Vec<Token>,
    boundary: u32,
}

impl Vocabulary {
    /// Assign ids to every distinct token in the corpus, in first-occurrence
    /// order. The boundary token is always included, even if the corpus
    /// never contains one, so generation always has a stop symbol to sample.
    pub fn build(corpus: &[Token]) -> Self {
        let mut vocab = Self {
            forward: HashMap::new(),
            reverse: Vec::new(),
            boundary: 0,
        };

        vocab.insert(Token::Boundary);
        for token in corpus {
            if !vocab.forward.contains_key(token) {
                vocab.insert(*token);
            }
        }

        debug!("Built vocabulary with {} symbols", vocab.len());
        vocab
    }

    fn insert(&mut self, token: Token) {
        let id = self.reverse.len() as u32;
        self.forward.insert(token, id);
        self.reverse.push(token);
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    pub fn boundary_id(&self) -> u32 {
        self.boundary
    }

    /// Id for a token. An unknown token is a hard error: silently mapping it
    /// to a default would corrupt training data or generation undetected.
    pub fn id_of(&self, token: &Token) -> Result<u32> {
        self.forward
            .get(token)
            .copied()
            .ok_or_else(|| anyhow!("Token '{}' is not in the vocabulary..!", token))
    }

    /// Token for an id produced by this vocabulary.
    pub fn token_of(&self, id: u32) -> Result<Token> {
        self.reverse
            .get(id as usize)
            .copied()
            .ok_or_else(|| anyhow!("Id {} is outside the vocabulary..!", id))
    }

    /// Persist as a `{ "token": id }` JSON object.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mappings: BTreeMap<String, u32> = self
            .forward
            .iter()
            .map(|(token, id)| (token.to_string(), *id))
            .collect();

        let json = serde_json::to_string_pretty(&mappings)?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write vocabulary to {}", path.as_ref().display()))
    }

    /// Load a persisted mapping, re-validating that it is a total bijection:
    /// ids must cover exactly `[0, len)` with no gaps or duplicates, and the
    /// boundary token must be present.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read vocabulary from {}", path.as_ref().display()))?;
        let mappings: BTreeMap<String, u32> = serde_json::from_str(&json)?;

        let mut reverse = vec![None; mappings.len()];
        let mut forward = HashMap::with_capacity(mappings.len());
        for (text, id) in &mappings {
            let token: Token = text.parse()?;
            let slot = reverse
                .get_mut(*id as usize)
                .ok_or_else(|| anyhow!("Vocabulary id {} is out of range..!", id))?;
            if slot.replace(token).is_some() {
                bail!("Vocabulary id {} is assigned twice..!", id);
            }
            forward.insert(token, *id);
        }

        let reverse: Vec<Token> = reverse
            .into_iter()
            .collect::<Option<_>>()
            .ok_or_else(|| anyhow!("Vocabulary ids have gaps..!"))?;

        let boundary = *forward
            .get(&Token::Boundary)
            .ok_or_else(|| anyhow!("Vocabulary is missing the boundary token..!"))?;

        Ok(Self {
            forward,
            reverse,
            boundary,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn assigns_contiguous_ids_to_distinct_tokens() {
        let corpus = vec![
            Token::Note(60),
            Token::Hold,
            Token::Rest,
            Token::Note(60),
            Token::Boundary,
        ];
        let vocab = Vocabulary::build(&corpus);

        // four distinct symbols: 60, _, r, /
        assert_eq!(vocab.len(), 4);
        let mut seen = vec![false; vocab.len()];
        for token in [Token::Note(60), Token::Hold, Token::Rest, Token::Boundary] {
            let id = vocab.id_of(&token).unwrap() as usize;
            assert!(!seen[id]);
            seen[id] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn boundary_is_present_even_when_unseen() {
        let vocab = Vocabulary::build(&[Token::Note(72), Token::Hold]);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.id_of(&Token::Boundary).unwrap(), vocab.boundary_id());
    }

    #[test]
    fn ids_and_tokens_are_bijective() {
        let corpus = vec![Token::Note(55), Token::Note(60), Token::Rest, Token::Hold];
        let vocab = Vocabulary::build(&corpus);

        for id in 0..vocab.len() as u32 {
            let token = vocab.token_of(id).unwrap();
            assert_eq!(vocab.id_of(&token).unwrap(), id);
        }
    }

    #[test]
    fn unknown_lookups_fail() {
        let vocab = Vocabulary::build(&[Token::Note(60)]);
        assert!(vocab.id_of(&Token::Note(61)).is_err());
        assert!(vocab.token_of(99).is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let corpus = vec![
            Token::Note(60),
            Token::Hold,
            Token::Rest,
            Token::Note(67),
            Token::Boundary,
        ];
        let vocab = Vocabulary::build(&corpus);

        let dir = std::env::temp_dir().join("cantus_vocab_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mapping.json");
        vocab.save(&path).unwrap();

        let loaded = Vocabulary::load(&path).unwrap();
        assert_eq!(loaded.len(), vocab.len());
        for token in corpus {
            assert_eq!(
                loaded.id_of(&token).unwrap(),
                vocab.id_of(&token).unwrap()
            );
        }
        assert_eq!(loaded.boundary_id(), vocab.boundary_id());
    }

    #[test]
    fn load_rejects_non_contiguous_ids() {
        let dir = std::env::temp_dir().join("cantus_vocab_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gappy.json");
        std::fs::write(&path, r#"{"/": 0, "60": 2}"#).unwrap();
        assert!(Vocabulary::load(&path).is_err());
    }

    #[test]
    fn load_requires_boundary() {
        let dir = std::env::temp_dir().join("cantus_vocab_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("no_boundary.json");
        std::fs::write(&path, r#"{"60": 0, "_": 1}"#).unwrap();
        assert!(Vocabulary::load(&path).is_err());
    }
}
