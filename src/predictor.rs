use crate::dataset::TrainingPair;
use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// The next-symbol model consumed by the sampler.
///
/// Given the most recent window of token ids, return a probability
/// distribution over the whole vocabulary (entries non-negative, summing to
/// one). The sampler treats this as an opaque synchronous call; any concrete
/// model (the n-gram predictor below, a neural network behind FFI, a fixed
/// stub in tests) plugs in here.
pub trait Predictor {
    fn predict(&self, window: &[u32]) -> Result<Vec<f64>>;
}

/// Transition counts out of one context: next id -> observed count.
type TransitionTable = BTreeMap<u32, f64>;

/// Count-based n-gram next-symbol model with back-off.
///
/// Tables are keyed by the joined id context, highest order first; a context
/// never seen at one order backs off to the next shorter one, bottoming out
/// at the unigram distribution. Probabilities are renormalized counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NgramPredictor {
    vocab_size: usize,
    order: usize,
    /// tables[k - 1] holds contexts of length k.
    tables: Vec<BTreeMap<String, TransitionTable>>,
    unigram: TransitionTable,
}

impl NgramPredictor {
    /// Count transitions over the windowed corpus. Each pair contributes one
    /// observation per context length, taken from the tail of its window.
    pub fn fit(pairs: &[TrainingPair], vocab_size: usize, order: usize) -> Result<Self> {
        if order == 0 {
            bail!("N-gram order must be at least 1..!");
        }

        let mut tables = vec![BTreeMap::<String, TransitionTable>::new(); order];
        let mut unigram = TransitionTable::new();

        for pair in pairs {
            *unigram.entry(pair.target).or_insert(0.0) += 1.0;
            for k in 1..=order.min(pair.window.len()) {
                let context = context_key(&pair.window[pair.window.len() - k..]);
                *tables[k - 1]
                    .entry(context)
                    .or_default()
                    .entry(pair.target)
                    .or_insert(0.0) += 1.0;
            }
        }

        debug!(
            "Fit order-{} n-gram model over {} pairs ({} distinct unigrams)",
            order,
            pairs.len(),
            unigram.len()
        );

        Ok(Self {
            vocab_size,
            order,
            tables,
            unigram,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Normalize a transition table into a dense probability vector.
    fn densify(&self, table: &TransitionTable) -> Vec<f64> {
        let total: f64 = table.values().sum();
        let mut probs = vec![0.0; self.vocab_size];
        if total > 0.0 {
            for (&id, &count) in table {
                if let Some(slot) = probs.get_mut(id as usize) {
                    *slot = count / total;
                }
            }
        }
        probs
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write model to {}", path.as_ref().display()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read model from {}", path.as_ref().display()))?;
        let model: Self = serde_json::from_str(&json)?;
        if model.vocab_size == 0 || model.order == 0 || model.tables.len() != model.order {
            bail!("Model file {} is malformed..!", path.as_ref().display());
        }
        Ok(model)
    }
}

impl Predictor for NgramPredictor {
    fn predict(&self, window: &[u32]) -> Result<Vec<f64>> {
        // Longest matching context wins, then back off.
        for k in (1..=self.order.min(window.len())).rev() {
            let context = context_key(&window[window.len() - k..]);
            if let Some(table) = self.tables[k - 1].get(&context) {
                return Ok(self.densify(table));
            }
        }

        if !self.unigram.is_empty() {
            return Ok(self.densify(&self.unigram));
        }

        // Untrained model: no observations at all, fall back to uniform.
        Ok(vec![1.0 / self.vocab_size as f64; self.vocab_size])
    }
}

/// Encode an id context as a string key for the transition maps.
fn context_key(context: &[u32]) -> String {
    context
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dataset::window;

    fn pairs_from(ids: &[u32], window_size: usize) -> Vec<TrainingPair> {
        window(ids, window_size)
    }

    #[test]
    fn context_keys_join_ids() {
        assert_eq!(context_key(&[2, 0, 3]), "2,0,3");
        assert_eq!(context_key(&[]), "");
    }

    #[test]
    fn learns_a_deterministic_transition() {
        // 1 is always followed by 2 in this corpus.
        let model =
            NgramPredictor::fit(&pairs_from(&[0, 1, 2, 0, 1, 2, 0, 1, 2], 2), 3, 2).unwrap();

        let probs = model.predict(&[0, 1]).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs[2] - 1.0).abs() < 1e-12);
        assert_eq!(probs[0], 0.0);
    }

    #[test]
    fn backs_off_to_shorter_context() {
        let model = NgramPredictor::fit(&pairs_from(&[0, 1, 2, 1, 2, 1, 0], 2), 3, 2).unwrap();

        // Context [2, 2] was never observed; order-1 context [2] was, and it
        // always led to 1.
        let probs = model.predict(&[2, 2]).unwrap();
        assert!((probs[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unseen_context_falls_back_to_unigram_mass() {
        let model = NgramPredictor::fit(&pairs_from(&[0, 0, 0, 1], 1), 4, 1).unwrap();

        // Id 3 appears nowhere: unigram over targets {0, 0, 1}.
        let probs = model.predict(&[3]).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probs[0] > probs[1]);
        assert_eq!(probs[3], 0.0);
    }

    #[test]
    fn untrained_model_is_uniform() {
        let model = NgramPredictor::fit(&[], 5, 2).unwrap();
        let probs = model.predict(&[0]).unwrap();
        assert_eq!(probs, vec![0.2; 5]);
    }

    #[test]
    fn distributions_sum_to_one() {
        let ids = vec![0, 1, 0, 2, 0, 1, 1, 2, 0];
        let model = NgramPredictor::fit(&pairs_from(&ids, 3), 3, 3).unwrap();

        for window in [vec![0u32], vec![1, 0], vec![0, 1, 1], vec![2, 2, 2]] {
            let probs = model.predict(&window).unwrap();
            assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(probs.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let model = NgramPredictor::fit(&pairs_from(&[0, 1, 2, 0, 1, 2], 2), 3, 2).unwrap();

        let dir = std::env::temp_dir().join("cantus_model_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.json");
        model.save(&path).unwrap();

        let loaded = NgramPredictor::load(&path).unwrap();
        assert_eq!(loaded.predict(&[0, 1]).unwrap(), model.predict(&[0, 1]).unwrap());
    }
}
