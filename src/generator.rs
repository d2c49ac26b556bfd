use crate::encoding::Token;
use crate::predictor::Predictor;
use crate::vocab::Vocabulary;
use anyhow::{Result, anyhow, bail};
use log::debug;
use rand::Rng;
use rand_distr::{Distribution, weighted::WeightedIndex};

/// Tolerance for validating that a predictor's output sums to one.
const DISTRIBUTION_SUM_EPSILON: f64 = 1e-6;

/// Autoregressive melody sampler.
///
/// Holds the immutable vocabulary, the predictor, and the context window
/// length; each [`generate`](Self::generate) call runs an independent
/// sampling loop over its own history.
pub struct MelodyGenerator<P: Predictor> {
    predictor: P,
    vocab: Vocabulary,
    window_size: usize,
}

impl<P: Predictor> MelodyGenerator<P> {
    pub fn new(predictor: P, vocab: Vocabulary, window_size: usize) -> Result<Self> {
        if window_size == 0 {
            bail!("Window size must be at least 1..!");
        }
        Ok(Self {
            predictor,
            vocab,
            window_size,
        })
    }

    /// Continue a seed melody for up to `num_steps` sampled tokens.
    ///
    /// History starts as `window_size` boundary ids followed by the mapped
    /// seed (an unknown seed token is a hard error); only the trailing
    /// `window_size` ids ever reach the predictor. Sampling a boundary id
    /// stops generation immediately without emitting it. Exhausting the step
    /// budget is not an error: the melody is simply truncated, possibly
    /// mid-hold, and the decoder will flush the dangling run.
    pub fn generate<R: Rng>(
        &self,
        seed: &[Token],
        num_steps: usize,
        temperature: f64,
        rng: &mut R,
    ) -> Result<Vec<Token>> {
        let boundary = self.vocab.boundary_id();

        let mut history: Vec<u32> = vec![boundary; self.window_size];
        for token in seed {
            history.push(self.vocab.id_of(token)?);
        }

        let mut melody: Vec<Token> = seed.to_vec();
        for step in 0..num_steps {
            let window = &history[history.len() - self.window_size..];
            let probs = self.predictor.predict(window)?;
            if probs.len() != self.vocab.len() {
                bail!(
                    "Predictor returned {} probabilities for a vocabulary of {}..!",
                    probs.len(),
                    self.vocab.len()
                );
            }

            let sampled = sample_with_temperature(&probs, temperature, rng)? as u32;
            history.push(sampled);

            if sampled == boundary {
                debug!("Sampled the boundary token after {} steps, stopping", step);
                break;
            }
            melody.push(self.vocab.token_of(sampled)?);
        }

        Ok(melody)
    }
}

/// Reshape a probability vector by temperature: `ln(p) / t`, then softmax.
///
/// Temperatures below 1 sharpen toward the arg-max, above 1 flatten toward
/// uniform; exactly 1 leaves the distribution unchanged up to rounding.
pub fn reshape_with_temperature(probs: &[f64], temperature: f64) -> Result<Vec<f64>> {
    if !temperature.is_finite() || temperature <= 0.0 {
        bail!("Temperature must be positive and finite, got {}..!", temperature);
    }
    if probs.is_empty() {
        bail!("Cannot sample from an empty distribution..!");
    }
    if probs.iter().any(|&p| !p.is_finite() || p < 0.0) {
        bail!("Probability vector contains negative or non-finite entries..!");
    }
    let sum: f64 = probs.iter().sum();
    if (sum - 1.0).abs() > DISTRIBUTION_SUM_EPSILON {
        bail!("Probability vector sums to {}, not 1..!", sum);
    }

    // ln(0) is -inf, which exp() maps straight back to zero mass, so zero
    // entries pass through the reshape untouched.
    let logits: Vec<f64> = probs.iter().map(|&p| p.ln() / temperature).collect();
    let max_logit = logits
        .iter()
        .copied()
        .filter(|l| l.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if max_logit == f64::NEG_INFINITY {
        bail!("Probability vector has no mass anywhere..!");
    }

    let weights: Vec<f64> = logits.iter().map(|&l| (l - max_logit).exp()).collect();
    let norm: f64 = weights.iter().sum();
    Ok(weights.into_iter().map(|w| w / norm).collect())
}

/// Draw one index from the temperature-reshaped categorical distribution.
pub fn sample_with_temperature<R: Rng>(
    probs: &[f64],
    temperature: f64,
    rng: &mut R,
) -> Result<usize> {
    let reshaped = reshape_with_temperature(probs, temperature)?;
    let dist = WeightedIndex::new(&reshaped)
        .map_err(|e| anyhow!("Reshaped distribution is not sampleable: {}", e))?;
    Ok(dist.sample(rng))
}
