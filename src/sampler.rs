//! Single-step sampling
//!
//! Turns text into ids, runs the model, and draws the next character from
//! the final timestep's distribution. The `[UNK]` logit is forced to
//! negative infinity so the sentinel can never be produced.

use std::sync::Arc;

use rand::Rng;

use crate::{
    error::{CantopopError, Result},
    model::{CharRnn, HiddenState},
    tensor::Tensor,
    vocab::Vocabulary,
};

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Divide every logit by `temperature`
///
/// # Errors
///
/// Returns error if the temperature is not a positive finite number.
pub fn apply_temperature(logits: &Tensor<f32>, temperature: f32) -> Result<Tensor<f32>> {
    check_temperature(temperature)?;
    let scaled = logits.data().iter().map(|&x| x / temperature).collect();
    Tensor::from_vec(logits.shape().to_vec(), scaled)
}

/// Mask with negative infinity at every id in `blocked`, zero elsewhere
///
/// # Errors
///
/// Returns error if a blocked id is outside `[0, vocab_size)`.
pub fn build_mask(vocab_size: usize, blocked: &[u32]) -> Result<Vec<f32>> {
    let mut mask = vec![0.0; vocab_size];
    for &id in blocked {
        let slot = usize::try_from(id)
            .ok()
            .and_then(|idx| mask.get_mut(idx))
            .ok_or_else(|| CantopopError::InvalidConfig {
                reason: format!("masked id {id} outside vocabulary of {vocab_size}"),
            })?;
        *slot = f32::NEG_INFINITY;
    }
    Ok(mask)
}

/// Add `mask` to `logits` element-wise
///
/// # Errors
///
/// Returns error if the lengths differ.
pub fn apply_mask(logits: &mut [f32], mask: &[f32]) -> Result<()> {
    if logits.len() != mask.len() {
        return Err(CantopopError::InvalidShape {
            reason: format!(
                "mask has {} entries, logits have {}",
                mask.len(),
                logits.len()
            ),
        });
    }
    for (logit, m) in logits.iter_mut().zip(mask) {
        *logit += m;
    }
    Ok(())
}

/// Draw one index from the categorical distribution `softmax(logits)`
///
/// Entries at negative infinity have zero probability and are never
/// returned.
///
/// # Errors
///
/// Returns error if `logits` is empty, contains NaN, or has no finite entry.
pub fn sample_categorical<R: Rng + ?Sized>(logits: &[f32], rng: &mut R) -> Result<usize> {
    if logits.iter().any(|x| x.is_nan()) {
        return Err(CantopopError::Generation {
            reason: "logits contain NaN".to_string(),
        });
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return Err(CantopopError::Generation {
            reason: "no sampleable logit".to_string(),
        });
    }

    let weights: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let total: f32 = weights.iter().sum();
    let threshold = rng.gen::<f32>() * total;

    let mut cumulative = 0.0;
    for (idx, &w) in weights.iter().enumerate() {
        cumulative += w;
        if threshold < cumulative {
            return Ok(idx);
        }
    }

    // Rounding can leave the threshold just past the final sum
    Ok(weights.iter().rposition(|&w| w > 0.0).unwrap_or(0))
}

fn check_temperature(temperature: f32) -> Result<()> {
    if temperature.is_finite() && temperature > 0.0 {
        Ok(())
    } else {
        Err(CantopopError::InvalidConfig {
            reason: format!("temperature must be positive and finite, got {temperature}"),
        })
    }
}

/// One-character sampler over a shared model and vocabulary
#[derive(Debug, Clone)]
pub struct StepSampler {
    model: Arc<CharRnn>,
    vocab: Arc<Vocabulary>,
    temperature: f32,
    mask: Vec<f32>,
}

impl StepSampler {
    /// Create a sampler and validate it against the model
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the vocabulary and model disagree on size,
    /// the unknown id cannot be masked, or the temperature is unusable.
    pub fn new(model: Arc<CharRnn>, vocab: Arc<Vocabulary>, temperature: f32) -> Result<Self> {
        check_temperature(temperature)?;
        let vocab_size = model.config().vocab_size;
        if vocab.size() != vocab_size {
            return Err(CantopopError::InvalidConfig {
                reason: format!(
                    "vocabulary has {} entries but the model outputs {vocab_size} logits",
                    vocab.size()
                ),
            });
        }
        let mask = build_mask(vocab_size, &[vocab.unk_id()])?;

        Ok(Self {
            model,
            vocab,
            temperature,
            mask,
        })
    }

    /// Sampling temperature
    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Shared vocabulary
    #[must_use]
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Shared model
    #[must_use]
    pub fn model(&self) -> &CharRnn {
        &self.model
    }

    /// Sample the character that follows `text`
    ///
    /// Every character of `text` is fed through the model starting from
    /// `state`; the returned state is the one after the last character.
    ///
    /// # Errors
    ///
    /// Returns error if `text` is empty or the logits cannot be sampled.
    pub fn sample_next<R: Rng + ?Sized>(
        &self,
        text: &str,
        state: Option<&HiddenState>,
        rng: &mut R,
    ) -> Result<(String, HiddenState)> {
        let ids = self.vocab.encode(text);
        let (logits, state) = self.model.step(&ids, state)?;

        let last = logits.row(logits.num_rows() - 1)?;
        let last = Tensor::from_vec(vec![last.len()], last.to_vec())?;
        let mut scaled = apply_temperature(&last, self.temperature)?.into_data();
        apply_mask(&mut scaled, &self.mask)?;

        let idx = sample_categorical(&scaled, rng)?;
        let id = u32::try_from(idx).map_err(|_| CantopopError::Generation {
            reason: format!("sampled index {idx} exceeds u32"),
        })?;

        Ok((self.vocab.char_of(id).to_string(), state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RnnConfig;
    use rand::{rngs::StdRng, SeedableRng};

    fn sampler(corpus: &str, temperature: f32) -> StepSampler {
        let vocab = Vocabulary::from_corpus(corpus).unwrap();
        let model = CharRnn::seeded(
            RnnConfig {
                vocab_size: vocab.size(),
                embed_dim: 4,
                units: 6,
            },
            42,
        )
        .unwrap();
        StepSampler::new(Arc::new(model), Arc::new(vocab), temperature).unwrap()
    }

    #[test]
    fn test_apply_temperature_scales() {
        let logits = Tensor::from_vec(vec![3], vec![2.0, -4.0, 1.0]).unwrap();
        let scaled = apply_temperature(&logits, 2.0).unwrap();
        assert_eq!(scaled.data(), &[1.0, -2.0, 0.5]);
    }

    #[test]
    fn test_apply_temperature_rejects_zero() {
        let logits = Tensor::from_vec(vec![1], vec![1.0]).unwrap();
        assert!(apply_temperature(&logits, 0.0).is_err());
        assert!(apply_temperature(&logits, f32::NAN).is_err());
    }

    #[test]
    fn test_build_mask() {
        let mask = build_mask(3, &[0]).unwrap();
        assert_eq!(mask[0], f32::NEG_INFINITY);
        assert_eq!(&mask[1..], &[0.0, 0.0]);
        assert!(build_mask(3, &[3]).is_err());
    }

    #[test]
    fn test_apply_mask_length_mismatch() {
        let mut logits = vec![1.0, 2.0];
        assert!(apply_mask(&mut logits, &[0.0]).is_err());
    }

    #[test]
    fn test_categorical_never_picks_masked() {
        let mut rng = StdRng::seed_from_u64(0);
        let logits = [f32::NEG_INFINITY, 0.0, 0.0];
        for _ in 0..1000 {
            assert_ne!(sample_categorical(&logits, &mut rng).unwrap(), 0);
        }
    }

    #[test]
    fn test_categorical_dominant_logit() {
        let mut rng = StdRng::seed_from_u64(1);
        let logits = [0.0, 100.0, 0.0];
        for _ in 0..100 {
            assert_eq!(sample_categorical(&logits, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_categorical_roughly_follows_distribution() {
        let mut rng = StdRng::seed_from_u64(2);
        // p = [0.2, 0.8]
        let logits = [0.0, 4.0f32.ln()];
        let hits = (0..10_000)
            .filter(|_| sample_categorical(&logits, &mut rng).unwrap() == 1)
            .count();
        assert!((7_500..8_500).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn test_categorical_rejects_degenerate() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(sample_categorical(&[], &mut rng).is_err());
        assert!(sample_categorical(&[f32::NEG_INFINITY; 3], &mut rng).is_err());
        assert!(sample_categorical(&[0.0, f32::NAN], &mut rng).is_err());
    }

    #[test]
    fn test_sample_next_returns_vocab_char() {
        let sampler = sampler("月光光照地堂", DEFAULT_TEMPERATURE);
        let mut rng = StdRng::seed_from_u64(4);
        let (ch, state) = sampler.sample_next("月光", None, &mut rng).unwrap();

        assert_eq!(ch.chars().count(), 1);
        assert!(sampler.vocab().chars().any(|c| c.to_string() == ch));
        assert_eq!(state.len(), 6);
    }

    #[test]
    fn test_sample_next_unknown_input_still_samples() {
        let sampler = sampler("abc", DEFAULT_TEMPERATURE);
        let mut rng = StdRng::seed_from_u64(5);
        let (ch, _) = sampler.sample_next("xyz", None, &mut rng).unwrap();
        assert_ne!(ch, crate::vocab::UNK_TOKEN);
    }

    #[test]
    fn test_sample_next_reproducible_with_seed() {
        let sampler = sampler("abcdef", 0.7);
        let a = sampler
            .sample_next("abc", None, &mut StdRng::seed_from_u64(9))
            .unwrap();
        let b = sampler
            .sample_next("abc", None, &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_next_empty_text_errors() {
        let sampler = sampler("abc", DEFAULT_TEMPERATURE);
        let mut rng = StdRng::seed_from_u64(6);
        assert!(sampler.sample_next("", None, &mut rng).is_err());
    }

    /// Index of the largest logit after the unknown id
    fn argmax_after_unk(logits: &[f32]) -> usize {
        let mut best = 1;
        for (idx, &x) in logits.iter().enumerate().skip(1) {
            if x > logits[best] {
                best = idx;
            }
        }
        best
    }

    #[test]
    fn test_low_temperature_picks_argmax() {
        let sampler = sampler("月光光照地堂蝦仔你乖", 1e-6);
        let ids = sampler.vocab().encode("月光");
        let (logits, _) = sampler.model().step(&ids, None).unwrap();
        let last = logits.row(logits.num_rows() - 1).unwrap();
        let expected = sampler
            .vocab()
            .char_of(u32::try_from(argmax_after_unk(last)).unwrap())
            .to_string();

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (ch, _) = sampler.sample_next("月光", None, &mut rng).unwrap();
            assert_eq!(ch, expected, "rng seed {seed}");
        }
    }

    #[test]
    fn test_high_temperature_spreads_samples() {
        let cold = sampler("月光光照地堂蝦仔你乖", 1e-6);
        let hot = sampler("月光光照地堂蝦仔你乖", 100.0);
        let mut rng = StdRng::seed_from_u64(8);

        let distinct = |s: &StepSampler, rng: &mut StdRng| {
            (0..200)
                .map(|_| s.sample_next("月光", None, rng).unwrap().0)
                .collect::<std::collections::HashSet<_>>()
                .len()
        };
        assert_eq!(distinct(&cold, &mut rng), 1);
        assert!(distinct(&hot, &mut rng) > 1);
    }

    #[test]
    fn test_vocab_model_mismatch_rejected() {
        let vocab = Vocabulary::from_corpus("abc").unwrap();
        let model = CharRnn::seeded(
            RnnConfig {
                vocab_size: 10,
                embed_dim: 2,
                units: 2,
            },
            1,
        )
        .unwrap();
        let err = StepSampler::new(Arc::new(model), Arc::new(vocab), 1.0).unwrap_err();
        assert!(matches!(err, CantopopError::InvalidConfig { .. }));
    }

    #[test]
    fn test_bad_temperature_rejected() {
        let vocab = Vocabulary::from_corpus("abc").unwrap();
        let model = CharRnn::seeded(
            RnnConfig {
                vocab_size: vocab.size(),
                embed_dim: 2,
                units: 2,
            },
            1,
        )
        .unwrap();
        assert!(StepSampler::new(Arc::new(model), Arc::new(vocab), -1.0).is_err());
    }
}
