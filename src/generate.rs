//! Lyrics generation loop
//!
//! Drives the [`StepSampler`] one character at a time, carrying the GRU
//! state between steps. The seed is fed once; every later step feeds only
//! the character produced by the step before it.

use rand::Rng;
use tracing::debug;

use crate::{error::Result, model::HiddenState, sampler::StepSampler};

/// Seeds are cut to this many characters
pub const MAX_SEED_CHARS: usize = 12;

/// Fewest characters generated per request
pub const MIN_STEPS: usize = 12;

/// Most characters generated per request
pub const MAX_STEPS: usize = 720;

/// Body returned when the seed is empty
pub const NO_SEED_MESSAGE: &str = "No seed sentence provided";

/// A seed and step count with the truncation and clamping already applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    seed: String,
    steps: usize,
}

impl GenerationRequest {
    /// Keep the first [`MAX_SEED_CHARS`] characters of `seed` and clamp
    /// `length` into `[MIN_STEPS, MAX_STEPS]`
    #[must_use]
    pub fn new(seed: &str, length: i64) -> Self {
        let seed = seed.chars().take(MAX_SEED_CHARS).collect();
        let steps = usize::try_from(length)
            .unwrap_or(MIN_STEPS)
            .clamp(MIN_STEPS, MAX_STEPS);
        Self { seed, steps }
    }

    /// Truncated seed
    #[must_use]
    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Number of characters to generate
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }
}

/// Result of a generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The seed was empty; nothing was run
    NoSeed,
    /// Seed followed by the sampled characters
    Generated {
        /// Full text, seed included
        text: String,
        /// Characters sampled after the seed
        steps: usize,
    },
}

impl GenerationOutcome {
    /// Text to send back to the client
    #[must_use]
    pub fn into_body(self) -> String {
        match self {
            Self::NoSeed => NO_SEED_MESSAGE.to_string(),
            Self::Generated { text, .. } => text,
        }
    }
}

/// Runs the generation loop over a shared sampler
#[derive(Debug, Clone)]
pub struct Generator {
    sampler: StepSampler,
}

impl Generator {
    /// Wrap a sampler
    #[must_use]
    pub fn new(sampler: StepSampler) -> Self {
        Self { sampler }
    }

    /// Underlying sampler
    #[must_use]
    pub fn sampler(&self) -> &StepSampler {
        &self.sampler
    }

    /// Generate lyrics continuing `seed` using the thread-local RNG
    ///
    /// # Errors
    ///
    /// Returns error if any sampling step fails.
    pub fn generate(&self, seed: &str, length: i64) -> Result<GenerationOutcome> {
        self.generate_with_rng(seed, length, &mut rand::thread_rng())
    }

    /// Generate lyrics continuing `seed` with the given RNG
    ///
    /// # Errors
    ///
    /// Returns error if any sampling step fails.
    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        seed: &str,
        length: i64,
        rng: &mut R,
    ) -> Result<GenerationOutcome> {
        if seed.is_empty() {
            return Ok(GenerationOutcome::NoSeed);
        }

        let request = GenerationRequest::new(seed, length);
        debug!(
            seed = request.seed(),
            steps = request.steps(),
            "generating lyrics"
        );

        let mut text = String::from(request.seed());
        let mut input = String::from(request.seed());
        let mut state: Option<HiddenState> = None;

        for _ in 0..request.steps() {
            let (next, next_state) = self.sampler.sample_next(&input, state.as_ref(), rng)?;
            text.push_str(&next);
            input = next;
            state = Some(next_state);
        }

        Ok(GenerationOutcome::Generated {
            text,
            steps: request.steps(),
        })
    }
}
