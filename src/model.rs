//! Character-level recurrent model
//!
//! Embedding → GRU → dense projection onto the vocabulary. The layer
//! layout and weight names follow a Keras `Embedding`/`GRU`/`Dense` stack
//! exported to safetensors:
//!
//! | tensor                   | shape                    |
//! |--------------------------|--------------------------|
//! | `embedding.embeddings`   | `[vocab, embed_dim]`     |
//! | `gru.kernel`             | `[embed_dim, 3 * units]` |
//! | `gru.recurrent_kernel`   | `[units, 3 * units]`     |
//! | `gru.bias`               | `[2, 3 * units]`         |
//! | `dense.kernel`           | `[units, vocab]`         |
//! | `dense.bias`             | `[vocab]`                |
//!
//! GRU gates are packed in `z | r | h` order and use the `reset_after`
//! formulation, where the reset gate scales the recurrent projection after
//! its bias is added.

use std::path::Path;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    error::{CantopopError, Result},
    safetensors::{to_safetensors_bytes, SafetensorsFile},
    tensor::Tensor,
};

/// Tensor names inside the weights file
pub mod names {
    /// Embedding table
    pub const EMBEDDING: &str = "embedding.embeddings";
    /// GRU input kernel
    pub const GRU_KERNEL: &str = "gru.kernel";
    /// GRU recurrent kernel
    pub const GRU_RECURRENT_KERNEL: &str = "gru.recurrent_kernel";
    /// GRU input and recurrent biases
    pub const GRU_BIAS: &str = "gru.bias";
    /// Output projection kernel
    pub const DENSE_KERNEL: &str = "dense.kernel";
    /// Output projection bias
    pub const DENSE_BIAS: &str = "dense.bias";
}

/// Model dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RnnConfig {
    /// Vocabulary size including the unknown token
    pub vocab_size: usize,
    /// Embedding width
    pub embed_dim: usize,
    /// GRU hidden units
    pub units: usize,
}

impl RnnConfig {
    /// Check that no dimension is zero
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first zero dimension.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("vocab_size", self.vocab_size),
            ("embed_dim", self.embed_dim),
            ("units", self.units),
        ] {
            if value == 0 {
                return Err(CantopopError::InvalidConfig {
                    reason: format!("{name} must be > 0"),
                });
            }
        }
        Ok(())
    }
}

/// Recurrent memory carried between generation steps
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenState(Vec<f32>);

impl HiddenState {
    /// All-zero state, the model default
    #[must_use]
    pub fn zeros(units: usize) -> Self {
        Self(vec![0.0; units])
    }

    /// Wrap raw state values
    #[must_use]
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// State values
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Number of units
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the state has no units
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Token embedding table
#[derive(Debug, Clone)]
pub struct Embedding {
    weight: Tensor<f32>,
}

impl Embedding {
    /// Look up one id
    ///
    /// # Errors
    ///
    /// Returns error if the id is outside the table.
    pub fn lookup(&self, id: u32) -> Result<&[f32]> {
        let rows = self.weight.num_rows();
        usize::try_from(id)
            .ok()
            .filter(|&idx| idx < rows)
            .map_or_else(
                || {
                    Err(CantopopError::InvalidShape {
                        reason: format!("token id {id} out of range for vocabulary of {rows}"),
                    })
                },
                |idx| self.weight.row(idx),
            )
    }
}

/// Single GRU layer (`reset_after` variant)
#[derive(Debug, Clone)]
pub struct Gru {
    kernel: Tensor<f32>,
    recurrent_kernel: Tensor<f32>,
    input_bias: Vec<f32>,
    recurrent_bias: Vec<f32>,
    units: usize,
}

impl Gru {
    /// Advance the state by one input vector
    ///
    /// # Errors
    ///
    /// Returns error if `x` or `h` have the wrong width.
    pub fn cell(&self, x: &[f32], h: &[f32]) -> Result<Vec<f32>> {
        let n = self.units;
        if h.len() != n {
            return Err(CantopopError::InvalidShape {
                reason: format!("hidden state has {} units, model has {n}", h.len()),
            });
        }

        let mut xw = self.input_bias.clone();
        self.kernel.vecmat_into(x, &mut xw)?;
        let mut hu = self.recurrent_bias.clone();
        self.recurrent_kernel.vecmat_into(h, &mut hu)?;

        let mut next = Vec::with_capacity(n);
        for j in 0..n {
            let z = sigmoid(xw[j] + hu[j]);
            let r = sigmoid(xw[n + j] + hu[n + j]);
            let candidate = (xw[2 * n + j] + r * hu[2 * n + j]).tanh();
            next.push(z * h[j] + (1.0 - z) * candidate);
        }
        Ok(next)
    }
}

/// Output projection onto the vocabulary
#[derive(Debug, Clone)]
pub struct Dense {
    kernel: Tensor<f32>,
    bias: Vec<f32>,
}

impl Dense {
    /// Project a hidden vector to logits
    ///
    /// # Errors
    ///
    /// Returns error if `h` has the wrong width.
    pub fn forward(&self, h: &[f32]) -> Result<Vec<f32>> {
        let mut out = self.bias.clone();
        self.kernel.vecmat_into(h, &mut out)?;
        Ok(out)
    }
}

/// Character-level GRU language model
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct CharRnn {
    config: RnnConfig,
    embedding: Embedding,
    gru: Gru,
    dense: Dense,
}

impl CharRnn {
    /// Load weights from a safetensors file on disk
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or its tensors do not form
    /// a consistent model.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| CantopopError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_safetensors(&bytes)
    }

    /// Build the model from safetensors bytes
    ///
    /// Dimensions are inferred from the embedding and GRU kernels and every
    /// other tensor is checked against them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidWeights` on a missing tensor or shape mismatch.
    pub fn from_safetensors(bytes: &[u8]) -> Result<Self> {
        let file = SafetensorsFile::from_bytes(bytes)?;

        let embedding = file.get_tensor(names::EMBEDDING)?;
        let [vocab_size, embed_dim] = dims2(names::EMBEDDING, &embedding)?;
        let kernel = file.get_tensor(names::GRU_KERNEL)?;
        let [_, packed] = dims2(names::GRU_KERNEL, &kernel)?;
        if packed % 3 != 0 {
            return Err(CantopopError::InvalidWeights {
                reason: format!("{} width {packed} is not a multiple of 3", names::GRU_KERNEL),
            });
        }
        let config = RnnConfig {
            vocab_size,
            embed_dim,
            units: packed / 3,
        };

        Self::from_tensors(
            config,
            embedding,
            kernel,
            file.get_tensor(names::GRU_RECURRENT_KERNEL)?,
            file.get_tensor(names::GRU_BIAS)?,
            file.get_tensor(names::DENSE_KERNEL)?,
            file.get_tensor(names::DENSE_BIAS)?,
        )
    }

    /// Model with small deterministic random weights
    ///
    /// Used by demo mode, tests and benchmarks where no trained weights are
    /// available.
    ///
    /// # Errors
    ///
    /// Returns error if any dimension is zero.
    pub fn seeded(config: RnnConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let RnnConfig {
            vocab_size,
            embed_dim,
            units,
        } = config;
        let mut random = |shape: Vec<usize>| {
            let len: usize = shape.iter().product();
            let data: Vec<f32> = (0..len).map(|_| rng.gen_range(-0.5f32..0.5)).collect();
            Tensor::from_vec(shape, data)
        };

        Self::from_tensors(
            config,
            random(vec![vocab_size, embed_dim])?,
            random(vec![embed_dim, 3 * units])?,
            random(vec![units, 3 * units])?,
            random(vec![2, 3 * units])?,
            random(vec![units, vocab_size])?,
            random(vec![vocab_size])?,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn from_tensors(
        config: RnnConfig,
        embedding: Tensor<f32>,
        kernel: Tensor<f32>,
        recurrent_kernel: Tensor<f32>,
        bias: Tensor<f32>,
        dense_kernel: Tensor<f32>,
        dense_bias: Tensor<f32>,
    ) -> Result<Self> {
        config.validate()?;
        let RnnConfig {
            vocab_size,
            embed_dim,
            units,
        } = config;

        expect_shape(names::EMBEDDING, &embedding, &[vocab_size, embed_dim])?;
        expect_shape(names::GRU_KERNEL, &kernel, &[embed_dim, 3 * units])?;
        expect_shape(names::GRU_RECURRENT_KERNEL, &recurrent_kernel, &[units, 3 * units])?;
        expect_shape(names::GRU_BIAS, &bias, &[2, 3 * units])?;
        expect_shape(names::DENSE_KERNEL, &dense_kernel, &[units, vocab_size])?;
        expect_shape(names::DENSE_BIAS, &dense_bias, &[vocab_size])?;

        let input_bias = bias.row(0)?.to_vec();
        let recurrent_bias = bias.row(1)?.to_vec();

        Ok(Self {
            config,
            embedding: Embedding { weight: embedding },
            gru: Gru {
                kernel,
                recurrent_kernel,
                input_bias,
                recurrent_bias,
                units,
            },
            dense: Dense {
                kernel: dense_kernel,
                bias: dense_bias.into_data(),
            },
        })
    }

    /// Serialize the weights in the layout [`CharRnn::from_safetensors`] reads
    ///
    /// # Errors
    ///
    /// Returns error if a tensor cannot be rebuilt.
    pub fn to_safetensors(&self) -> Result<Vec<u8>> {
        let units = self.config.units;
        let mut bias = self.gru.input_bias.clone();
        bias.extend_from_slice(&self.gru.recurrent_bias);
        let bias = Tensor::from_vec(vec![2, 3 * units], bias)?;
        let dense_bias = Tensor::from_vec(vec![self.config.vocab_size], self.dense.bias.clone())?;

        to_safetensors_bytes(&[
            (names::EMBEDDING, &self.embedding.weight),
            (names::GRU_KERNEL, &self.gru.kernel),
            (names::GRU_RECURRENT_KERNEL, &self.gru.recurrent_kernel),
            (names::GRU_BIAS, &bias),
            (names::DENSE_KERNEL, &self.dense.kernel),
            (names::DENSE_BIAS, &dense_bias),
        ])
    }

    /// Model dimensions
    #[must_use]
    pub fn config(&self) -> &RnnConfig {
        &self.config
    }

    /// Run the network over a sequence of ids
    ///
    /// Returns logits `[ids.len(), vocab_size]` for every timestep and the
    /// state after the last one. With `state == None` the GRU starts from
    /// zeros.
    ///
    /// # Errors
    ///
    /// Returns error if `ids` is empty, an id is out of range, or the state
    /// width does not match the model.
    pub fn step(
        &self,
        ids: &[u32],
        state: Option<&HiddenState>,
    ) -> Result<(Tensor<f32>, HiddenState)> {
        if ids.is_empty() {
            return Err(CantopopError::InvalidShape {
                reason: "input sequence cannot be empty".to_string(),
            });
        }

        let mut h = match state {
            Some(state) => state.as_slice().to_vec(),
            None => vec![0.0; self.config.units],
        };
        let mut logits = Vec::with_capacity(ids.len() * self.config.vocab_size);

        for &id in ids {
            let x = self.embedding.lookup(id)?;
            h = self.gru.cell(x, &h)?;
            logits.extend(self.dense.forward(&h)?);
        }

        let logits = Tensor::from_vec(vec![ids.len(), self.config.vocab_size], logits)?;
        Ok((logits, HiddenState(h)))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn dims2(name: &str, tensor: &Tensor<f32>) -> Result<[usize; 2]> {
    match tensor.shape() {
        &[rows, cols] => Ok([rows, cols]),
        other => Err(CantopopError::InvalidWeights {
            reason: format!("{name} must be 2-D, got shape {other:?}"),
        }),
    }
}

fn expect_shape(name: &str, tensor: &Tensor<f32>, expected: &[usize]) -> Result<()> {
    if tensor.shape() == expected {
        Ok(())
    } else {
        Err(CantopopError::InvalidWeights {
            reason: format!(
                "{name} has shape {:?}, expected {expected:?}",
                tensor.shape()
            ),
        })
    }
}
