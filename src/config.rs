//! Server configuration and startup loading

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::info;

use crate::{
    error::{CantopopError, Result},
    generate::Generator,
    model::{CharRnn, RnnConfig},
    sampler::{StepSampler, DEFAULT_TEMPERATURE},
    vocab::Vocabulary,
};

/// Default bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port
pub const DEFAULT_PORT: u16 = 5000;

/// Default corpus location
pub const DEFAULT_CORPUS_PATH: &str = "./reduced_text.txt";

/// Default weights location
pub const DEFAULT_WEIGHTS_PATH: &str = "./model_weights.safetensors";

/// Embedding width of the demo model
pub const DEMO_EMBED_DIM: usize = 64;

/// GRU width of the demo model
pub const DEMO_UNITS: usize = 128;

/// RNG seed for the demo model's weights
pub const DEMO_SEED: u64 = 42;

/// Everything needed to load the generator and bind the server
#[derive(Debug, Clone, PartialEq)]
pub struct ServeConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// UTF-8 training corpus the vocabulary is derived from
    pub corpus_path: PathBuf,
    /// Safetensors weights file
    pub weights_path: PathBuf,
    /// Sampling temperature
    pub temperature: f32,
    /// Use randomly initialised weights instead of `weights_path`
    pub demo: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            corpus_path: PathBuf::from(DEFAULT_CORPUS_PATH),
            weights_path: PathBuf::from(DEFAULT_WEIGHTS_PATH),
            temperature: DEFAULT_TEMPERATURE,
            demo: false,
        }
    }
}

impl ServeConfig {
    /// Parse `host:port` into a socket address
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the host is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| CantopopError::InvalidConfig {
                reason: format!("invalid address {}:{}: {e}", self.host, self.port),
            })
    }
}

/// Load the vocabulary and model and validate them together
///
/// # Errors
///
/// Returns error if the corpus or weights cannot be loaded, or they
/// disagree with each other, or the temperature is unusable.
pub fn load_generator(config: &ServeConfig) -> Result<Generator> {
    let vocab = Vocabulary::from_path(&config.corpus_path)?;
    info!(
        path = %config.corpus_path.display(),
        vocab_size = vocab.size(),
        "loaded vocabulary"
    );

    let model = if config.demo {
        demo_model(vocab.size())?
    } else {
        load_model(&config.weights_path)?
    };
    let dims = model.config();
    info!(
        vocab_size = dims.vocab_size,
        embed_dim = dims.embed_dim,
        units = dims.units,
        demo = config.demo,
        "loaded model"
    );

    let sampler = StepSampler::new(Arc::new(model), Arc::new(vocab), config.temperature)?;
    Ok(Generator::new(sampler))
}

fn load_model(path: &Path) -> Result<CharRnn> {
    info!(path = %path.display(), "loading weights");
    CharRnn::load(path)
}

fn demo_model(vocab_size: usize) -> Result<CharRnn> {
    CharRnn::seeded(
        RnnConfig {
            vocab_size,
            embed_dim: DEMO_EMBED_DIM,
            units: DEMO_UNITS,
        },
        DEMO_SEED,
    )
}
