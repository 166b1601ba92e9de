//! Character vocabulary
//!
//! Maps single characters to the integer ids the model was trained on and
//! back. The table is derived from the training corpus: every distinct
//! character, sorted by Unicode scalar value, preceded by the `[UNK]`
//! sentinel at id 0.
//!
//! ## Example
//!
//! ```
//! use cantopop::Vocabulary;
//!
//! let vocab = Vocabulary::from_corpus("banana").unwrap();
//! assert_eq!(vocab.size(), 4); // [UNK], a, b, n
//! assert_eq!(vocab.id_of('a'), 1);
//! assert_eq!(vocab.char_of(3), "n");
//! assert_eq!(vocab.id_of('z'), vocab.unk_id());
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::{CantopopError, Result};

/// Sentinel token standing for any character outside the corpus
pub const UNK_TOKEN: &str = "[UNK]";

/// Bidirectional mapping between characters and model ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    /// Id to token; index 0 is [`UNK_TOKEN`]
    id_to_token: Vec<String>,
    /// Character to id
    char_to_id: HashMap<char, u32>,
}

impl Vocabulary {
    /// Build the vocabulary from the full text of a corpus
    ///
    /// # Errors
    ///
    /// Returns error if the corpus has no characters or more distinct
    /// characters than fit in a `u32` id.
    pub fn from_corpus(text: &str) -> Result<Self> {
        let distinct: BTreeSet<char> = text.chars().collect();
        if distinct.is_empty() {
            return Err(CantopopError::InvalidCorpus {
                reason: "corpus contains no characters".to_string(),
            });
        }

        let mut id_to_token = Vec::with_capacity(distinct.len() + 1);
        let mut char_to_id = HashMap::with_capacity(distinct.len());
        id_to_token.push(UNK_TOKEN.to_string());

        for ch in distinct {
            let id = u32::try_from(id_to_token.len()).map_err(|_| CantopopError::InvalidCorpus {
                reason: format!("character id {} exceeds u32 limit", id_to_token.len()),
            })?;
            char_to_id.insert(ch, id);
            id_to_token.push(ch.to_string());
        }

        Ok(Self {
            id_to_token,
            char_to_id,
        })
    }

    /// Read a UTF-8 corpus file and build the vocabulary from it
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid UTF-8, or is
    /// empty.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| CantopopError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|e| CantopopError::InvalidCorpus {
            reason: format!("{} is not valid UTF-8: {e}", path.display()),
        })?;
        Self::from_corpus(&text)
    }

    /// Id of a character, or the unknown id if it is not in the corpus
    #[must_use]
    pub fn id_of(&self, ch: char) -> u32 {
        self.char_to_id.get(&ch).copied().unwrap_or(self.unk_id())
    }

    /// Token for an id; ids past the table map to [`UNK_TOKEN`]
    #[must_use]
    pub fn char_of(&self, id: u32) -> &str {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.id_to_token.get(idx))
            .map_or(UNK_TOKEN, String::as_str)
    }

    /// Split text into characters and map each to its id
    #[must_use]
    pub fn encode(&self, text: &str) -> Vec<u32> {
        text.chars().map(|ch| self.id_of(ch)).collect()
    }

    /// Join the tokens for a sequence of ids
    #[must_use]
    pub fn decode(&self, ids: &[u32]) -> String {
        ids.iter().map(|&id| self.char_of(id)).collect()
    }

    /// Id of the [`UNK_TOKEN`] sentinel
    #[must_use]
    pub fn unk_id(&self) -> u32 {
        0
    }

    /// Number of entries including the sentinel
    #[must_use]
    pub fn size(&self) -> usize {
        self.id_to_token.len()
    }

    /// Corpus characters in id order, sentinel excluded
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.id_to_token
            .iter()
            .skip(1)
            .filter_map(|token| token.chars().next())
    }
}
