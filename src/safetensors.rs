//! Safetensors reader and writer
//!
//! Pure Rust implementation of the Safetensors container used for the
//! model weights file.
//!
//! Format specification: <https://github.com/huggingface/safetensors>
//!
//! ```text
//! Safetensors := HEADER METADATA TENSOR_DATA
//!
//! HEADER := metadata_len: u64 (little-endian)
//!
//! METADATA := JSON {
//!   "tensor_name": {
//!     "dtype": "F32" | "F16" | "BF16" | ...,
//!     "shape": [dim1, dim2, ...],
//!     "data_offsets": [start, end]
//!   },
//!   "__metadata__": { ... }   (optional, ignored)
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    io::{Cursor, Read},
};

use half::{bf16, f16};
use serde::{Deserialize, Serialize};

use crate::error::{CantopopError, Result};
use crate::tensor::{element_count, Tensor};

/// Safetensors data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum SafetensorsDtype {
    /// 32-bit float
    F32,
    /// 16-bit float
    F16,
    /// Brain float 16
    BF16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// Boolean
    #[serde(rename = "BOOL", alias = "Bool")]
    Bool,
}

impl SafetensorsDtype {
    /// Bytes per element
    #[must_use]
    pub fn element_size(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::BF16 => 2,
            Self::I64 => 8,
            Self::U8 | Self::Bool => 1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TensorMetadata {
    dtype: SafetensorsDtype,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

/// Tensor metadata
#[derive(Debug, Clone, PartialEq)]
pub struct SafetensorsTensorInfo {
    /// Tensor name
    pub name: String,
    /// Data type
    pub dtype: SafetensorsDtype,
    /// Shape (dimensions)
    pub shape: Vec<usize>,
    /// Data offsets in the data section `[start, end)`
    pub data_offsets: [usize; 2],
}

/// Parsed safetensors file
#[derive(Debug, Clone)]
pub struct SafetensorsFile {
    /// Tensor metadata by name
    pub tensors: HashMap<String, SafetensorsTensorInfo>,
    /// Data section following the JSON header
    pub data: Vec<u8>,
}

impl SafetensorsFile {
    /// Parse a safetensors file from bytes
    ///
    /// # Errors
    ///
    /// Returns error if the header is truncated, the JSON is malformed, or
    /// any tensor's offsets fall outside the data section or disagree with
    /// its shape and dtype.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let metadata_len = Self::parse_header(&mut cursor)?;
        let tensors = Self::parse_metadata(&mut cursor, metadata_len)?;

        let data_start = usize::try_from(8 + metadata_len)
            .map_err(|_| invalid(format!("data offset {metadata_len} + 8 exceeds usize")))?;
        let data = data[data_start..].to_vec();

        for info in tensors.values() {
            let [start, end] = info.data_offsets;
            if start > end || end > data.len() {
                return Err(invalid(format!(
                    "tensor '{}' offsets [{start}, {end}) exceed data size {}",
                    info.name,
                    data.len()
                )));
            }
            let expected = element_count(&info.shape)
                .and_then(|n| n.checked_mul(info.dtype.element_size()))
                .ok_or_else(|| {
                    invalid(format!(
                        "tensor '{}' shape {:?} overflows usize",
                        info.name, info.shape
                    ))
                })?;
            if end - start != expected {
                return Err(invalid(format!(
                    "tensor '{}' holds {} bytes, shape {:?} of {:?} needs {expected}",
                    info.name,
                    end - start,
                    info.shape,
                    info.dtype
                )));
            }
        }

        Ok(Self { tensors, data })
    }

    /// Metadata for a tensor
    #[must_use]
    pub fn get_tensor_info(&self, name: &str) -> Option<&SafetensorsTensorInfo> {
        self.tensors.get(name)
    }

    /// Whether a tensor is present
    #[must_use]
    pub fn has_tensor(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// All tensor names, sorted
    #[must_use]
    pub fn tensor_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tensors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Read a floating point tensor as `f32` values
    ///
    /// F16 and BF16 are widened; integer dtypes are rejected.
    ///
    /// # Errors
    ///
    /// Returns error if the tensor is missing or not a float dtype.
    pub fn get_tensor_f32(&self, name: &str) -> Result<Vec<f32>> {
        let info = self
            .tensors
            .get(name)
            .ok_or_else(|| invalid(format!("tensor '{name}' not found")))?;
        let [start, end] = info.data_offsets;
        let bytes = &self.data[start..end];

        let values = match info.dtype {
            SafetensorsDtype::F32 => bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            SafetensorsDtype::F16 => bytes
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            SafetensorsDtype::BF16 => bytes
                .chunks_exact(2)
                .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            other => {
                return Err(invalid(format!(
                    "tensor '{name}' has dtype {other:?}, expected F32, F16 or BF16"
                )))
            },
        };
        Ok(values)
    }

    /// Read a floating point tensor together with its shape
    ///
    /// # Errors
    ///
    /// Same as [`SafetensorsFile::get_tensor_f32`], plus shape validation.
    pub fn get_tensor(&self, name: &str) -> Result<Tensor<f32>> {
        let values = self.get_tensor_f32(name)?;
        let shape = self.tensors[name].shape.clone();
        Tensor::from_vec(shape, values)
    }

    fn parse_header(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
        let mut buf = [0u8; 8];
        cursor
            .read_exact(&mut buf)
            .map_err(|e| invalid(format!("cannot read header length: {e}")))?;
        Ok(u64::from_le_bytes(buf))
    }

    fn parse_metadata(
        cursor: &mut Cursor<&[u8]>,
        len: u64,
    ) -> Result<HashMap<String, SafetensorsTensorInfo>> {
        let len = usize::try_from(len)
            .map_err(|_| invalid(format!("metadata length {len} exceeds platform usize limit")))?;
        let remaining = cursor.get_ref().len().saturating_sub(8);
        if len > remaining {
            return Err(invalid(format!(
                "metadata length {len} exceeds file size {remaining}"
            )));
        }

        let mut json_bytes = vec![0u8; len];
        cursor
            .read_exact(&mut json_bytes)
            .map_err(|e| invalid(format!("cannot read metadata: {e}")))?;

        let json_value: serde_json::Value = serde_json::from_slice(&json_bytes)
            .map_err(|e| invalid(format!("metadata is not JSON: {e}")))?;
        let json_map = json_value
            .as_object()
            .ok_or_else(|| invalid("metadata must be a JSON object".to_string()))?;

        let mut tensors = HashMap::new();
        for (name, value) in json_map {
            if name.starts_with("__") {
                continue;
            }
            let meta: TensorMetadata = serde_json::from_value(value.clone())
                .map_err(|e| invalid(format!("tensor '{name}': {e}")))?;
            tensors.insert(
                name.clone(),
                SafetensorsTensorInfo {
                    name: name.clone(),
                    dtype: meta.dtype,
                    shape: meta.shape,
                    data_offsets: meta.data_offsets,
                },
            );
        }

        Ok(tensors)
    }
}

/// Serialize `f32` tensors into safetensors bytes
///
/// Tensors are laid out in name order so the output is deterministic.
///
/// # Errors
///
/// Returns error if two tensors share a name.
pub fn to_safetensors_bytes(tensors: &[(&str, &Tensor<f32>)]) -> Result<Vec<u8>> {
    let mut sorted: BTreeMap<&str, &Tensor<f32>> = BTreeMap::new();
    for (name, tensor) in tensors {
        if sorted.insert(*name, *tensor).is_some() {
            return Err(invalid(format!("duplicate tensor name '{name}'")));
        }
    }

    let mut header = serde_json::Map::new();
    let mut body = Vec::new();
    for (name, tensor) in sorted {
        let start = body.len();
        for value in tensor.data() {
            body.extend_from_slice(&value.to_le_bytes());
        }
        header.insert(
            name.to_string(),
            serde_json::json!({
                "dtype": "F32",
                "shape": tensor.shape(),
                "data_offsets": [start, body.len()],
            }),
        );
    }

    let json = serde_json::Value::Object(header).to_string();
    let mut out = Vec::with_capacity(8 + json.len() + body.len());
    out.extend_from_slice(&(json.len() as u64).to_le_bytes());
    out.extend_from_slice(json.as_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

fn invalid(reason: String) -> CantopopError {
    CantopopError::InvalidWeights { reason }
}
