use ndarray::{ArrayD, ArrayViewD, IxDyn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::LstmError;
use crate::models::regressor::LSTMRegressor;

/// Flat, shape-tagged copy of one parameter array
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SerializableArray {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl SerializableArray {
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Restores the array, failing if `data` does not fill `shape`.
    pub fn into_array(self) -> Result<ArrayD<f32>, PersistenceError> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.data).map_err(|e| PersistenceError::Incompatible(e.into()))
    }
}

impl From<ArrayViewD<'_, f32>> for SerializableArray {
    fn from(array: ArrayViewD<'_, f32>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.shape().to_vec(),
        }
    }
}

/// Model metadata for tracking training information
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: String,
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub stateful: bool,
    pub total_epochs: usize,
    pub final_loss: Option<f32>,
    pub description: Option<String>,
}

/// Parameters in model order plus the metadata describing them
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SavedModel {
    pub params: Vec<SerializableArray>,
    pub metadata: ModelMetadata,
}

impl SavedModel {
    /// Rebuilds the regressor and checks it against the recorded sizes.
    pub fn into_model(self) -> Result<(LSTMRegressor, ModelMetadata), PersistenceError> {
        let params = arrays_from(self.params)?;
        let model = LSTMRegressor::from_params(params, self.metadata.stateful)?;

        let meta = &self.metadata;
        let recorded = [meta.input_size, meta.hidden_size, meta.output_size];
        let actual = [model.input_size, model.hidden_size, model.output_size];
        if recorded != actual {
            return Err(LstmError::shape_mismatch("model dimensions", &actual, &recorded).into());
        }
        Ok((model, self.metadata))
    }
}

fn arrays_from(params: Vec<SerializableArray>) -> Result<Vec<ArrayD<f32>>, PersistenceError> {
    params.into_iter().map(SerializableArray::into_array).collect()
}

/// Errors that can occur during model persistence operations
#[derive(Debug)]
pub enum PersistenceError {
    IoError(std::io::Error),
    SerializationError(String),
    /// The file decoded, but its parameters do not fit the target model.
    Incompatible(LstmError),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::IoError(err) => write!(f, "IO error: {}", err),
            PersistenceError::SerializationError(err) => write!(f, "Serialization error: {}", err),
            PersistenceError::Incompatible(err) => write!(f, "Incompatible parameters: {}", err),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::IoError(err) => Some(err),
            PersistenceError::SerializationError(_) => None,
            PersistenceError::Incompatible(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(error: std::io::Error) -> Self {
        PersistenceError::IoError(error)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(error: serde_json::Error) -> Self {
        PersistenceError::SerializationError(error.to_string())
    }
}

impl From<bincode::Error> for PersistenceError {
    fn from(error: bincode::Error) -> Self {
        PersistenceError::SerializationError(error.to_string())
    }
}

impl From<LstmError> for PersistenceError {
    fn from(error: LstmError) -> Self {
        PersistenceError::Incompatible(error)
    }
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save to JSON format (human-readable)
    pub fn save_to_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(value)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn load_from_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save to bincode (compact and fast)
    pub fn save_to_binary<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<(), PersistenceError> {
        let encoded = bincode::serialize(value)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    pub fn load_from_binary<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        Ok(bincode::deserialize(&contents)?)
    }

    /// Snapshot a model together with freshly stamped metadata
    pub fn create_saved_model(
        model: &LSTMRegressor,
        model_name: String,
        total_epochs: usize,
        final_loss: Option<f32>,
        description: Option<String>,
    ) -> SavedModel {
        let metadata = ModelMetadata {
            model_name,
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            input_size: model.input_size,
            hidden_size: model.hidden_size,
            output_size: model.output_size,
            stateful: model.is_stateful(),
            total_epochs,
            final_loss,
            description,
        };

        SavedModel {
            params: model.params().into_iter().map(SerializableArray::from).collect(),
            metadata,
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("json")
}

/// Saving and loading a whole model, format chosen by file extension
/// (`.json` for JSON, anything else for bincode)
pub trait PersistentModel {
    fn save<P: AsRef<Path>>(&self, path: P, metadata: ModelMetadata) -> Result<(), PersistenceError>;

    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), PersistenceError>
    where
        Self: Sized;
}

impl PersistentModel for LSTMRegressor {
    fn save<P: AsRef<Path>>(&self, path: P, metadata: ModelMetadata) -> Result<(), PersistenceError> {
        let saved_model = SavedModel {
            params: self.params().into_iter().map(SerializableArray::from).collect(),
            metadata,
        };

        let path = path.as_ref();
        if is_json(path) {
            ModelPersistence::save_to_json(&saved_model, path)?;
        } else {
            ModelPersistence::save_to_binary(&saved_model, path)?;
        }
        log::info!("saved model '{}' to {}", saved_model.metadata.model_name, path.display());
        Ok(())
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), PersistenceError> {
        let path = path.as_ref();
        let saved_model: SavedModel = if is_json(path) {
            ModelPersistence::load_from_json(path)?
        } else {
            ModelPersistence::load_from_binary(path)?
        };

        let (model, metadata) = saved_model.into_model()?;
        log::info!(
            "loaded model '{}' ({} -> {} -> {}) from {}",
            metadata.model_name,
            metadata.input_size,
            metadata.hidden_size,
            metadata.output_size,
            path.display()
        );
        Ok((model, metadata))
    }
}

impl LSTMRegressor {
    /// Writes the parameter list alone, in model order, as a bincode blob.
    pub fn save_params<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistenceError> {
        let params: Vec<SerializableArray> = self.params().into_iter().map(SerializableArray::from).collect();
        ModelPersistence::save_to_binary(&params, path.as_ref())?;
        log::info!("saved {} parameter arrays to {}", params.len(), path.as_ref().display());
        Ok(())
    }

    /// Reads a blob written by [`save_params`](Self::save_params) into this model.
    ///
    /// The stored list must match this model in length and shapes; otherwise
    /// the model is left untouched.
    pub fn load_params<P: AsRef<Path>>(&mut self, path: P) -> Result<(), PersistenceError> {
        let stored: Vec<SerializableArray> = ModelPersistence::load_from_binary(path.as_ref())?;
        self.set_params(arrays_from(stored)?)?;
        log::info!("loaded parameters from {}", path.as_ref().display());
        Ok(())
    }
}
