use crate::engine::GraphEncoding;
use crate::postprocess::ClassLabels;
use std::path::Path;
use tracing::info;

/// Raw model artifact plus the encoding it will be parsed with.
pub struct ModelRawData {
    pub model: Vec<u8>,
    pub encoding: GraphEncoding,
}

/// Read the model artifact from disk.
///
/// An explicitly configured encoding wins over the one derived from the file
/// extension.
pub fn fetch_model(path: &Path, configured: Option<GraphEncoding>) -> DataLoaderResult<ModelRawData> {
    let encoding = match configured {
        Some(encoding) => encoding,
        None => encoding_from_path(path)?,
    };

    info!(
        "loading model from '{}' as {:?}",
        path.display(),
        encoding
    );

    let model = std::fs::read(path).map_err(|e| {
        DataLoaderError::ModelLoaderReadError(format!("'{}': {}", path.display(), e))
    })?;

    if model.is_empty() {
        return Err(DataLoaderError::ModelLoaderReadError(format!(
            "'{}' is empty",
            path.display()
        )));
    }

    info!("read model of size '{}' bytes", model.len());

    Ok(ModelRawData { model, encoding })
}

/// Graph encoding implied by a model's file extension.
pub fn encoding_from_path(path: &Path) -> DataLoaderResult<GraphEncoding> {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("onnx") => Ok(GraphEncoding::Onnx),
        Some("pb") => Ok(GraphEncoding::Tensorflow),
        other => Err(DataLoaderError::ModelLoaderMetadataError(format!(
            "cannot derive graph encoding from extension {:?} of '{}', set it explicitly",
            other,
            path.display()
        ))),
    }
}

/// Class labels from a newline separated file, or the bundled CIFAR-10 names.
pub fn load_labels(path: Option<&Path>) -> DataLoaderResult<ClassLabels> {
    let labels = match path {
        None => ClassLabels::cifar10(),
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                DataLoaderError::LabelsReadError(format!("'{}': {}", path.display(), e))
            })?;
            ClassLabels::from_lines(&text)
        }
    };

    if labels.is_empty() {
        return Err(DataLoaderError::EmptyLabels);
    }

    if let Some(label) = labels.first_duplicate() {
        return Err(DataLoaderError::DuplicateLabel(label.to_string()));
    }

    info!("{} class labels: {:?}", labels.len(), labels.as_slice());

    Ok(labels)
}

/// Data Loader Result
pub type DataLoaderResult<T> = Result<T, DataLoaderError>;

#[derive(Debug, thiserror::Error)]
pub enum DataLoaderError {
    #[error("unable to read model {0}")]
    ModelLoaderReadError(String),

    #[error("Error parsing metadata {0}")]
    ModelLoaderMetadataError(String),

    #[error("unable to read class labels {0}")]
    LabelsReadError(String),

    #[error("class label set is empty")]
    EmptyLabels,

    #[error("class label '{0}' is listed more than once")]
    DuplicateLabel(String),
}
