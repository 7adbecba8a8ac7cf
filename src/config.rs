use crate::engine::{GraphEncoding, TensorLayout};
use clap::Parser;
use std::path::PathBuf;

/// Default location of the serialized classifier
pub const DEFAULT_MODEL_PATH: &str = "cifar10_tl.onnx";

/// Default address to bind to, all interfaces
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port to listen on
pub const DEFAULT_PORT: u16 = 5000;

/// Default upper bound of an uploaded request body in bytes
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Class names of the bundled CIFAR-10 transfer-learning model, in training order.
pub const CIFAR10_LABELS: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// Image classification service
#[derive(Parser, Debug, Clone)]
#[command(name = "imageclassifier")]
#[command(version)]
#[command(about = "Serves a pretrained image classifier over HTTP")]
pub struct Cli {
    /// Path to the serialized model (ONNX or TensorFlow frozen graph)
    #[arg(long, env = "CLASSIFIER_MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    pub model_path: PathBuf,

    /// Graph encoding of the model; derived from the file extension when omitted
    #[arg(long, env = "CLASSIFIER_GRAPH_ENCODING")]
    pub graph_encoding: Option<GraphEncoding>,

    /// Memory layout of the model's input tensor (nhwc or nchw)
    #[arg(long, env = "CLASSIFIER_TENSOR_LAYOUT", default_value = "nhwc")]
    pub tensor_layout: TensorLayout,

    /// Newline separated class names; the CIFAR-10 names are used when omitted
    #[arg(long, env = "CLASSIFIER_LABELS_FILE")]
    pub labels_file: Option<PathBuf>,

    /// Apply a softmax to the raw model output before mapping it to labels
    #[arg(long, env = "CLASSIFIER_SOFTMAX")]
    pub softmax: bool,

    /// Host to bind to
    #[arg(long, env = "CLASSIFIER_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "CLASSIFIER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum accepted request body in bytes
    #[arg(long, env = "CLASSIFIER_BODY_LIMIT", default_value_t = DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,
}

/// Configuration of the service, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub model_path: PathBuf,
    pub graph_encoding: Option<GraphEncoding>,
    pub tensor_layout: TensorLayout,
    pub labels_file: Option<PathBuf>,
    pub apply_softmax: bool,
    pub host: String,
    pub port: u16,
    pub body_limit: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            graph_encoding: None,
            tensor_layout: TensorLayout::default(),
            labels_file: None,
            apply_softmax: false,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl From<Cli> for ServiceConfig {
    fn from(cli: Cli) -> ServiceConfig {
        ServiceConfig {
            model_path: cli.model_path,
            graph_encoding: cli.graph_encoding,
            tensor_layout: cli.tensor_layout,
            labels_file: cli.labels_file,
            apply_softmax: cli.softmax,
            host: cli.host,
            port: cli.port,
            body_limit: cli.body_limit,
        }
    }
}

impl ServiceConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
