pub mod completion;
pub mod compute;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ocr;
pub mod xml;

pub use completion::{CompletionEngine, CompletionOptions, HttpCompletionClient};
pub use compute::{ComputeEngine, HttpComputeClient, QueryRequest, UpstreamBody};
pub use config::{CompletionConfig, ComputeConfig, OcrConfig};
pub use dispatch::dispatch;
pub use error::UpstreamError;
pub use ocr::HttpOcrClient;
