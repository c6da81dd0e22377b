//! Resolves `@(type)[instruction]` markers in notes through Gemini.

pub mod assets;
pub mod client;
pub mod diagnostics;
pub mod envelope;
pub mod error;
pub mod rewriter;

pub use assets::AssetMaterializer;
pub use client::{ContentGenerator, GeminiClient, ImagePayload};
pub use diagnostics::{DiagnosticsReporter, FailureReport};
pub use error::{GenerationError, ProcessError};
pub use rewriter::{DocumentStore, FsDocumentStore, MetaProcessor, Notifier, ProcessOutcome};
