use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use metascribe_contracts::events::{EventLog, EventPayload};
use metascribe_contracts::markers::{parse_meta_actions, ActionKind, MetaAction};
use metascribe_contracts::settings::Settings;
use metascribe_contracts::tone::{infer_tone_with, EndingCountStrategy, ToneStrategy};
use serde_json::{json, Value};

use crate::assets::{markdown_image, AssetMaterializer};
use crate::client::ContentGenerator;
use crate::error::ProcessError;

/// Named text documents owned by the host.
pub trait DocumentStore {
    fn read(&self, name: &str) -> Result<String>;
    fn write(&self, name: &str, content: &str) -> Result<()>;
}

/// User-visible notices (status line, toast, stderr).
pub trait Notifier {
    fn notify(&self, message: &str);
}

/// Documents stored as files below a root directory.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Joins `name` onto the root. Only plain relative names are accepted.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = !relative.is_relative()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_)
                )
            });
        if escapes {
            bail!("document name must not leave the store root: {name}");
        }
        Ok(self.root.join(relative))
    }
}

impl DocumentStore for FsDocumentStore {
    fn read(&self, name: &str) -> Result<String> {
        let path = self.resolve(name)?;
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))
    }

    fn write(&self, name: &str, content: &str) -> Result<()> {
        let path = self.resolve(name)?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed writing {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub markers: usize,
    /// Markers that received non-empty content. Empty results delete the
    /// marker and are not counted.
    pub replaced: usize,
    pub saved: bool,
}

/// Resolves every marker of one document and writes the result back once.
pub struct MetaProcessor<'a> {
    settings: &'a Settings,
    documents: &'a dyn DocumentStore,
    generator: &'a dyn ContentGenerator,
    notifier: &'a dyn Notifier,
    assets: AssetMaterializer,
    events: EventLog,
    tone_strategy: Box<dyn ToneStrategy + 'a>,
}

impl<'a> MetaProcessor<'a> {
    pub fn new(
        settings: &'a Settings,
        documents: &'a dyn DocumentStore,
        generator: &'a dyn ContentGenerator,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            settings,
            documents,
            generator,
            notifier,
            assets: AssetMaterializer::new(&settings.root, &settings.asset_folder),
            events: EventLog::disabled(),
            tone_strategy: Box::new(EndingCountStrategy),
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn with_tone_strategy(mut self, strategy: impl ToneStrategy + 'a) -> Self {
        self.tone_strategy = Box::new(strategy);
        self
    }

    /// Every failure is reported through the notifier exactly once before it
    /// is returned.
    pub fn process_document(&self, name: &str) -> Result<ProcessOutcome, ProcessError> {
        let result = self.process(name);
        if let Err(err) = &result {
            self.notifier.notify(&err.user_message());
        }
        result
    }

    fn process(&self, name: &str) -> Result<ProcessOutcome, ProcessError> {
        if !self.settings.has_api_key() {
            return Err(ProcessError::MissingApiKey);
        }

        let original = self.documents.read(name).map_err(ProcessError::Io)?;
        let actions = parse_meta_actions(&original);
        if actions.is_empty() {
            return Ok(ProcessOutcome::default());
        }

        self.record(
            "run_started",
            json!({ "document": name, "markers": actions.len() }),
        );
        match self.run(name, &original, &actions) {
            Ok(outcome) => {
                self.record(
                    "run_finished",
                    json!({
                        "document": name,
                        "markers": outcome.markers,
                        "replaced": outcome.replaced,
                        "saved": outcome.saved,
                    }),
                );
                Ok(outcome)
            }
            Err(err) => {
                self.record(
                    "run_failed",
                    json!({ "document": name, "error": err.to_string() }),
                );
                Err(err)
            }
        }
    }

    fn run(
        &self,
        name: &str,
        original: &str,
        actions: &[MetaAction],
    ) -> Result<ProcessOutcome, ProcessError> {
        let (working, replaced) = self.resolve_all(original, actions)?;
        let saved = working != original;
        if saved {
            self.documents
                .write(name, &working)
                .map_err(ProcessError::Io)?;
            self.record(
                "document_saved",
                json!({ "document": name, "bytes": working.len() }),
            );
        }
        Ok(ProcessOutcome {
            markers: actions.len(),
            replaced,
            saved,
        })
    }

    /// Splices replacements at the recorded offsets, left to right. The text
    /// before marker `i` already contains replacements `0..i`, which is what
    /// its tone context is computed from. Returns the rewritten text and the
    /// number of non-empty replacements.
    fn resolve_all(
        &self,
        original: &str,
        actions: &[MetaAction],
    ) -> Result<(String, usize), ProcessError> {
        let mut working = String::with_capacity(original.len());
        let mut cursor = 0;
        let mut replaced = 0;
        for (index, action) in actions.iter().enumerate() {
            working.push_str(&original[cursor..action.start]);
            let replacement = self.resolve(action, &working)?;
            let kind = match action.kind() {
                ActionKind::Image => "image",
                ActionKind::Text => "text",
            };
            self.record(
                "marker_resolved",
                json!({
                    "index": index,
                    "action_type": action.action_type,
                    "kind": kind,
                    "empty": replacement.is_empty(),
                }),
            );
            if !replacement.is_empty() {
                replaced += 1;
            }
            working.push_str(&replacement);
            cursor = action.end;
        }
        working.push_str(&original[cursor..]);
        Ok((working, replaced))
    }

    fn resolve(&self, action: &MetaAction, preceding: &str) -> Result<String, ProcessError> {
        match action.kind() {
            ActionKind::Image => {
                let payload = self.generator.generate_image(&action.instruction)?;
                let path = self
                    .assets
                    .materialize(&payload, &action.instruction)
                    .map_err(ProcessError::Io)?;
                Ok(markdown_image(
                    &self.assets.reference_for(&path),
                    &action.instruction,
                ))
            }
            ActionKind::Text => {
                let tone = infer_tone_with(self.tone_strategy.as_ref(), preceding);
                let text = self.generator.generate_text(
                    action,
                    &tone,
                    &self.settings.writing_profile,
                )?;
                Ok(text)
            }
        }
    }

    fn record(&self, event_type: &str, payload: Value) {
        let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        if let Err(err) = self.events.emit(event_type, payload) {
            eprintln!("metascribe: could not record {event_type}: {err:#}");
        }
    }
}
