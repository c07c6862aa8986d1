// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use conveyor::{CheckContext, InvocationId, Parameters, Plugins, RegistryDocument, RunContext, Step};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_yaml::Value;
use std::sync::Arc;
use tracing::Level;

// --- Shared journal of what the test steps did ---
#[derive(Default)]
pub struct Recorder {
  events: Mutex<Vec<String>>,
  parameters: Mutex<Vec<(InvocationId, Parameters)>>,
}

impl Recorder {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn record(&self, event: impl Into<String>) {
    self.events.lock().push(event.into());
  }

  pub fn events(&self) -> Vec<String> {
    self.events.lock().clone()
  }

  /// Events starting with `prefix`, e.g. "execute".
  pub fn events_of(&self, prefix: &str) -> Vec<String> {
    self
      .events
      .lock()
      .iter()
      .filter(|e| e.starts_with(prefix))
      .cloned()
      .collect()
  }

  pub fn parameters_of(&self, step_name: &str, ordinal: u32) -> Option<Parameters> {
    self
      .parameters
      .lock()
      .iter()
      .find(|(id, _)| id.step_name == step_name && id.ordinal == ordinal)
      .map(|(_, p)| p.clone())
  }
}

fn label(step_name: &str, ordinal: u32) -> String {
  format!("{}#{}", step_name, ordinal)
}

/// Value a recording step publishes for `element`.
pub fn published_value(element: &str, step_name: &str, ordinal: u32) -> String {
  format!("{}@{}", element, label(step_name, ordinal))
}

// --- Test steps ---

/// Records both phases, fetches every declared input and publishes every
/// declared output. Fails in the phase named by its optional `fail_in` parameter.
pub struct RecordingStep {
  recorder: Arc<Recorder>,
}

fn fail_in(parameters: &Parameters) -> Option<&str> {
  parameters.get("fail_in").and_then(Value::as_str)
}

impl Step for RecordingStep {
  fn validate(&mut self, ctx: &CheckContext<'_>) -> anyhow::Result<()> {
    self.recorder.record(format!("check {}", label(ctx.step_name(), ctx.ordinal())));
    self
      .recorder
      .parameters
      .lock()
      .push((ctx.id().clone(), ctx.parameters().clone()));
    if fail_in(ctx.parameters()) == Some("check") {
      anyhow::bail!("{} rejected its configuration", label(ctx.step_name(), ctx.ordinal()));
    }
    Ok(())
  }

  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    let me = label(ctx.step_name(), ctx.ordinal());
    self.recorder.record(format!("execute {}", me));

    let definition = Arc::clone(&ctx.invocation().definition);
    for input in &definition.inputs {
      let value = ctx.fetch_as::<String>(input)?;
      self.recorder.record(format!("fetch {} {}={}", me, input, value));
    }
    if fail_in(ctx.parameters()) == Some("execute") {
      anyhow::bail!("{} failed while running", me);
    }
    for output in &definition.outputs {
      let value = published_value(output, ctx.step_name(), ctx.ordinal());
      ctx.publish_value(output, value)?;
    }
    ctx.write_output(format!("{} done", me));
    Ok(())
  }
}

/// Declares outputs but never publishes them.
pub struct SilentStep;

impl Step for SilentStep {
  fn run(&mut self, _ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    Ok(())
  }
}

/// Publishes empty text, which the text container rejects, and ignores the error.
pub struct SwallowingStep {
  recorder: Arc<Recorder>,
}

impl Step for SwallowingStep {
  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    let outputs = ctx.invocation().definition.outputs.clone();
    for output in outputs {
      if let Err(e) = ctx.publish_value(&output, String::new()) {
        self.recorder.record(format!("swallowed {}", e));
      }
    }
    Ok(())
  }
}

/// Publishes empty text and propagates the container's refusal.
pub struct RejectingStep;

impl Step for RejectingStep {
  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    let outputs = ctx.invocation().definition.outputs.clone();
    for output in outputs {
      ctx.publish_value(&output, String::new())?;
    }
    Ok(())
  }
}

/// Publishes `Blob` by its bare name.
pub struct BlobWriter;

impl Step for BlobWriter {
  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    let text = format!("blob from {}", ctx.step_name());
    ctx.publish_value("Blob", text)?;
    Ok(())
  }
}

/// Fetches `Blob` by its bare name and writes it to the output.
pub struct BlobReader;

impl Step for BlobReader {
  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    let blob = ctx.fetch_as::<String>("Blob")?;
    ctx.write_output(format!("got {}", blob));
    Ok(())
  }
}

/// Publishes each output twice and records what the second attempt returned.
pub struct RepublishingStep {
  recorder: Arc<Recorder>,
}

impl Step for RepublishingStep {
  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    let outputs = ctx.invocation().definition.outputs.clone();
    for output in outputs {
      ctx.publish_value(&output, "first".to_string())?;
      match ctx.publish_value(&output, "second".to_string()) {
        Ok(()) => self.recorder.record("republish accepted"),
        Err(e) => self.recorder.record(format!("republish refused: {}", e)),
      }
    }
    Ok(())
  }
}

/// Tries to fetch an element it does not declare.
pub struct SnoopingStep {
  recorder: Arc<Recorder>,
}

impl Step for SnoopingStep {
  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    match ctx.fetch("Foo") {
      Ok(_) => self.recorder.record("snoop succeeded"),
      Err(e) => self.recorder.record(format!("snoop refused: {}", e)),
    }
    Ok(())
  }
}

/// Catalog with every test step and the `tests.Text` container (non-empty strings).
pub fn test_plugins(recorder: &Arc<Recorder>) -> Plugins {
  let plugins = Plugins::new();
  let r = Arc::clone(recorder);
  plugins.register_step("tests.Recording", move || RecordingStep { recorder: r.clone() });
  plugins.register_step("tests.Silent", || SilentStep);
  let r = Arc::clone(recorder);
  plugins.register_step("tests.Swallowing", move || SwallowingStep { recorder: r.clone() });
  plugins.register_step("tests.Rejecting", || RejectingStep);
  plugins.register_step("tests.BlobWriter", || BlobWriter);
  plugins.register_step("tests.BlobReader", || BlobReader);
  let r = Arc::clone(recorder);
  plugins.register_step("tests.Republishing", move || RepublishingStep { recorder: r.clone() });
  let r = Arc::clone(recorder);
  plugins.register_step("tests.Snooping", move || SnoopingStep { recorder: r.clone() });
  plugins.register_validator::<String, _>("tests.Text", |text: &String| {
    if text.is_empty() {
      anyhow::bail!("text must not be empty");
    }
    Ok(())
  });
  plugins
}

// --- Documents ---

pub fn yaml(source: &str) -> Value {
  serde_yaml::from_str(source).expect("test YAML must parse")
}

pub fn primary(source: &str) -> RegistryDocument {
  RegistryDocument::from_yaml_str("main", source).expect("test registry must parse")
}

pub fn auxiliary(name: &str, source: &str) -> RegistryDocument {
  RegistryDocument::from_yaml_str(name, source).expect("test registry must parse")
}

/// `[StepA, StepB, StepC]`; StepB consumes `Foo` from StepA.
pub const ABC_REGISTRY: &str = r#"
global_parameters:
  output_file: report.txt
  error_file: errors.txt
  verbosity: 1
pipelines_registry:
  abc:
    steps:
      - StepA
      - StepB:
          element_providers:
            StepA: Foo
      - StepC
steps_registry:
  StepA:
    class: tests.Recording
    output_elements: [Foo]
  StepB:
    class: tests.Recording
    input_elements: [Foo]
  StepC:
    class: tests.Recording
element_containers_registry:
  Foo: tests.Text
"#;

// --- Helper for Tracing Setup (call once per test run if needed) ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
