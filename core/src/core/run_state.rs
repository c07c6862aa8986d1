// conveyor/src/core/run_state.rs

//! Defines `RunState`, the state shared by every invocation of one run.

use crate::config::globals::GlobalParameters;
use crate::pipeline::broker::ElementBroker;

/// Created at run start and discarded at run end. Invocations read the global
/// parameters, append output, and publish or fetch elements through it; none of
/// them replaces it.
#[derive(Debug)]
pub struct RunState {
  globals: GlobalParameters,
  elements: ElementBroker,
  output: Vec<String>,
  diagnostics: Vec<String>,
}

impl RunState {
  pub fn new(globals: GlobalParameters, elements: ElementBroker) -> Self {
    Self {
      globals,
      elements,
      output: Vec::new(),
      diagnostics: Vec::new(),
    }
  }

  pub fn globals(&self) -> &GlobalParameters {
    &self.globals
  }

  pub fn elements(&self) -> &ElementBroker {
    &self.elements
  }

  pub fn elements_mut(&mut self) -> &mut ElementBroker {
    &mut self.elements
  }

  /// Report lines, destined for the `output_file` sink.
  pub fn output(&self) -> &[String] {
    &self.output
  }

  /// Diagnostic lines, destined for the `error_file` sink.
  pub fn diagnostics(&self) -> &[String] {
    &self.diagnostics
  }

  pub fn append_output(&mut self, line: impl Into<String>) {
    self.output.push(line.into());
  }

  pub fn append_diagnostic(&mut self, line: impl Into<String>) {
    self.diagnostics.push(line.into());
  }

  /// The accumulated output as one newline-terminated text.
  pub fn rendered_output(&self) -> String {
    render(&self.output)
  }

  pub fn rendered_diagnostics(&self) -> String {
    render(&self.diagnostics)
  }
}

fn render(lines: &[String]) -> String {
  lines.iter().fold(String::new(), |mut text, line| {
    text.push_str(line);
    text.push('\n');
    text
  })
}
