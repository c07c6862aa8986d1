// tests/assembly_tests.rs
mod common;

use common::*;
use conveyor::{
  AssembledPipeline, ConveyorError, InputBinding, InvocationId, InvocationStatus, PipelineAssembler, RegistryIndex,
  UserOverrides,
};
use serde_yaml::Value;

const REPEATS_REGISTRY: &str = r#"
global_parameters:
  output_file: report.txt
  error_file: errors.txt
pipelines_registry:
  repeats:
    steps:
      - StepE
      - Other
      - StepE
      - StepE
      - StepE:
          parameters:
            input_file:
              execution_1: file1.dat
              execution_2: file2.dat
              execution_others: file3.dat
  producers:
    steps:
      - Producer
      - Producer
      - Consumer:
          element_providers:
            Producer:
              execution_1: X
              execution_2: [Y, Z]
  ambiguous:
    steps:
      - Producer
      - Producer
      - Consumer:
          element_providers:
            Producer: X
  missing:
    steps:
      - Producer
      - Consumer:
          element_providers:
            Producer:
              execution_1: [X, Y]
  backwards:
    steps:
      - Consumer:
          element_providers:
            Producer:
              execution_1: [X, Y, Z]
      - Producer
  too_early:
    steps:
      - Producer
      - Consumer:
          element_providers:
            Producer:
              execution_1: [X, Y]
              execution_2: Z
      - Producer
  wrong_element:
    steps:
      - Producer
      - Producer
      - Consumer:
          element_providers:
            Producer:
              execution_1: [X, Y, Z, W]
              execution_2: Q
  single:
    steps:
      - Solo
      - Reader:
          element_providers:
            Solo: Q
steps_registry:
  StepE:
    class: tests.Recording
    parameters:
      input_file: default.dat
      threshold: 7
  Other:
    class: tests.Recording
  Producer:
    class: tests.Recording
    output_elements: [X, Y, Z]
  Consumer:
    class: tests.Recording
    input_elements: [X, Y, Z]
  Solo:
    class: tests.Recording
    output_elements: [Q]
  Reader:
    class: tests.Recording
    input_elements: [Q]
  Sink:
    class: tests.Recording
    input_elements: [W]
  Source:
    class: tests.Recording
    output_elements: [W]
element_containers_registry:
  X: tests.Text
  Y: tests.Text
  Z: tests.Text
  Q: tests.Text
  W: tests.Text
"#;

fn index() -> RegistryIndex {
  let recorder = Recorder::new();
  RegistryIndex::load(&primary(REPEATS_REGISTRY), &[], &test_plugins(&recorder)).unwrap()
}

fn assemble(index: &RegistryIndex, pipeline: &str) -> Result<AssembledPipeline, ConveyorError> {
  PipelineAssembler::new(index).assemble(pipeline)
}

fn expect_assembly_error(result: Result<AssembledPipeline, ConveyorError>, step: &str, needle: &str) {
  match result {
    Err(ConveyorError::Assembly { step_name, message, .. }) => {
      assert_eq!(step_name, step);
      assert!(message.contains(needle), "message '{}' should mention '{}'", message, needle);
    }
    other => panic!("Expected Assembly error, got {:?}", other),
  }
}

fn binding(step: &str, ordinal: u32, element: &str) -> InputBinding {
  InputBinding {
    provider: InvocationId::new(step, ordinal),
    element: element.to_string(),
  }
}

#[test]
fn test_ordinals_are_dense_per_step_and_order_is_kept() {
  setup_tracing();
  let index = index();
  let pipeline = assemble(&index, "repeats").unwrap();

  let ids: Vec<(String, u32, u32)> = pipeline
    .invocations
    .iter()
    .map(|i| (i.id.step_name.clone(), i.id.ordinal, i.total_executions))
    .collect();
  assert_eq!(
    ids,
    vec![
      ("StepE".to_string(), 1, 4),
      ("Other".to_string(), 1, 1),
      ("StepE".to_string(), 2, 4),
      ("StepE".to_string(), 3, 4),
      ("StepE".to_string(), 4, 4),
    ]
  );
  assert!(pipeline.invocations.iter().all(|i| i.status == InvocationStatus::Pending));
}

#[test]
fn test_occurrence_override_applies_per_execution() {
  setup_tracing();
  let index = index();
  let pipeline = assemble(&index, "repeats").unwrap();

  // The override belongs to the last occurrence and resolves with its ordinal.
  let files: Vec<&str> = pipeline
    .invocations
    .iter()
    .filter(|i| i.id.step_name == "StepE")
    .map(|i| i.parameters.get("input_file").and_then(Value::as_str).unwrap())
    .collect();
  assert_eq!(files, vec!["default.dat", "default.dat", "default.dat", "file3.dat"]);
}

#[test]
fn test_user_per_execution_override_resolves_each_ordinal() {
  setup_tracing();
  let index = index();
  let user = UserOverrides::from_document(&yaml(
    r#"
chosen_pipeline: repeats
pipeline_config:
  - StepE:
      parameters:
        input_file:
          execution_1: file1.dat
          execution_2: file2.dat
          execution_others: file3.dat
"#,
  ))
  .unwrap();
  let pipeline = PipelineAssembler::new(&index)
    .with_user_overrides(&user)
    .assemble("repeats")
    .unwrap();

  let resolved: Vec<(u32, &str, i64)> = pipeline
    .invocations
    .iter()
    .filter(|i| i.id.step_name == "StepE")
    .map(|i| {
      (
        i.id.ordinal,
        i.parameters.get("input_file").and_then(Value::as_str).unwrap(),
        i.parameters.get("threshold").and_then(Value::as_i64).unwrap(),
      )
    })
    .collect();
  assert_eq!(
    resolved,
    vec![
      (1, "file1.dat", 7),
      (2, "file2.dat", 7),
      (3, "file3.dat", 7),
      (4, "file3.dat", 7),
    ]
  );
}

#[test]
fn test_per_execution_providers_bind_each_execution() {
  setup_tracing();
  let index = index();
  let pipeline = assemble(&index, "producers").unwrap();
  let consumer = pipeline.invocation(&InvocationId::new("Consumer", 1)).unwrap();

  assert_eq!(consumer.inputs.get("X"), Some(&binding("Producer", 1, "X")));
  assert_eq!(consumer.inputs.get("Y"), Some(&binding("Producer", 2, "Y")));
  assert_eq!(consumer.inputs.get("Z"), Some(&binding("Producer", 2, "Z")));
  assert_eq!(consumer.inputs.len(), 3);
}

#[test]
fn test_bare_provider_of_single_execution_binds_it() {
  setup_tracing();
  let index = index();
  let pipeline = assemble(&index, "single").unwrap();
  let reader = pipeline.invocation(&InvocationId::new("Reader", 1)).unwrap();
  assert_eq!(reader.inputs.get("Q"), Some(&binding("Solo", 1, "Q")));
}

#[test]
fn test_bare_provider_with_several_executions_is_ambiguous() {
  setup_tracing();
  let index = index();
  expect_assembly_error(assemble(&index, "ambiguous"), "Consumer", "runs 2 times");
}

#[test]
fn test_input_without_provider_fails_assembly() {
  setup_tracing();
  let index = index();
  expect_assembly_error(assemble(&index, "missing"), "Consumer", "no provider declared");
}

#[test]
fn test_provider_after_consumer_fails_assembly() {
  setup_tracing();
  let index = index();
  expect_assembly_error(assemble(&index, "backwards"), "Consumer", "before");
}

#[test]
fn test_provider_execution_after_consumer_fails_assembly() {
  setup_tracing();
  let index = index();
  expect_assembly_error(assemble(&index, "too_early"), "Consumer", "execution 2");
}

#[test]
fn test_element_not_produced_by_provider_fails_assembly() {
  setup_tracing();
  let index = index();
  expect_assembly_error(assemble(&index, "wrong_element"), "Consumer", "'W'");
}

#[test]
fn test_unknown_pipeline_fails_assembly() {
  setup_tracing();
  let index = index();
  match assemble(&index, "nope") {
    Err(error @ ConveyorError::UnknownPipeline { .. }) => {
      assert!(error.is_static());
      assert_eq!(error.to_string(), "Pipeline 'nope' is not defined in the registry");
    }
    other => panic!("Expected UnknownPipeline, got {:?}", other),
  }
}

#[test]
fn test_user_config_for_unregistered_step_is_rejected() {
  setup_tracing();
  let index = index();
  let user = UserOverrides::from_document(&yaml(
    "{chosen_pipeline: repeats, pipeline_config: [{Ghost: {parameters: {a: 1}}}]}",
  ))
  .unwrap();
  let result = PipelineAssembler::new(&index).with_user_overrides(&user).assemble("repeats");
  assert!(matches!(result, Err(ConveyorError::UserConfig { .. })));
}

#[test]
fn test_user_config_for_undeclared_parameter_is_rejected() {
  setup_tracing();
  let index = index();
  let user = UserOverrides::from_document(&yaml(
    "{chosen_pipeline: repeats, pipeline_config: [{StepE: {parameters: {colour: red}}}]}",
  ))
  .unwrap();
  let result = PipelineAssembler::new(&index).with_user_overrides(&user).assemble("repeats");
  assert!(matches!(result, Err(ConveyorError::ConfigMerge { ref parameter, .. }) if parameter == "colour"));
}

#[test]
fn test_user_config_for_step_outside_pipeline_is_tolerated() {
  setup_tracing();
  let index = index();
  let user = UserOverrides::from_document(&yaml(
    "{chosen_pipeline: single, pipeline_config: [{StepE: {parameters: {threshold: 1}}}]}",
  ))
  .unwrap();
  let pipeline = PipelineAssembler::new(&index)
    .with_user_overrides(&user)
    .assemble("single")
    .unwrap();
  assert_eq!(pipeline.len(), 2);
}

const BLOB_LIBRARY: &str = r#"
steps_registry:
  Produce:
    class: tests.Recording
    output_elements: [Blob]
element_containers_registry:
  Blob: tests.Text
"#;

#[test]
fn test_other_registry_elements_must_be_named_qualified() {
  setup_tracing();
  let source = |written: &str| {
    format!(
      r#"
global_parameters:
  output_file: report.txt
  error_file: errors.txt
pipelines_registry:
  mixed:
    steps:
      - lib.Produce
      - Local:
          element_providers:
            lib.Produce: {}
steps_registry:
  Local:
    class: tests.Recording
    input_elements: [lib.Blob]
element_containers_registry: {{}}
"#,
      written
    )
  };
  let load = |written: &str| {
    let recorder = Recorder::new();
    RegistryIndex::load(
      &primary(&source(written)),
      &[auxiliary("lib", BLOB_LIBRARY)],
      &test_plugins(&recorder),
    )
    .unwrap()
  };

  let index = load("lib.Blob");
  let pipeline = assemble(&index, "mixed").unwrap();
  let local = pipeline.invocation(&InvocationId::new("Local", 1)).unwrap();
  assert_eq!(local.inputs.get("lib.Blob"), Some(&binding("lib.Produce", 1, "lib.Blob")));

  let index = load("Blob");
  expect_assembly_error(assemble(&index, "mixed"), "Local", "write it as 'lib.Blob'");
}
