// conveyor/examples/scaled_report.rs

use anyhow::{bail, ensure};
use conveyor::{Application, CheckContext, ConveyorError, Plugins, RegistryDocument, RunContext, Step};
use tracing::info;

// 1. Step implementations. Each is created fresh per invocation.

/// Publishes the numbers given by its `values` parameter.
struct LoadNumbers;

impl Step for LoadNumbers {
  fn validate(&mut self, ctx: &CheckContext<'_>) -> anyhow::Result<()> {
    let values: Vec<f64> = ctx.param_as("values")?;
    ensure!(!values.is_empty(), "'values' must not be empty");
    Ok(())
  }

  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    let values: Vec<f64> = ctx.param_as("values")?;
    ctx.publish_value("Numbers", values)?;
    Ok(())
  }
}

/// Multiplies the numbers it receives by its `factor` parameter.
struct Scale {
  factor: f64,
}

impl Step for Scale {
  fn validate(&mut self, ctx: &CheckContext<'_>) -> anyhow::Result<()> {
    self.factor = ctx.param_as("factor")?;
    if self.factor == 0.0 {
      bail!("execution {} of {}: factor must not be zero", ctx.ordinal(), ctx.step_name());
    }
    Ok(())
  }

  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    let numbers = ctx.fetch_as::<Vec<f64>>("Numbers")?;
    let scaled: Vec<f64> = numbers.iter().map(|n| n * self.factor).collect();
    ctx.write_output(format!("scale #{} x{} -> {:?}", ctx.ordinal(), self.factor, scaled));
    ctx.publish_value("Scaled", scaled)?;
    Ok(())
  }
}

// 2. The registry: two executions of Scale, each with its own factor, and one
//    report per execution.
const REGISTRY: &str = r#"
global_parameters:
  output_file: report.txt
  error_file: errors.txt
pipelines_registry:
  scaled_report:
    steps:
      - LoadNumbers
      - Scale:
          element_providers:
            LoadNumbers: Numbers
      - Scale:
          element_providers:
            LoadNumbers: Numbers
      - Report:
          element_providers:
            Scale:
              execution_1: Scaled
      - Report2:
          element_providers:
            Scale:
              execution_2: Scaled
steps_registry:
  LoadNumbers:
    class: example.LoadNumbers
    parameters:
      values: [1.0, 2.0, 3.0]
    output_elements: [Numbers]
  Scale:
    class: example.Scale
    parameters:
      factor:
        execution_2: 10.0
        execution_others: 2.0
    input_elements: [Numbers]
    output_elements: [Scaled]
  Report:
    class: example.Echo
    input_elements: [Scaled]
  Report2:
    class: example.Echo
    input_elements: [Scaled]
element_containers_registry:
  Numbers: example.Series
  Scaled: example.Series
"#;

const USER_INPUT: &str = r#"
chosen_pipeline: scaled_report
pipeline_config:
  - LoadNumbers:
      parameters:
        values: [4.0, 5.0]
"#;

/// Writes the sum of the series it receives.
struct Echo;

impl Step for Echo {
  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    let series = ctx.fetch_as::<Vec<f64>>("Scaled")?;
    let total: f64 = series.iter().sum();
    ctx.write_output(format!("{}: sum = {}", ctx.step_name(), total));
    Ok(())
  }
}

fn main() -> Result<(), ConveyorError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Scaled Report Example ---");

  // 3. Register implementations under the identifiers the registry uses.
  let plugins = Plugins::new();
  plugins.register_step("example.LoadNumbers", || LoadNumbers);
  plugins.register_step("example.Scale", || Scale { factor: 1.0 });
  plugins.register_step("example.Echo", || Echo);
  plugins.register_validator::<Vec<f64>, _>("example.Series", |series: &Vec<f64>| {
    ensure!(series.iter().all(|n| n.is_finite()), "series must only contain finite numbers");
    Ok(())
  });

  // 4. Load the registry and run the pipeline chosen by the user document.
  let app = Application::new(
    &plugins,
    &RegistryDocument::from_yaml_str("example", REGISTRY)?,
    &[],
    None,
  )?;
  let user = serde_yaml::from_str(USER_INPUT).map_err(|e| ConveyorError::UserConfig { message: e.to_string() })?;

  let report = app.run_single_pipeline(&user)?;
  match report.summary.to_yaml() {
    Ok(summary) => info!("Run summary:\n{}", summary),
    Err(e) => info!("Summary unavailable: {}", e),
  }
  for line in report.state.output() {
    info!("{}", line);
  }
  info!("Outcome: {:?}", report.outcome);

  report.into_result().map(|_| ())
}
