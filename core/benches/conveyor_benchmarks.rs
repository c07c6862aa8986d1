use conveyor::{
  element, Application, ElementBroker, ExecutionEngine, PipelineAssembler, Plugins, RegistryDocument, RegistryIndex,
  RunContext, RunState, Step,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fmt::Write;

// --- Benchmark Steps ---

/// Publishes its output (if any) and fetches its input (if any).
struct RelayStep;

impl Step for RelayStep {
  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
    let definition = std::sync::Arc::clone(&ctx.invocation().definition);
    for input in &definition.inputs {
      criterion::black_box(ctx.fetch(input)?);
    }
    let ordinal = u64::from(ctx.ordinal());
    for output in &definition.outputs {
      ctx.publish(output, element(ordinal))?;
    }
    Ok(())
  }
}

fn bench_plugins() -> Plugins {
  let plugins = Plugins::new();
  plugins.register_step("bench.Relay", || RelayStep);
  plugins.register_validator::<u64, _>("bench.Counter", |_: &u64| Ok(()));
  plugins
}

/// A pipeline alternating `Source` and `Sink` `pairs` times; every `Sink`
/// execution reads the element of the matching `Source` execution.
fn relay_registry(pairs: u32) -> RegistryDocument {
  let mut source = String::from(
    "global_parameters:\n  output_file: out.txt\n  error_file: err.txt\npipelines_registry:\n  relay:\n    steps:\n",
  );
  for n in 1..=pairs {
    let _ = writeln!(source, "      - Source");
    let _ = writeln!(
      source,
      "      - Sink:\n          parameters:\n            label: {{execution_{n}: sink_{n}, execution_others: other}}\n          element_providers:\n            Source: {{execution_{n}: Value}}"
    );
  }
  source.push_str(
    "steps_registry:\n  Source:\n    class: bench.Relay\n    output_elements: [Value]\n  Sink:\n    class: bench.Relay\n    parameters:\n      label: none\n    input_elements: [Value]\nelement_containers_registry:\n  Value: bench.Counter\n",
  );
  RegistryDocument::from_yaml_str("bench", &source).expect("benchmark registry must parse")
}

// --- Benchmark Functions ---

fn bench_assembly(c: &mut Criterion) {
  let mut group = c.benchmark_group("Assembly");
  let plugins = bench_plugins();

  for pairs in [1u32, 10, 100].iter() {
    let index = RegistryIndex::load(&relay_registry(*pairs), &[], &plugins).expect("benchmark registry must load");
    group.throughput(Throughput::Elements(u64::from(*pairs) * 2));
    group.bench_with_input(BenchmarkId::from_parameter(format!("{}pairs", pairs)), &index, |b, index| {
      b.iter(|| {
        let pipeline = PipelineAssembler::new(index).assemble("relay").expect("assembly must succeed");
        criterion::black_box(pipeline);
      });
    });
  }
  group.finish();
}

fn bench_run(c: &mut Criterion) {
  let mut group = c.benchmark_group("CheckAndExecute");
  let plugins = bench_plugins();

  for pairs in [1u32, 10, 100].iter() {
    let index = RegistryIndex::load(&relay_registry(*pairs), &[], &plugins).expect("benchmark registry must load");
    let pipeline = PipelineAssembler::new(&index).assemble("relay").expect("assembly must succeed");
    group.throughput(Throughput::Elements(u64::from(*pairs) * 2));
    group.bench_with_input(BenchmarkId::from_parameter(format!("{}pairs", pairs)), &pipeline, |b, pipeline| {
      b.iter_batched(
        || {
          let state = RunState::new(index.globals().clone(), ElementBroker::from_index(&index));
          (pipeline.clone(), state)
        },
        |(mut pipeline, mut state)| {
          let outcome = ExecutionEngine::new().run(&mut pipeline, &mut state);
          assert!(outcome.is_success());
        },
        criterion::BatchSize::SmallInput,
      );
    });
  }
  group.finish();
}

fn bench_registry_load(c: &mut Criterion) {
  let mut group = c.benchmark_group("RegistryLoad");
  let plugins = bench_plugins();
  let document = relay_registry(10);
  let user: serde_yaml::Value = serde_yaml::from_str("chosen_pipeline: relay").expect("user document must parse");

  group.bench_function("load_index", |b| {
    b.iter(|| criterion::black_box(RegistryIndex::load(&document, &[], &plugins).expect("load must succeed")));
  });
  group.bench_function("load_and_prepare", |b| {
    b.iter(|| {
      let app = Application::new(&plugins, &document, &[], None).expect("load must succeed");
      criterion::black_box(app.prepare(&user).expect("prepare must succeed"));
    });
  });
  group.finish();
}

criterion_group!(benches, bench_assembly, bench_run, bench_registry_load);
criterion_main!(benches);
