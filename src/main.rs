use edge_topology::config::SETTLE_TIMEOUT_SECS;
use edge_topology::output::{print_plan_csv, print_resource_summary};
use edge_topology::{declare_stack, MemoryBackend, Stack, StackConfig};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Do as little as possible in main.rs as it can't contain any tests
    log4rs::init_file("log4rs.yml", Default::default()).expect("Error initializing log4rs");
    dotenv::dotenv().ok();
    //
    log::info!("#Start main()");

    let cfg = StackConfig::from_env()?;
    let backend = Arc::new(MemoryBackend::queued());
    let stack = Stack::new(backend.clone(), &cfg.environment, cfg.network.clone());
    let out = declare_stack(&stack, &cfg)?;

    let finished = stack.finish();
    let settler = Arc::clone(&backend);
    let settled = tokio::task::spawn_blocking(move || settler.settle()).await?;
    log::info!("backend completed {settled} creates");
    let result = finished
        .value_within(Duration::from_secs(SETTLE_TIMEOUT_SECS))
        .await;

    print_plan_csv(&out.vpc.plan, &cfg.vpc.azs);
    print_resource_summary(&backend.records());

    match result {
        Ok(count) => {
            log::info!("#End main() stack {} settled, {count} completions", cfg.environment);
            Ok(())
        }
        Err(e) => {
            log::error!("stack {} failed: {e} (root cause: {})", cfg.environment, e.root_cause());
            std::process::exit(1);
        }
    }
}
