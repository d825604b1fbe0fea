// [apps/controller/src/main.rs]
use buildctl_controller::config::Config;
use buildctl_controller::kernel;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    buildctl_shared_logging::init_tracing("buildctl-controller");

    let config = Config::from_env()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()?;

    runtime.block_on(kernel::run(config))
}
