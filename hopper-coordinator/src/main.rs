use hopper_coordinator::{config::Args, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hopper_logger::init();
    let args: Args = argh::from_env();
    run::run(args).await
}
