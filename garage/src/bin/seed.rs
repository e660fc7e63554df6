use clap::Parser;
use garage::api::ApiClient;
use garage::config::{init_tracing, DEFAULT_API_URL, GENERATE_BATCH};
use garage::garage::generate_random_cars;
use tracing::{info, warn};

/// Fill the garage with randomly named and coloured cars.
#[derive(Parser, Debug)]
#[command(name = "seed")]
struct Args {
    /// How many cars to create
    #[arg(default_value_t = GENERATE_BATCH)]
    count: usize,

    #[arg(long, env = "GARAGE_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing();

    let api = ApiClient::new(&args.api_url)?;
    let created = generate_random_cars(&api, args.count).await;
    if created == 0 && args.count > 0 {
        anyhow::bail!("No cars could be created at {}", api.base_url());
    }
    if created < args.count {
        warn!("Only {} of {} cars were created", created, args.count);
    }

    let total = api.list_cars(1, 1).await.total_count;
    info!("Created {} cars, garage now holds {}", created, total);
    println!("{}", created);
    Ok(())
}
