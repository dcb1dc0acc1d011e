use clap::Parser;
use tagplan::app;
use tagplan::assistant::GeminiClient;
use tagplan::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();

    if config.list_models {
        let key = config
            .gemini_api_key
            .as_deref()
            .ok_or("GOOGLE_API_KEY not set")?;
        let client = GeminiClient::new(key, &config.gemini_model);
        for model in client.list_models().await? {
            println!("{}", model.name);
            println!("   Display Name: {}", model.display_name);
            println!("   Supported Methods: {}\n", model.supported_generation_methods.join(", "));
        }
        return Ok(());
    }

    println!(
        "Starting tagging plan dashboard on {} with data from {}",
        config.bind,
        config.data_dir.display()
    );
    app::run(config).await
}
