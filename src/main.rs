use tech_teams::{Application, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tech_teams=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let app = Application::build(settings).await?;
    app.serve().await?;
    Ok(())
}
