use clap::Parser;
use tiergate::app::App;
use tiergate::cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tiergate::logging::init();

    let cli = Cli::parse();

    let app = App::build(&cli).await.map_err(|err| {
        eprintln!("Startup error: {}", err);
        err
    })?;
    app.run().await.map_err(|err| {
        eprintln!("Session error: {}", err);
        err.into()
    })
}
