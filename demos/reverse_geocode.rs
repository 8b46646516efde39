use std::process::ExitCode;

use display_error_chain::DisplayErrorChain;
use geocode_standardizer::{AddressHandler, Config, Error};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn do_main(coordinates: &str) -> Result<(), Error> {
    let config = Config::from_env().expect("incomplete configuration in environment");
    info!(config = ?config, "configuration loaded");

    let handler = AddressHandler::new(&config)?;

    // Same body a caller would POST
    let body = json!({ "calls": [[coordinates]] }).to_string();
    let reply = handler.handle(body.as_bytes()).await?;

    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let coordinates = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "40.714224,-73.961452".to_string());

    if let Err(err) = do_main(&coordinates).await {
        let kind = err.kind();
        let status = err.http_status();
        let formated = DisplayErrorChain::new(err).to_string();
        eprintln!("[{kind:?}, HTTP {status}] {formated}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
