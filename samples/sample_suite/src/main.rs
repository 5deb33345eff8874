mod config;
mod scenarios;

use reqwest::Client;

use powerplatform_admin_tools::auth::TokenProvider;

use config::load_secrets;

#[tokio::main]
async fn main() -> Result<(), String> {
    let secrets = load_secrets()?;

    let client = Client::new();
    let mut tokens = TokenProvider::new(&client, secrets.credentials());

    scenarios::environments::run(&client, &mut tokens).await?;
    scenarios::recent_failures::run(&client, &mut tokens, &secrets).await?;

    Ok(())
}
