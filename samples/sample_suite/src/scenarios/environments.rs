use reqwest::Client;

use powerplatform_admin_tools::auth::TokenProvider;
use powerplatform_admin_tools::flows::client::{ADMIN_AUDIENCE, AdminClient, DEFAULT_ADMIN_API_URL};

pub async fn run(client: &Client, tokens: &mut TokenProvider) -> Result<(), String> {
    println!("Scenario: environments");

    let token = tokens
        .token_for(ADMIN_AUDIENCE)
        .await
        .map_err(|e| e.to_string())?;
    let environments = AdminClient::new(client, DEFAULT_ADMIN_API_URL, token.as_str())
        .list_environments()
        .await
        .into_result()
        .map_err(|e| e.to_string())?;

    println!("Environments: {}", environments.len());
    for env in &environments {
        let dataverse = env.instance_url.as_deref().unwrap_or("(no Dataverse)");
        println!("  {} [{}] {}", env.display_name, env.id, dataverse);
    }

    Ok(())
}
