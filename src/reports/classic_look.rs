//! Report the model-driven app "Classic Look" opt-out across environments.
//!
//! The setting is `NewLookOptOut`. An app level value wins over the
//! environment level value, which wins over the setting definition default.

use std::collections::HashMap;
use std::io::Write;

use reqwest::Client;
use serde::Serialize;

use crate::auth::token::TokenProvider;
use crate::dataverse::entity::Entity;
use crate::dataverse::serviceclient::{ServiceClient, escape_odata_string};
use crate::error::{ApiError, ReportError};
use crate::flows::model::Environment;

pub const CLASSIC_LOOK_SETTING: &str = "NewLookOptOut";
const UNAVAILABLE: &str = "n/a";

const HEADERS: [&str; 7] = [
    "EnvironmentName",
    "EnvironmentId",
    "AppName",
    "AppUniqueName",
    "AppId",
    "ClassicLookOptOut",
    "Source",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SettingSource {
    App,
    Environment,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClassicLookRow {
    pub environment_name: String,
    pub environment_id: String,
    pub app_name: String,
    pub app_unique_name: String,
    pub app_id: String,
    pub classic_look_opt_out: String,
    pub source: SettingSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppModule {
    pub id: String,
    pub name: String,
    pub unique_name: String,
}

/// The setting's values at each level for one environment.
#[derive(Debug, Default, Clone)]
pub struct SettingValues {
    pub default: Option<String>,
    pub environment: Option<String>,
    /// Keyed by lower-case app module id.
    pub apps: HashMap<String, String>,
}

impl SettingValues {
    pub fn resolve(&self, app_id: &str) -> (String, SettingSource) {
        if let Some(value) = self.apps.get(&app_id.to_ascii_lowercase()) {
            return (value.clone(), SettingSource::App);
        }
        if let Some(value) = &self.environment {
            return (value.clone(), SettingSource::Environment);
        }
        let value = self
            .default
            .clone()
            .unwrap_or_else(|| UNAVAILABLE.to_string());
        (value, SettingSource::Default)
    }
}

/// Rows gathered across environments plus the environments left out.
#[derive(Debug, Default)]
pub struct ClassicLookReport {
    pub rows: Vec<ClassicLookRow>,
    pub skipped: Vec<(String, String)>,
}

fn eq_filter(attribute: &str, literal: &str) -> String {
    urlencoding::encode(&format!("{attribute} eq {literal}")).into_owned()
}

fn setting_value(entity: &Entity) -> Option<String> {
    entity
        .get("value")
        .and_then(|value| value.to_setting_string())
}

async fn read_setting(client: &ServiceClient) -> Result<SettingValues, ApiError> {
    let definition_query = format!(
        "$select=settingdefinitionid,uniquename,defaultvalue&$filter={}",
        eq_filter(
            "uniquename",
            &format!("'{}'", escape_odata_string(CLASSIC_LOOK_SETTING))
        )
    );
    let definitions = client
        .retrieve_multiple("settingdefinitions", &definition_query)
        .await
        .complete()?;

    let Some(definition) = definitions.first() else {
        log::debug!(
            "{} has no {} setting definition",
            client.base_url(),
            CLASSIC_LOOK_SETTING
        );
        return Ok(SettingValues::default());
    };
    let definition_id = definition
        .string("settingdefinitionid")
        .ok_or_else(|| ApiError::InvalidResponse("setting definition without id".into()))?
        .to_string();

    let mut values = SettingValues {
        default: definition
            .get("defaultvalue")
            .and_then(|value| value.to_setting_string()),
        ..SettingValues::default()
    };

    let environment_query = format!(
        "$select=value&$filter={}",
        eq_filter("_settingdefinitionid_value", &definition_id)
    );
    values.environment = client
        .retrieve_multiple("organizationsettings", &environment_query)
        .await
        .complete()?
        .first()
        .and_then(setting_value);

    let app_query = format!(
        "$select=value,_parentappmoduleid_value&$filter={}",
        eq_filter("_settingdefinitionid_value", &definition_id)
    );
    for entity in client
        .retrieve_multiple("appsettings", &app_query)
        .await
        .complete()?
    {
        if let (Some(app_id), Some(value)) = (
            entity.string("_parentappmoduleid_value"),
            setting_value(&entity),
        ) {
            values.apps.insert(app_id.to_ascii_lowercase(), value);
        }
    }

    Ok(values)
}

async fn list_apps(client: &ServiceClient) -> Result<Vec<AppModule>, ApiError> {
    let apps = client
        .retrieve_multiple("appmodules", "$select=appmoduleid,name,uniquename&$orderby=name")
        .await
        .complete()?;

    Ok(apps
        .iter()
        .filter_map(|entity| {
            let id = entity.string("appmoduleid")?.to_string();
            Some(AppModule {
                name: entity.string("name").unwrap_or(&id).to_string(),
                unique_name: entity.string("uniquename").unwrap_or_default().to_string(),
                id,
            })
        })
        .collect())
}

/// Report rows for one environment's model-driven apps.
pub async fn environment_rows(
    client: &ServiceClient,
    environment: &Environment,
) -> Result<Vec<ClassicLookRow>, ApiError> {
    let setting = read_setting(client).await?;
    let apps = list_apps(client).await?;

    Ok(apps
        .into_iter()
        .map(|app| {
            let (value, source) = setting.resolve(&app.id);
            ClassicLookRow {
                environment_name: environment.display_name.clone(),
                environment_id: environment.id.clone(),
                app_name: app.name,
                app_unique_name: app.unique_name,
                app_id: app.id,
                classic_look_opt_out: value,
                source,
            }
        })
        .collect())
}

/// Walk environments in order. A failing environment is logged and listed in
/// `skipped`; the rest of the report is still produced.
pub async fn collect_report(
    client: &Client,
    tokens: &mut TokenProvider,
    environments: &[Environment],
) -> ClassicLookReport {
    let mut report = ClassicLookReport::default();

    for environment in environments {
        let Some(instance_url) = environment.instance_url.as_deref() else {
            log::info!(
                "Skipping {} ({}): no Dataverse database",
                environment.display_name,
                environment.id
            );
            report
                .skipped
                .push((environment.id.clone(), "no Dataverse database".to_string()));
            continue;
        };

        let token = match tokens.token_for(instance_url).await {
            Ok(token) => token,
            Err(err) => {
                log::error!("Token for {} failed: {}", instance_url, err);
                report.skipped.push((environment.id.clone(), err.to_string()));
                continue;
            }
        };

        let service = ServiceClient::new(client, instance_url, token.as_str());
        match environment_rows(&service, environment).await {
            Ok(rows) => {
                log::info!(
                    "{}: {} model-driven app(s)",
                    environment.display_name,
                    rows.len()
                );
                report.rows.extend(rows);
            }
            Err(err) => {
                log::error!("Reading apps of {} failed: {}", environment.display_name, err);
                report.skipped.push((environment.id.clone(), err.to_string()));
            }
        }
    }

    report
}

pub fn write_csv<W: Write>(writer: W, rows: &[ClassicLookRow]) -> Result<(), ReportError> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(HEADERS)?;
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use httpmock::prelude::*;
    use serde_json::json;

    use crate::auth::credentials::ClientCredentials;

    const DEFINITION_ID: &str = "d0e5a1c2-0000-0000-0000-000000000001";
    const SALES_APP: &str = "AAAA0000-0000-0000-0000-000000000001";
    const SERVICE_APP: &str = "bbbb0000-0000-0000-0000-000000000002";

    fn environment(url: Option<String>) -> Environment {
        Environment {
            id: "env-1".to_string(),
            display_name: "Contoso".to_string(),
            instance_url: url,
        }
    }

    async fn mock_setting_endpoints(server: &MockServer, environment_value: Option<&str>) {
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/data/v9.2/settingdefinitions")
                    .query_param("$filter", "uniquename eq 'NewLookOptOut'");
                then.status(200).json_body(json!({"value": [{
                    "settingdefinitionid": DEFINITION_ID,
                    "uniquename": "NewLookOptOut",
                    "defaultvalue": "false"
                }]}));
            })
            .await;
        let environment_rows = match environment_value {
            Some(value) => json!([{"value": value}]),
            None => json!([]),
        };
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/data/v9.2/organizationsettings")
                    .query_param("$filter", format!("_settingdefinitionid_value eq {DEFINITION_ID}"));
                then.status(200).json_body(json!({"value": environment_rows}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/data/v9.2/appsettings");
                then.status(200).json_body(json!({"value": [{
                    "value": "true",
                    "_parentappmoduleid_value": SALES_APP.to_ascii_lowercase()
                }]}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/data/v9.2/appmodules");
                then.status(200).json_body(json!({"value": [
                    {"appmoduleid": SALES_APP, "name": "Sales Hub", "uniquename": "msdynce_saleshub"},
                    {"appmoduleid": SERVICE_APP, "name": "Customer Service Hub", "uniquename": "msdynce_csh"}
                ]}));
            })
            .await;
    }

    #[test]
    fn resolve_prefers_app_then_environment_then_default() {
        let mut values = SettingValues {
            default: Some("false".to_string()),
            environment: None,
            apps: HashMap::new(),
        };
        values.apps.insert("app-1".to_string(), "true".to_string());

        assert_eq!(values.resolve("APP-1"), ("true".to_string(), SettingSource::App));
        assert_eq!(
            values.resolve("app-2"),
            ("false".to_string(), SettingSource::Default)
        );

        values.environment = Some("true".to_string());
        assert_eq!(
            values.resolve("app-2"),
            ("true".to_string(), SettingSource::Environment)
        );

        assert_eq!(
            SettingValues::default().resolve("app-3"),
            ("n/a".to_string(), SettingSource::Default)
        );
    }

    #[tokio::test]
    async fn environment_rows_combine_apps_and_setting() {
        let server = MockServer::start_async().await;
        mock_setting_endpoints(&server, None).await;

        let client = ServiceClient::new(&Client::new(), &server.base_url(), "dv-token");
        let rows = environment_rows(&client, &environment(Some(server.base_url())))
            .await
            .expect("rows");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].app_name, "Sales Hub");
        assert_eq!(rows[0].classic_look_opt_out, "true");
        assert_eq!(rows[0].source, SettingSource::App);
        assert_eq!(rows[1].app_unique_name, "msdynce_csh");
        assert_eq!(rows[1].classic_look_opt_out, "false");
        assert_eq!(rows[1].source, SettingSource::Default);
    }

    #[tokio::test]
    async fn report_skips_environments_without_dataverse() {
        let server = MockServer::start_async().await;
        mock_setting_endpoints(&server, Some("true")).await;
        let token = server
            .mock_async(|when, then| {
                when.method(POST).path("/tenant/oauth2/v2.0/token");
                then.status(200)
                    .json_body(json!({"access_token": "dv-token", "expires_in": 3600}));
            })
            .await;

        let client = Client::new();
        let mut tokens = TokenProvider::new(
            &client,
            ClientCredentials {
                tenant_id: "tenant".to_string(),
                client_id: "app".to_string(),
                client_secret: "secret".to_string(),
            },
        )
        .with_authority(&server.base_url());

        let teams_only = Environment {
            id: "env-0".to_string(),
            display_name: "Teams".to_string(),
            instance_url: None,
        };
        let report = collect_report(
            &client,
            &mut tokens,
            &[teams_only, environment(Some(server.base_url()))],
        )
        .await;

        token.assert_hits_async(1).await;
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "env-0");
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[1].source, SettingSource::Environment);
    }

    #[test]
    fn csv_has_header_even_without_rows() {
        let mut out = Vec::new();
        write_csv(&mut out, &[]).expect("csv");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "EnvironmentName,EnvironmentId,AppName,AppUniqueName,AppId,ClassicLookOptOut,Source\n"
        );
    }

    #[test]
    fn csv_rows_follow_header_order() {
        let row = ClassicLookRow {
            environment_name: "Contoso, Ltd".to_string(),
            environment_id: "env-1".to_string(),
            app_name: "Sales Hub".to_string(),
            app_unique_name: "msdynce_saleshub".to_string(),
            app_id: "a1".to_string(),
            classic_look_opt_out: "true".to_string(),
            source: SettingSource::App,
        };
        let mut out = Vec::new();
        write_csv(&mut out, &[row]).expect("csv");

        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[1],
            "\"Contoso, Ltd\",env-1,Sales Hub,msdynce_saleshub,a1,true,App"
        );
    }
}
