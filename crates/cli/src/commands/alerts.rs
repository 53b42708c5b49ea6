//! Alert ledger and telemetry evaluation commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{AnomalyAlert, ApiClient, EvaluateResponse, TelemetryRequest};
use crate::output::{
    color_description, format_timestamp, print_info, print_json, print_success, print_warning,
    OutputFormat,
};

/// Row for the alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Alert ID")]
    alert_id: String,
}

impl From<&AnomalyAlert> for AlertRow {
    fn from(alert: &AnomalyAlert) -> Self {
        Self {
            time: format_timestamp(&alert.timestamp),
            device: alert.device_id.clone(),
            value: format!("{:.1}", alert.detected_value),
            description: color_description(&alert.description),
            alert_id: alert.alert_id.chars().take(8).collect(),
        }
    }
}

/// List the agent's recent alerts, newest first
pub async fn list_alerts(client: &ApiClient, limit: Option<usize>, format: OutputFormat) -> Result<()> {
    let query: Vec<(&str, String)> = limit
        .map(|l| vec![("limit", l.to_string())])
        .unwrap_or_default();
    let alerts: Vec<AnomalyAlert> = client.get("api/v1/alerts", &query).await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            if alerts.is_empty() {
                print_info("No anomaly alerts recorded");
                return Ok(());
            }

            let rows: Vec<AlertRow> = alerts.iter().map(AlertRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} alerts", alerts.len());
        }
    }

    Ok(())
}

/// Submit one telemetry record for evaluation
pub async fn evaluate(
    client: &ApiClient,
    device_id: &str,
    status: &str,
    reading: f64,
    format: OutputFormat,
) -> Result<()> {
    let request = TelemetryRequest {
        device_id: device_id.to_string(),
        status: status.to_string(),
        reading,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    let response: EvaluateResponse = client.post("api/v1/telemetry", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => match response.alert {
            Some(alert) if response.anomaly => {
                print_warning(&format!("Anomaly detected for {}", alert.device_id.bold()));
                println!("  {}", color_description(&alert.description));
                println!("  Alert ID: {}", alert.alert_id);
            }
            _ => print_success(&format!("No anomaly for {}", device_id)),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_row_shortens_id() {
        let alert = AnomalyAlert {
            alert_id: "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
            device_id: "d1".to_string(),
            description: "Temperature too low: -25.5".to_string(),
            detected_value: -25.5,
            timestamp: "2024-05-01T12:00:00Z".to_string(),
        };
        let row = AlertRow::from(&alert);
        assert_eq!(row.alert_id, "0f8fad5b");
        assert_eq!(row.value, "-25.5");
        assert_eq!(row.time, "2024-05-01 12:00:00");
    }
}
