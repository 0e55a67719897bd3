//! BigQuery v2 REST client for load jobs

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::auth::TokenSource;
use super::{JobState, LoadJob, LoadOptions, Warehouse};
use crate::config::IngestConfig;
use crate::models::TableRef;

pub struct BigQueryClient {
    client: Client,
    base_url: String,
    tokens: TokenSource,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobInsertRequest<'a> {
    configuration: JobConfiguration<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobConfiguration<'a> {
    load: LoadConfiguration<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration<'a> {
    source_uris: Vec<&'a str>,
    destination_table: &'a TableRef,
    source_format: &'a str,
    skip_leading_rows: u32,
    autodetect: bool,
    write_disposition: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl JobStatus {
    fn to_state(&self) -> JobState {
        if let Some(err) = &self.error_result {
            return JobState::Failed(format!(
                "{}: {}",
                err.reason.as_deref().unwrap_or("error"),
                err.message.as_deref().unwrap_or("no message")
            ));
        }

        match self.state.as_deref() {
            Some("DONE") => JobState::Done,
            Some("RUNNING") => JobState::Running,
            _ => JobState::Pending,
        }
    }
}

impl BigQueryClient {
    pub fn new(base_url: impl Into<String>, tokens: TokenSource, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn from_config(config: &IngestConfig) -> streamtally_common::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        let tokens = TokenSource::from_config(config, client.clone())?;
        Ok(Self::new(&config.warehouse_base_url, tokens, client))
    }

    async fn read_job(response: Response) -> Result<JobResource> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("BigQuery returned {}: {}", status, body);
        }
        response.json().await.context("Failed to decode BigQuery job resource")
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    #[instrument(skip(self, options), fields(table = %table))]
    async fn start_load(&self, source_uri: &str, table: &TableRef, options: &LoadOptions) -> Result<LoadJob> {
        let url = format!("{}/projects/{}/jobs", self.base_url, table.project_id);
        let request = JobInsertRequest {
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    source_uris: vec![source_uri],
                    destination_table: table,
                    source_format: options.source_format,
                    skip_leading_rows: options.skip_leading_rows,
                    autodetect: options.autodetect,
                    write_disposition: options.write_disposition,
                },
            },
        };

        let token = self.tokens.token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .context("Failed to submit load job")?;

        let job = Self::read_job(response).await?;
        debug!(job_id = %job.job_reference.job_id, "Load job submitted");

        Ok(LoadJob {
            project_id: job.job_reference.project_id,
            job_id: job.job_reference.job_id,
            location: job.job_reference.location,
        })
    }

    async fn job_state(&self, job: &LoadJob) -> Result<JobState> {
        let url = format!("{}/projects/{}/jobs/{}", self.base_url, job.project_id, job.job_id);

        let token = self.tokens.token().await?;
        let mut request = self.client.get(&url).bearer_auth(token);
        if let Some(location) = &job.location {
            request = request.query(&[("location", location.as_str())]);
        }

        let response = request.send().await.context("Failed to poll load job")?;
        let resource = Self::read_job(response).await?;

        Ok(resource.status.unwrap_or_default().to_state())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_request_shape() {
        let table = TableRef {
            project_id: "p".to_string(),
            dataset_id: "d".to_string(),
            table_id: "t".to_string(),
        };
        let options = LoadOptions::default();
        let request = JobInsertRequest {
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    source_uris: vec!["gs://b/k.csv"],
                    destination_table: &table,
                    source_format: options.source_format,
                    skip_leading_rows: options.skip_leading_rows,
                    autodetect: options.autodetect,
                    write_disposition: options.write_disposition,
                },
            },
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "configuration": {
                    "load": {
                        "sourceUris": ["gs://b/k.csv"],
                        "destinationTable": { "projectId": "p", "datasetId": "d", "tableId": "t" },
                        "sourceFormat": "CSV",
                        "skipLeadingRows": 1,
                        "autodetect": true,
                        "writeDisposition": "WRITE_APPEND"
                    }
                }
            })
        );
    }

    #[test]
    fn test_status_mapping() {
        let done: JobStatus = serde_json::from_str(r#"{"state": "DONE"}"#).unwrap();
        assert_eq!(done.to_state(), JobState::Done);

        let failed: JobStatus = serde_json::from_str(
            r#"{"state": "DONE", "errorResult": {"reason": "invalid", "message": "bad row"}}"#,
        )
        .unwrap();
        assert_eq!(failed.to_state(), JobState::Failed("invalid: bad row".to_string()));

        let running: JobStatus = serde_json::from_str(r#"{"state": "RUNNING"}"#).unwrap();
        assert_eq!(running.to_state(), JobState::Running);
        assert_eq!(JobStatus::default().to_state(), JobState::Pending);
    }
}
