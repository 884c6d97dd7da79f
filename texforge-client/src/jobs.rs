//! Queued job endpoints

use std::time::Duration;

use crate::CompilerClient;
use crate::compile::upload_form;
use crate::error::{ClientError, Result};
use texforge_core::domain::job::{JobId, JobRecord, Toolchain};
use texforge_core::dto::job::QueuedJob;

impl CompilerClient {
    // =============================================================================
    // Submission
    // =============================================================================

    /// Queue a single `.tex` file for compilation
    ///
    /// # Returns
    /// The acceptance body; poll [`CompilerClient::job_status`] with its ID
    pub async fn submit_source(
        &self,
        file_name: &str,
        source: Vec<u8>,
        toolchain: Option<Toolchain>,
    ) -> Result<QueuedJob> {
        let form = upload_form(file_name, source, None, toolchain);
        let response = self
            .client
            .post(self.url("/jobs"))
            .multipart(form)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Queue a ZIP archive for compilation
    pub async fn submit_archive(
        &self,
        file_name: &str,
        archive: Vec<u8>,
        main: Option<&str>,
        toolchain: Option<Toolchain>,
    ) -> Result<QueuedJob> {
        let form = upload_form(file_name, archive, main, toolchain);
        let response = self
            .client
            .post(self.url("/jobs"))
            .multipart(form)
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Polling
    // =============================================================================

    /// Get the record of a queued job
    pub async fn job_status(&self, id: &JobId) -> Result<JobRecord> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/{}", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Poll a queued job until it reaches a terminal state
    ///
    /// # Arguments
    /// * `id` - Job to poll
    /// * `interval` - Pause between polls
    /// * `attempts` - Polls before giving up
    pub async fn wait_for_job(
        &self,
        id: &JobId,
        interval: Duration,
        attempts: usize,
    ) -> Result<JobRecord> {
        for _ in 0..attempts {
            let record = self.job_status(id).await?;
            if record.status.is_terminal() {
                return Ok(record);
            }
            tokio::time::sleep(interval).await;
        }
        Err(ClientError::PollTimeout(id.to_string()))
    }

    /// Download the PDF of a completed queued job
    pub async fn download_job(&self, id: &JobId) -> Result<Vec<u8>> {
        self.fetch(&format!("/jobs/{}/download", id)).await
    }
}
