//! Synchronous compilation endpoints

use reqwest::multipart::{Form, Part};

use crate::CompilerClient;
use crate::error::Result;
use texforge_core::domain::job::Toolchain;
use texforge_core::domain::result::CompileResult;
use texforge_core::dto::health::HealthStatus;

/// Builds the multipart body shared by both front doors
pub(crate) fn upload_form(
    file_name: &str,
    bytes: Vec<u8>,
    main: Option<&str>,
    toolchain: Option<Toolchain>,
) -> Form {
    let mut form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.to_string()));
    if let Some(main) = main {
        form = form.text("main", main.to_string());
    }
    if let Some(toolchain) = toolchain {
        form = form.text("compiler", toolchain.as_str());
    }
    form
}

impl CompilerClient {
    /// Get the service's health and load
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self.client.get(self.url("/health")).send().await?;

        self.handle_response(response).await
    }

    /// Compile a single `.tex` file and wait for the result
    ///
    /// # Arguments
    /// * `file_name` - Name of the upload; must end in `.tex`
    /// * `source` - File contents
    /// * `toolchain` - `None` lets the server pick its default
    ///
    /// # Returns
    /// The compile result, successful or not. Rejections before admission
    /// (validation, capacity) are errors.
    pub async fn compile_source(
        &self,
        file_name: &str,
        source: Vec<u8>,
        toolchain: Option<Toolchain>,
    ) -> Result<CompileResult> {
        self.compile(upload_form(file_name, source, None, toolchain))
            .await
    }

    /// Compile a ZIP archive and wait for the result
    ///
    /// # Arguments
    /// * `file_name` - Name of the upload; must end in `.zip`
    /// * `archive` - Archive contents
    /// * `main` - Main source inside the archive; may be omitted when the
    ///   archive holds exactly one `.tex` file
    /// * `toolchain` - `None` lets the server pick its default
    pub async fn compile_archive(
        &self,
        file_name: &str,
        archive: Vec<u8>,
        main: Option<&str>,
        toolchain: Option<Toolchain>,
    ) -> Result<CompileResult> {
        self.compile(upload_form(file_name, archive, main, toolchain))
            .await
    }

    async fn compile(&self, form: Form) -> Result<CompileResult> {
        let response = self
            .client
            .post(self.url("/compile"))
            .multipart(form)
            .send()
            .await?;

        self.handle_compile_response(response).await
    }
}
