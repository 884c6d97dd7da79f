//! Multipart upload parsing
//!
//! Shared by `POST /compile` and `POST /jobs`: a `file` part plus optional
//! `main` and `compiler` text parts. Unknown parts are skipped. A `compiler`
//! part is passed through verbatim, so a blank one fails validation.

use axum::extract::Multipart;

use crate::api::error::ApiResult;
use crate::dispatcher::Upload;

pub async fn read_upload(mut multipart: Multipart) -> ApiResult<Upload> {
    let mut upload = Upload::default();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                upload.file_name = field.file_name().unwrap_or_default().to_string();
                upload.bytes = field.bytes().await?.to_vec();
            }
            Some("main") => {
                let main = field.text().await?;
                upload.main = Some(main.trim().to_string()).filter(|m| !m.is_empty());
            }
            Some("compiler") => {
                upload.compiler = Some(field.text().await?);
            }
            _ => continue,
        }
    }

    Ok(upload)
}
