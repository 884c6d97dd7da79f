//! End-to-end tests: a real server on an ephemeral port, driven through the
//! client against a fake toolchain.

#![cfg(unix)]

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use texforge_client::{ClientError, CompilerClient};
use texforge_core::domain::job::{JobId, JobStatus, Toolchain};
use texforge_orchestrator::config::{Config, QueueConfig};
use texforge_runner::testing::{FakeToolchain, archive, scripts};

struct Server {
    client: CompilerClient,
    toolchain: FakeToolchain,
    root: tempfile::TempDir,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Server {
    async fn start(configure: impl FnOnce(&mut Config)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let toolchain = FakeToolchain::new();
        let mut config = Config {
            bind_addr: "127.0.0.1:0".to_string(),
            work_dir: root.path().join("work"),
            output_dir: root.path().join("out"),
            upload_dir: root.path().join("uploads"),
            toolchain_dir: Some(toolchain.bin_dir().to_path_buf()),
            compilation_timeout: Duration::from_secs(10),
            queue: QueueConfig {
                job_timeout: Duration::from_secs(10),
                ..QueueConfig::default()
            },
            ..Config::default()
        };
        configure(&mut config);

        let listener = tokio::net::TcpListener::bind(&config.bind_addr)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(texforge_orchestrator::serve(
            listener,
            config,
            shutdown.clone(),
        ));

        Self {
            client: CompilerClient::new(format!("http://{}", addr)),
            toolchain,
            root,
            shutdown,
            handle,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

const SOURCE: &[u8] = b"\\documentclass{article}\\begin{document}Hi\\end{document}";

#[tokio::test]
async fn test_compile_source_and_fetch_artifacts() {
    let server = Server::start(|_| {}).await;

    let result = server
        .client
        .compile_source("paper.tex", SOURCE.to_vec(), None)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(
        result.message.as_deref(),
        Some("Compilation completed successfully")
    );
    let pdf = server
        .client
        .fetch(result.pdf_url.as_deref().unwrap())
        .await
        .unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    let log = server
        .client
        .fetch(result.logs_url.as_deref().unwrap())
        .await
        .unwrap();
    let log = String::from_utf8(log).unwrap();
    assert!(log.contains("Starting compilation - Compiler: pdflatex, Main: paper"));

    let invocations = server.toolchain.invocations();
    assert_eq!(invocations.len(), 3);
    assert!(invocations.iter().all(|line| line.starts_with("pdflatex ")));

    server.stop().await;
}

#[tokio::test]
async fn test_failed_compile_is_a_result_not_an_error() {
    let server = Server::start(|_| {}).await;
    server
        .toolchain
        .install("xelatex", &scripts::engine_failing_on_pass(1));

    let result = server
        .client
        .compile_source("paper.tex", SOURCE.to_vec(), Some(Toolchain::Xelatex))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.message.as_deref(), Some("LaTeX compilation failed"));
    assert!(result.logs_url.is_some());
    assert!(result.pdf_url.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_timed_out_compile() {
    let server = Server::start(|config| {
        config.compilation_timeout = Duration::from_millis(500);
    })
    .await;
    server.toolchain.install("pdflatex", scripts::HANG);

    let result = server
        .client
        .compile_source("paper.tex", SOURCE.to_vec(), None)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.message.as_deref(), Some("Compilation timed out"));

    let health = server.client.health().await.unwrap();
    assert_eq!(health.running_jobs, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_rejected_uploads() {
    let server = Server::start(|_| {}).await;

    let err = server
        .client
        .compile_source("notes.txt", b"plain".to_vec(), None)
        .await
        .unwrap_err();
    match err {
        ClientError::ApiError { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Only ZIP and .tex files are allowed");
        }
        other => panic!("unexpected error {:?}", other),
    }

    let two_sources = archive(&[("a.tex", b"x".as_slice()), ("b.tex", b"y".as_slice())]);
    let err = server
        .client
        .compile_archive("bundle.zip", two_sources, None, None)
        .await
        .unwrap_err();
    assert!(err.is_client_error());

    let err = server.client.fetch("/files/nothing.pdf").await.unwrap_err();
    assert!(err.is_not_found());

    assert!(server.toolchain.invocations().is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_archive_with_nested_main_and_bibliography() {
    let server = Server::start(|_| {}).await;
    server
        .toolchain
        .install("lualatex", scripts::ENGINE_WITH_BCF);
    let bundle = archive(&[
        ("thesis/", b"".as_slice()),
        ("thesis/main.tex", SOURCE),
        ("thesis/chapters/intro.tex", b"Intro".as_slice()),
        ("thesis/refs.bib", b"@book{x}".as_slice()),
    ]);

    let result = server
        .client
        .compile_archive(
            "thesis.zip",
            bundle,
            Some("thesis/main"),
            Some(Toolchain::Lualatex),
        )
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.message);
    let invocations = server.toolchain.invocations();
    assert_eq!(invocations.len(), 4);
    assert!(invocations[1].starts_with("biber "));

    server.stop().await;
}

#[tokio::test]
async fn test_queued_job_round_trip() {
    let server = Server::start(|_| {}).await;

    let accepted = server
        .client
        .submit_archive(
            "bundle.zip",
            archive(&[("main.tex", SOURCE)]),
            None,
            Some(Toolchain::Xelatex),
        )
        .await
        .unwrap();
    assert_eq!(accepted.status, JobStatus::Queued);
    assert_eq!(
        accepted.message,
        "File uploaded successfully, compilation queued"
    );

    let record = server
        .client
        .wait_for_job(&accepted.id, Duration::from_millis(50), 200)
        .await
        .unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.toolchain, Toolchain::Xelatex);
    assert!(record.payload_path.is_none());

    let pdf = server.client.download_job(&accepted.id).await.unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    assert!(
        std::fs::read_dir(server.root.path().join("uploads"))
            .unwrap()
            .next()
            .is_none()
    );

    server.stop().await;
}

#[tokio::test]
async fn test_queue_disabled_hides_jobs_routes() {
    let server = Server::start(|config| config.queue.enabled = false).await;

    let err = server
        .client
        .submit_source("paper.tex", SOURCE.to_vec(), None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    server.stop().await;
}

#[tokio::test]
async fn test_health_reports_configuration() {
    let server = Server::start(|config| {
        config.max_concurrent_jobs = 3;
        config.compilation_timeout = Duration::from_secs(90);
    })
    .await;

    let health = server.client.health().await.unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.max_concurrent, 3);
    assert_eq!(health.compilation_timeout, "1m30s");

    server.stop().await;
}

#[tokio::test]
async fn test_startup_reclaims_stale_artifacts() {
    let stale = JobId::generate();
    let mut stale_pdf = None;
    let server = Server::start(|config| {
        let files = config.output_dir.join("files");
        std::fs::create_dir_all(&files).unwrap();
        let pdf = files.join(format!("{}.pdf", stale));
        std::fs::write(&pdf, b"%PDF").unwrap();
        let file = std::fs::File::options().write(true).open(&pdf).unwrap();
        file.set_modified(std::time::SystemTime::now() - Duration::from_secs(3600))
            .unwrap();
        stale_pdf = Some(pdf);
    })
    .await;

    // Answering at all means startup has finished
    server.client.health().await.unwrap();

    assert!(!stale_pdf.unwrap().exists());
    let err = server
        .client
        .fetch(&format!("/files/{}.pdf", stale))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    server.stop().await;
}
