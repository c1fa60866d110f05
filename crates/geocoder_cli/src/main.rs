mod cli;
mod config;
mod logging;
mod render;

use anyhow::{bail, Context};
use clap::Parser;
use geocoder_core::Phase;
use geocoder_engine::{AtomicFileWriter, NullSink, Session, UploadRequest};
use geocoder_logging::{ingest_info, ingest_warn};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::config::FileConfig;
use crate::logging::LogDestination;
use crate::render::TerminalSink;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::initialize(
        LogDestination::choose(cli.log_file.clone(), cli.quiet),
        cli.log_level.into(),
    );

    let file_config = match &cli.config {
        Some(path) => config::load(path)?,
        None => FileConfig::default(),
    };
    let options = config::resolve(&cli, file_config)?;

    let upload = UploadRequest::from_path(&cli.file)
        .await
        .with_context(|| format!("preparing {}", cli.file.display()))?
        .with_filters(options.province.clone(), options.municipality.clone());
    let mut session = Session::connect(options.settings.clone()).context("creating HTTP client")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ingest_warn!("interrupted; cancelling run");
                cancel.cancel();
            }
        }
    });

    let sink = TerminalSink::new(cli.quiet);
    let outcome = if options.one_shot {
        session.run_one_shot(&upload, &sink, &cancel).await
    } else {
        session.run_streaming(&upload, &sink, &cancel).await
    };
    sink.finish();

    let saved = match session.state().artifact() {
        Some(artifact) => {
            let writer = AtomicFileWriter::new(options.output_dir.clone());
            let path = writer
                .write_artifact(artifact)
                .with_context(|| format!("saving result into {}", options.output_dir.display()))?;
            ingest_info!("saved {} bytes to {:?}", artifact.len(), path);
            Some(path)
        }
        None => None,
    };

    let view = session.state().view();
    for line in render::summary_lines(&view, saved.as_deref()) {
        println!("{line}");
    }
    session.dispose(&NullSink);

    outcome.context("geocoding run failed")?;
    if view.phase == Phase::Completed && saved.is_none() {
        bail!("the server completed the run without a usable result file");
    }
    Ok(())
}
