use crate::Result;
use crate::supervisor::SUPERVISOR;
use miette::IntoDiagnostic;

/// Start the daemon fleet in the foreground, without the control API
#[derive(Debug, clap::Args)]
pub struct Run {}

impl Run {
    pub async fn run(&self) -> Result<()> {
        let (success, msg) = SUPERVISOR.start().await;
        if !success {
            return Err(miette::miette!("{msg}"));
        }
        info!("{msg}");

        tokio::signal::ctrl_c().await.into_diagnostic()?;
        info!("received signal, stopping");
        let (_, msg) = SUPERVISOR.stop().await;
        info!("{msg}");
        Ok(())
    }
}
