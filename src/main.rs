use hell::Result;
#[cfg(unix)]
use tokio::signal::{self, unix::SignalKind};

#[tokio::main]
async fn main() -> Result<()> {
    hell::logger::init();
    #[cfg(unix)]
    handle_epipe();
    hell::cli::run().await
}

#[cfg(unix)]
fn handle_epipe() {
    match signal::unix::signal(SignalKind::pipe()) {
        Ok(mut pipe_stream) => {
            tokio::spawn(async move {
                pipe_stream.recv().await;
                log::debug!("received SIGPIPE");
            });
        }
        Err(e) => {
            log::warn!("Could not set up SIGPIPE handler: {e}");
        }
    }
}
