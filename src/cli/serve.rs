use crate::supervisor::SUPERVISOR;
use crate::{Result, web};
use std::net::IpAddr;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};

/// Serve the HTTP control API
#[derive(Debug, clap::Args)]
pub struct Serve {
    /// Address to bind
    #[clap(long, default_value = "127.0.0.1")]
    bind: IpAddr,
    /// Port to listen on
    #[clap(long, short, default_value_t = 8333, env = "HELL_PORT")]
    port: u16,
}

impl Serve {
    pub async fn run(&self) -> Result<()> {
        // open the token store up front so a bad database fails loudly
        once_cell::sync::Lazy::force(&crate::access::TOKENS);
        self.signals();
        web::serve(self.bind, self.port).await
    }

    fn signals(&self) {
        static RECEIVED_SIGNAL: AtomicBool = AtomicBool::new(false);
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                if RECEIVED_SIGNAL.swap(true, Ordering::SeqCst) {
                    exit(1);
                }
                tokio::spawn(async {
                    info!("received signal, stopping");
                    if SUPERVISOR.is_running() {
                        let (_, msg) = SUPERVISOR.stop().await;
                        info!("{msg}");
                    }
                    exit(0);
                });
            }
        });
    }
}
