use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use inspector_bridge::{Inspector, InspectorOptions, LoopbackEngine};
use inspector_config::Config;
use tracing::{info, warn};

#[derive(Debug, Clone, Parser)]
pub(crate) struct ServeCmd {
    /// Port to listen on, 0 picks a free port [default: from config, 9229]
    #[arg(short, long)]
    pub(crate) port: Option<u16>,

    /// Host address to bind to
    #[arg(long)]
    pub(crate) host: Option<String>,

    /// Block until a debugger connects and asks the target to run
    #[arg(long)]
    pub(crate) wait: bool,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 10)]
    pub(crate) tick_interval: u64,
}

impl ServeCmd {
    pub(crate) fn options(&self, cfg: &Config) -> InspectorOptions {
        let mut options = InspectorOptions::from(cfg);
        if let Some(port) = self.port {
            options.port = i32::from(port);
        }
        if let Some(host) = &self.host {
            options.host.clone_from(host);
        }
        options
    }

    pub(crate) async fn handle(&self, cfg: Config) -> Result<Config> {
        let options = self.options(&cfg);
        let (host, port) = (options.host.clone(), options.port);

        let inspector = Inspector::new(options, LoopbackEngine::new());
        if !inspector.is_alive() {
            anyhow::bail!("Inspector failed to listen on {host}:{port}");
        }
        if let Some(url) = inspector.websocket_url() {
            info!("Debugger URL: {url}");
        }

        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {e}");
            }
        };
        let result = self.run(&inspector, ctrl_c).await;

        inspector.close();
        result.map(|()| cfg)
    }

    /// Ticks `inspector` until `shutdown` resolves or the transport stops.
    /// With `--wait`, reports when a debugger asks the target to run; the
    /// shutdown future is honored while waiting.
    async fn run(
        &self,
        inspector: &Inspector<LoopbackEngine>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let mut waiting = self.wait;
        if waiting {
            info!("Waiting for debugger");
        }

        let mut interval = tokio::time::interval(Duration::from_millis(self.tick_interval.max(1)));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutting down...");
                    return Ok(());
                }
                _ = interval.tick() => {
                    let alive = inspector.tick()?;
                    if waiting && inspector.is_connected() {
                        waiting = false;
                        info!("Debugger attached");
                    }
                    if !alive {
                        if waiting {
                            anyhow::bail!("Inspector stopped before a debugger connected");
                        }
                        warn!("Inspector transport stopped");
                        return Ok(());
                    }
                }
            }
        }
    }
}
