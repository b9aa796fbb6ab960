//! datalayer: replays a JSON page scenario through the observer pipeline and
//! prints every message dispatched to adaptors as a JSON line on stdout.

mod scenario;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde_json::{json, Value};
use tracing::{info, warn};

use datalayer_core::{DataLayerConfig, DataLayerMessage};
use datalayer_dom::Document;
use datalayer_web_sdk::adaptors::gtm::GtmConfig;
use datalayer_web_sdk::adaptors::ga::GaConfig;
use datalayer_web_sdk::adaptors::LoadFlag;
use datalayer_web_sdk::{Adaptor, DataLayer, GaAdaptor, GtmAdaptor, TealiumAdaptor, Transport};

use crate::scenario::{run_step, Scenario};

#[derive(Parser, Debug)]
#[command(name = "datalayer")]
#[command(about = "Replay a page scenario through the behavioral-tracking data layer")]
#[command(version)]
struct Cli {
    /// Scenario file: page tree plus steps
    #[arg(long)]
    scenario: PathBuf,

    /// Config file layered under DATALAYER__* environment variables
    #[arg(long, env = "DATALAYER_CONFIG")]
    config: Option<PathBuf>,

    /// Report adaptors as loaded only after this delay
    #[arg(long)]
    adaptor_delay_ms: Option<u64>,

    /// Also print Tealium, GTM and GA4 platform calls
    #[arg(long, default_value_t = false)]
    platforms: bool,

    /// Site origin for resolving relative links (overrides config)
    #[arg(long, env = "DATALAYER__ADAPTORS__SITE_ORIGIN")]
    site_origin: Option<String>,
}

fn print_line(line: &Value) {
    let mut stdout = std::io::stdout().lock();
    if let Err(err) = writeln!(stdout, "{line}") {
        warn!(error = %err, "failed to write to stdout");
    }
}

/// Prints every message it is handed.
struct StdoutAdaptor {
    loaded: LoadFlag,
}

impl Adaptor for StdoutAdaptor {
    fn id(&self) -> &str {
        "stdout"
    }

    fn forward(&self, _model: &Value, message: &DataLayerMessage) -> Result<()> {
        print_line(&message.to_value());
        Ok(())
    }

    fn has_loaded(&self) -> bool {
        self.loaded.get()
    }
}

/// Prints platform commands tagged with the adaptor that issued them.
struct PrintTransport(&'static str);

impl Transport for PrintTransport {
    fn send(&self, command: &str, payload: Value) -> Result<()> {
        print_line(&json!({ "adaptor": self.0, "command": command, "payload": payload }));
        Ok(())
    }
}

fn adaptors(cli: &Cli, config: &DataLayerConfig, loaded: bool) -> Vec<Arc<dyn Adaptor>> {
    let mut adaptors: Vec<Arc<dyn Adaptor>> = vec![Arc::new(StdoutAdaptor {
        loaded: LoadFlag::new(loaded),
    })];
    if !cli.platforms {
        return adaptors;
    }

    let tealium = TealiumAdaptor::new(config.adaptors.site_origin.clone(), Arc::new(PrintTransport("tealium")));
    if loaded {
        tealium.mark_loaded();
    }
    adaptors.push(Arc::new(tealium));

    if let Some(container_id) = &config.adaptors.gtm_container_id {
        let gtm = GtmAdaptor::new(
            GtmConfig {
                container_id: container_id.clone(),
                ..Default::default()
            },
            Arc::new(PrintTransport("gtm")),
        );
        if loaded {
            gtm.mark_loaded();
        }
        adaptors.push(Arc::new(gtm));
    }

    if let Some(measurement_id) = &config.adaptors.ga_measurement_id {
        let ga = GaAdaptor::new(
            GaConfig {
                measurement_id: measurement_id.clone(),
                ..Default::default()
            },
            Arc::new(PrintTransport("ga4")),
        );
        if loaded {
            ga.mark_loaded();
        }
        adaptors.push(Arc::new(ga));
    }

    adaptors
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded_config = match &cli.config {
        Some(path) => DataLayerConfig::load_from(path),
        None => DataLayerConfig::load(),
    };
    let config_error = loaded_config.as_ref().err().map(|e| e.to_string());
    let mut config = loaded_config.unwrap_or_default();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    if let Some(error) = config_error {
        warn!(error = %error, "Failed to load config, using defaults");
    }
    if let Some(origin) = cli.site_origin.clone() {
        config.adaptors.site_origin = origin;
    }

    let scenario = Scenario::from_file(&cli.scenario)?;
    info!(
        scenario = %cli.scenario.display(),
        steps = scenario.steps.len(),
        "Scenario loaded"
    );

    let document = Document::new();
    scenario.load(&document)?;

    let adaptors = adaptors(&cli, &config, cli.adaptor_delay_ms.is_none());
    let ids: Vec<String> = adaptors.iter().map(|a| a.id().to_string()).collect();
    let layer = DataLayer::create(document, config, adaptors);

    let steps = async {
        for step in &scenario.steps {
            run_step(&layer, step).await?;
        }
        layer.ready().await;
        // Let the last stage's stored events flush.
        tokio::time::sleep(Duration::from_millis(1)).await;
        anyhow::Ok(())
    };
    let report_loaded = async {
        if let Some(delay) = cli.adaptor_delay_ms {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            for id in &ids {
                layer.adaptor_loaded(id);
            }
        }
    };
    let (result, ()) = tokio::join!(steps, report_loaded);
    result?;

    layer.flush();
    info!(metrics = %layer.metrics().summary(), "Scenario complete");
    layer.stop();
    Ok(())
}
