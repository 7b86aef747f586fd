use anyhow::{bail, Result};
use options::{LogFormat, MainOptions};
use s3ocr_dispatcher::harness::{Heart, ModuleRunner};
use s3ocr_dispatcher::module::dispatcher::Dispatcher;
use structopt::StructOpt;
use tracing::info;

mod options;

#[tokio::main]
async fn main() -> Result<()> {
    let options = init();

    let dispatcher = Dispatcher::new(options.dispatcher)?;
    let (heart, _stone) = Heart::new();

    let termination_reason = ModuleRunner::default().run(dispatcher, heart).await;

    if termination_reason.is_failure() {
        bail!(termination_reason);
    }

    Ok(())
}

fn init() -> MainOptions {
    let options = MainOptions::from_args();

    let formatter = tracing_subscriber::fmt().with_env_filter(options.log.as_str());

    match options.log_format {
        LogFormat::Text => formatter.init(),
        LogFormat::Compact => formatter.compact().init(),
        LogFormat::Json => formatter.json().init(),
    };

    info!("s3ocr-dispatcher {}", env!("CARGO_PKG_VERSION"));

    options
}
