use std::str::FromStr;
use structopt::StructOpt;
use thiserror::Error;

#[derive(Debug, StructOpt)]
#[structopt(
    about = "Creates Kubernetes OCR jobs for objects announced by bucket notifications.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct MainOptions {
    /// Log level, scopable to different modules
    ///
    /// Levels: trace, debug, info, warn, error
    #[structopt(
        short,
        long,
        default_value = "info,kube=warn,hyper=warn,tower=warn",
        env = "RUST_LOG",
        value_name = "level"
    )]
    pub log: String,

    /// Log output format, one of text, compact or json
    #[structopt(long, default_value = "text", env = "LOG_FORMAT", value_name = "format")]
    pub log_format: LogFormat,

    #[structopt(flatten)]
    pub dispatcher: s3ocr_dispatcher::module::dispatcher::Options,
}

#[derive(Debug, Error)]
#[error("unknown log format '{0}', expected text, compact or json")]
pub struct UnknownLogFormat(String);

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Text,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(UnknownLogFormat(s.to_owned())),
        }
    }
}
