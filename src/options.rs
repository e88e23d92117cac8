use clap::Parser;

/// SBMS Bridge - polls Electrodacus SBMS0 controllers and publishes their telemetry
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Poll every enabled device once, print the decoded JSON and exit
    #[clap(long = "once")]
    pub once: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}
