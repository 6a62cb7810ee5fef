use clap::Parser;

use crate::utils::types::Consistency;

/// Start a Chord ring node.
#[derive(Debug, Parser)]
#[command(name = "chordkv", about = "A Chord-style replicated key-value ring node")]
pub struct Cli {
    /// IP address this node listens on and advertises to peers.
    #[arg(long)]
    pub ip: String,

    /// Port this node listens on and advertises to peers.
    #[arg(long)]
    pub port: u16,

    /// Whether this node founds the ring rather than joining an existing one.
    #[arg(long, default_value_t = false)]
    pub bootstrap: bool,

    /// Required (and only meaningful) when `--bootstrap` is set: number of
    /// replicas kept per key, including the primary.
    #[arg(long = "replication-factor")]
    pub replication_factor: Option<u32>,

    /// Required (and only meaningful) when `--bootstrap` is set.
    #[arg(long, value_enum)]
    pub consistency: Option<Consistency>,

    /// Required (and only meaningful) when `--bootstrap` is not set.
    #[arg(long = "bootstrap-ip")]
    pub bootstrap_ip: Option<String>,

    /// Required (and only meaningful) when `--bootstrap` is not set.
    #[arg(long = "bootstrap-port")]
    pub bootstrap_port: Option<u16>,
}

impl clap::ValueEnum for Consistency {
    fn value_variants<'a>() -> &'a [Self] {
        &[Consistency::Chain, Consistency::Eventual]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(match self {
            Consistency::Chain => "chain",
            Consistency::Eventual => "eventual",
        }))
    }
}

#[derive(Debug)]
pub enum CliValidationError {
    MissingBootstrapConfig,
    UnexpectedBootstrapConfig,
    MissingJoinAddress,
    UnexpectedJoinAddress,
}

impl std::fmt::Display for CliValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            CliValidationError::MissingBootstrapConfig => {
                "--replication-factor and --consistency are required when --bootstrap is set"
            }
            CliValidationError::UnexpectedBootstrapConfig => {
                "--replication-factor and --consistency must not be set unless --bootstrap is set"
            }
            CliValidationError::MissingJoinAddress => {
                "--bootstrap-ip and --bootstrap-port are required when --bootstrap is not set"
            }
            CliValidationError::UnexpectedJoinAddress => {
                "--bootstrap-ip and --bootstrap-port are ignored since you are the bootstrap node"
            }
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for CliValidationError {}

impl Cli {
    /// Validates the required/forbidden argument combinations before any
    /// socket is opened.
    pub fn validate(&self) -> Result<(), CliValidationError> {
        if self.bootstrap {
            if self.replication_factor.is_none() || self.consistency.is_none() {
                return Err(CliValidationError::MissingBootstrapConfig);
            }
            if self.bootstrap_ip.is_some() || self.bootstrap_port.is_some() {
                return Err(CliValidationError::UnexpectedJoinAddress);
            }
        } else {
            if self.bootstrap_ip.is_none() || self.bootstrap_port.is_none() {
                return Err(CliValidationError::MissingJoinAddress);
            }
            if self.replication_factor.is_some() || self.consistency.is_some() {
                return Err(CliValidationError::UnexpectedBootstrapConfig);
            }
        }
        Ok(())
    }
}
