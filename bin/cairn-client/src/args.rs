use std::path::PathBuf;

use argh::FromArgs;

/// Command-line arguments
#[derive(Debug, Clone, FromArgs)]
pub struct Args {
    #[argh(option, short = 'c', description = "path to the operator config TOML")]
    pub config: PathBuf,

    #[argh(option, description = "override the base chain RPC url")]
    pub rpc_url: Option<String>,

    #[argh(option, description = "override the signer account")]
    pub signer_account: Option<String>,
}
