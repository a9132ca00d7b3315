use super::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,
    /// Client id to register at startup; generated when absent.
    #[arg(long)]
    pub client_id: Option<String>,
}
