use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::Value;

use trading_daemon::config::default_data_dir;
use trading_daemon::net::{certs, tls};
use trading_daemon::rpc::auth::Credentials;
use trading_daemon::rpc::types::{
    CryptoRequest, GetAccountsRequest, GetTokenPriceRequest, ShutdownRequest, TransferSolRequest,
    TransferTokenRequest, METHOD_CRYPTO, METHOD_GET_ACCOUNTS, METHOD_GET_TOKEN_PRICE,
    METHOD_SHUTDOWN, METHOD_TRANSFER_SOL, METHOD_TRANSFER_TOKEN,
};

#[derive(Parser)]
#[command(name = "daemon-cli")]
#[command(about = "Command line client for the trading daemon RPC server", long_about = None)]
struct Cli {
    #[arg(long, default_value = "localhost:9052")]
    rpchost: String,

    #[arg(long, default_value = "admin")]
    rpcuser: String,

    #[arg(long, default_value = "Password")]
    rpcpassword: String,

    /// Server certificate; defaults to <data dir>/tls/cert.pem
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 15)]
    timeout: u64,

    /// Ask the server for verbose handling of this call
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored accounts
    Getaccounts,
    /// Quote a token in USD and SOL
    Gettokenprice { token_address: String },
    /// Encrypt a partial private key with the accounts public key
    Crypto { plaintext: String },
    /// Forward SOL from an account to the configured recipients
    Transfersol { address: String },
    /// Forward an SPL token from an account to the configured recipients
    Transfertoken { address: String, token_mint: String },
    /// Ask the daemon to shut down
    Shutdown,
}

struct RpcClient {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl RpcClient {
    async fn call<T: Serialize>(&self, method: &str, body: &T) -> Result<(), Box<dyn std::error::Error>> {
        let res = self
            .client
            .post(format!("{}/rpc/{}", self.endpoint, method))
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?;
        print_response(res).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let cert = cli
        .cert
        .unwrap_or_else(|| certs::cert_path(&default_data_dir().join("tls")));
    tls::install_crypto_provider();
    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .add_root_certificate(tls::load_root_certificate(&cert)?)
        .timeout(Duration::from_secs(cli.timeout))
        .build()?;

    let credentials = Credentials::new(cli.rpcuser, cli.rpcpassword);
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&credentials.header_value())?);
    if cli.verbose {
        headers.insert("verbose", HeaderValue::from_static("true"));
    }

    let rpc = RpcClient {
        client,
        endpoint: format!("https://{}", cli.rpchost),
        headers,
    };

    match cli.command {
        Commands::Getaccounts => rpc.call(METHOD_GET_ACCOUNTS, &GetAccountsRequest {}).await?,
        Commands::Gettokenprice { token_address } => {
            rpc.call(METHOD_GET_TOKEN_PRICE, &GetTokenPriceRequest { token_address })
                .await?
        }
        Commands::Crypto { plaintext } => rpc.call(METHOD_CRYPTO, &CryptoRequest { plaintext }).await?,
        Commands::Transfersol { address } => {
            rpc.call(METHOD_TRANSFER_SOL, &TransferSolRequest { address }).await?
        }
        Commands::Transfertoken { address, token_mint } => {
            rpc.call(METHOD_TRANSFER_TOKEN, &TransferTokenRequest { address, token_mint })
                .await?
        }
        Commands::Shutdown => rpc.call(METHOD_SHUTDOWN, &ShutdownRequest {}).await?,
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: RPC server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
