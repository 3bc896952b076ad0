//! Batch SOL and token forwarding.
//!
//! Recipients are split into batches of at most `max_instructions_per_tx`
//! transfers; batches are handed to a [`BatchSender`] with at most
//! `concurrent_txs` in flight. A failed batch is logged and skipped, the
//! caller gets the signatures of the batches that went through.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use zeroize::Zeroizing;

use crate::config::schema::ForwardConfig;

const LAMPORTS_PER_SOL: f64 = 1e9;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("unable to read address file {path}: {source}")]
    AddressFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no recipient addresses")]
    NoRecipients,

    #[error("transaction sending is unavailable")]
    Unavailable,

    #[error("batch failed: {0}")]
    Batch(String),
}

/// Per-request transfer parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardSettings {
    pub rpc_endpoint: String,
    pub max_instructions_per_tx: usize,
    pub concurrent_txs: usize,
    pub amount_sol: f64,
    pub amount_token: f64,
    pub create_account_if_not_exist: bool,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        ForwardConfig::default().into()
    }
}

impl From<ForwardConfig> for ForwardSettings {
    fn from(config: ForwardConfig) -> Self {
        Self {
            rpc_endpoint: config.rpc_endpoint,
            max_instructions_per_tx: config.max_instructions_per_tx,
            concurrent_txs: config.concurrent_txs,
            amount_sol: config.amount_sol,
            amount_token: config.amount_token,
            create_account_if_not_exist: config.create_account_if_not_exist,
        }
    }
}

pub struct SolTransfer {
    pub private_key: Zeroizing<String>,
    pub addresses: Vec<String>,
    pub settings: ForwardSettings,
}

pub struct TokenTransfer {
    pub private_key: Zeroizing<String>,
    pub token_mint: String,
    pub addresses: Vec<String>,
    pub is_token_2022: bool,
    pub settings: ForwardSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchKind {
    Sol {
        lamports: u64,
    },
    Token {
        mint: String,
        /// Whole tokens; the sender scales by the mint's decimals.
        amount: f64,
        is_token_2022: bool,
        create_account_if_not_exist: bool,
    },
}

/// One transaction's worth of transfers.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub rpc_endpoint: String,
    pub kind: BatchKind,
    pub recipients: Vec<String>,
}

/// Signs and submits one batch, returning its transaction signature.
#[async_trait]
pub trait BatchSender: Send + Sync {
    async fn send(&self, payer_key: &str, batch: Batch) -> Result<String, ForwardError>;
}

#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn transfer_sol(&self, request: SolTransfer) -> Result<Vec<String>, ForwardError>;

    async fn transfer_token(&self, request: TokenTransfer) -> Result<Vec<String>, ForwardError>;
}

/// Non-empty lines of `path`.
pub async fn read_addresses_from_file(path: impl AsRef<Path>) -> Result<Vec<String>, ForwardError> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ForwardError::AddressFile {
            path: path.display().to_string(),
            source,
        })?;
    Ok(contents
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Splits addresses into batches and fans them out under a semaphore.
#[derive(Clone, Default)]
pub struct BatchForwarder {
    sender: Option<Arc<dyn BatchSender>>,
}

impl BatchForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sender(sender: Arc<dyn BatchSender>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    fn batches(
        addresses: &[String],
        settings: &ForwardSettings,
        kind: &BatchKind,
    ) -> Vec<Batch> {
        addresses
            .chunks(settings.max_instructions_per_tx.max(1))
            .map(|chunk| Batch {
                rpc_endpoint: settings.rpc_endpoint.clone(),
                kind: kind.clone(),
                recipients: chunk.to_vec(),
            })
            .collect()
    }

    async fn dispatch(
        &self,
        private_key: Zeroizing<String>,
        batches: Vec<Batch>,
        concurrency: usize,
    ) -> Result<Vec<String>, ForwardError> {
        let sender = self.sender.clone().ok_or(ForwardError::Unavailable)?;
        if batches.is_empty() {
            return Err(ForwardError::NoRecipients);
        }

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let private_key = Arc::new(private_key);
        let mut tasks = JoinSet::new();

        for batch in batches {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let sender = sender.clone();
            let private_key = private_key.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let recipients = batch.recipients.len();
                match sender.send(&private_key, batch).await {
                    Ok(signature) => {
                        tracing::info!(signature = %signature, recipients, "Transaction sent");
                        Some(signature)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, recipients, "Failed to send transaction");
                        None
                    }
                }
            });
        }

        let mut signatures = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Some(signature)) => signatures.push(signature),
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "Batch task terminated abnormally"),
            }
        }
        Ok(signatures)
    }
}

#[async_trait]
impl Forwarder for BatchForwarder {
    async fn transfer_sol(&self, request: SolTransfer) -> Result<Vec<String>, ForwardError> {
        let kind = BatchKind::Sol {
            lamports: (request.settings.amount_sol * LAMPORTS_PER_SOL) as u64,
        };
        let batches = Self::batches(&request.addresses, &request.settings, &kind);
        self.dispatch(request.private_key, batches, request.settings.concurrent_txs)
            .await
    }

    async fn transfer_token(&self, request: TokenTransfer) -> Result<Vec<String>, ForwardError> {
        let kind = BatchKind::Token {
            mint: request.token_mint.clone(),
            amount: request.settings.amount_token,
            is_token_2022: request.is_token_2022,
            create_account_if_not_exist: request.settings.create_account_if_not_exist,
        };
        let batches = Self::batches(&request.addresses, &request.settings, &kind);
        self.dispatch(request.private_key, batches, request.settings.concurrent_txs)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSender {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        batches: parking_lot::Mutex<Vec<Batch>>,
    }

    #[async_trait]
    impl BatchSender for RecordingSender {
        async fn send(&self, payer_key: &str, batch: Batch) -> Result<String, ForwardError> {
            assert_eq!(payer_key, "payer");
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if batch.recipients.iter().any(|r| r == "bad") {
                return Err(ForwardError::Batch("rejected".to_string()));
            }
            let signature = format!("sig-{}", batch.recipients[0]);
            self.batches.lock().push(batch);
            Ok(signature)
        }
    }

    fn addresses(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("addr{i}")).collect()
    }

    fn settings(per_tx: usize, concurrent: usize) -> ForwardSettings {
        ForwardSettings {
            max_instructions_per_tx: per_tx,
            concurrent_txs: concurrent,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sol_batches_respect_limits() {
        let sender = Arc::new(RecordingSender::default());
        let forwarder = BatchForwarder::with_sender(sender.clone());

        let signatures = forwarder
            .transfer_sol(SolTransfer {
                private_key: Zeroizing::new("payer".to_string()),
                addresses: addresses(25),
                settings: settings(10, 2),
            })
            .await
            .unwrap();

        assert_eq!(signatures.len(), 3);
        assert!(sender.peak.load(Ordering::SeqCst) <= 2);

        let batches = sender.batches.lock();
        let mut sizes: Vec<_> = batches.iter().map(|b| b.recipients.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![5, 10, 10]);
        assert_eq!(batches[0].kind, BatchKind::Sol { lamports: 10_000_000 });
    }

    #[tokio::test]
    async fn test_failed_batch_is_skipped() {
        let sender = Arc::new(RecordingSender::default());
        let forwarder = BatchForwarder::with_sender(sender);
        let mut recipients = addresses(2);
        recipients.push("bad".to_string());

        let signatures = forwarder
            .transfer_token(TokenTransfer {
                private_key: Zeroizing::new("payer".to_string()),
                token_mint: "Mint".to_string(),
                addresses: recipients,
                is_token_2022: false,
                settings: settings(1, 5),
            })
            .await
            .unwrap();

        let mut signatures = signatures;
        signatures.sort();
        assert_eq!(signatures, vec!["sig-addr0", "sig-addr1"]);
    }

    #[tokio::test]
    async fn test_without_sender_is_unavailable() {
        let forwarder = BatchForwarder::new();
        let err = forwarder
            .transfer_sol(SolTransfer {
                private_key: Zeroizing::new("payer".to_string()),
                addresses: addresses(1),
                settings: ForwardSettings::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Unavailable));
    }

    #[tokio::test]
    async fn test_empty_recipients() {
        let forwarder = BatchForwarder::with_sender(Arc::new(RecordingSender::default()));
        let err = forwarder
            .transfer_sol(SolTransfer {
                private_key: Zeroizing::new("payer".to_string()),
                addresses: Vec::new(),
                settings: ForwardSettings::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::NoRecipients));
    }

    #[tokio::test]
    async fn test_read_addresses_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.txt");
        std::fs::write(&path, "A1\n\nB2\r\nC3\n").unwrap();

        let addresses = read_addresses_from_file(&path).await.unwrap();
        assert_eq!(addresses, vec!["A1", "B2", "C3"]);

        assert!(matches!(
            read_addresses_from_file(dir.path().join("missing.txt")).await,
            Err(ForwardError::AddressFile { .. })
        ));
    }

    #[test]
    fn test_defaults_follow_config() {
        let settings = ForwardSettings::default();
        assert_eq!(settings.max_instructions_per_tx, 10);
        assert_eq!(settings.concurrent_txs, 5);
        assert_eq!(settings.amount_sol, 0.01);
        assert_eq!(settings.amount_token, 100.0);
        assert!(settings.create_account_if_not_exist);
    }
}
