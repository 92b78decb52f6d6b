//! CLI command implementations

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bip39::{Language, Mnemonic};
use clap::{Args, Parser, Subcommand};
use rand::RngCore;
use serde::Serialize;
use serde_json::json;
use tessera_core::{
    message::recover_message_address, AccountSigner, Address, Authorization, Bytes,
    DerivationOptions, HdAccount, SignableMessage, Signature, TransactionRequest, TypedData, B256,
};
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::CliConfig;

/// Tessera - HD account derivation and Ethereum signing
#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Derive HD accounts and sign Ethereum payloads", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print account addresses
    Address {
        #[command(flatten)]
        seed: SeedArgs,

        #[command(flatten)]
        derivation: DerivationArgs,

        /// Number of consecutive address indices to print
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },

    /// Export the account's extended keys
    Keys {
        #[command(flatten)]
        seed: SeedArgs,

        #[command(flatten)]
        derivation: DerivationArgs,
    },

    /// Sign a personal message (EIP-191)
    SignMessage {
        #[command(flatten)]
        seed: SeedArgs,

        #[command(flatten)]
        derivation: DerivationArgs,

        /// Message text, or 0x hex with --raw
        message: String,

        /// Treat the message as hex-encoded bytes
        #[arg(long)]
        raw: bool,
    },

    /// Sign a raw 32-byte digest
    SignHash {
        #[command(flatten)]
        seed: SeedArgs,

        #[command(flatten)]
        derivation: DerivationArgs,

        /// Digest (0x hex)
        hash: String,
    },

    /// Sign a JSON transaction request
    SignTx {
        #[command(flatten)]
        seed: SeedArgs,

        #[command(flatten)]
        derivation: DerivationArgs,

        /// JSON file, or - for stdin
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Sign EIP-712 typed data from a JSON file
    SignTypedData {
        #[command(flatten)]
        seed: SeedArgs,

        #[command(flatten)]
        derivation: DerivationArgs,

        /// JSON file, or - for stdin
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Sign an EIP-7702 authorization
    SignAuthorization {
        #[command(flatten)]
        seed: SeedArgs,

        #[command(flatten)]
        derivation: DerivationArgs,

        /// Chain ID (0 authorizes every chain)
        #[arg(long)]
        chain_id: u64,

        /// Delegate contract address
        #[arg(long)]
        contract: String,

        /// Account nonce
        #[arg(long, default_value_t = 0)]
        nonce: u64,

        /// Skip recovering and checking the signer
        #[arg(long)]
        no_verify: bool,
    },

    /// Check a personal message signature
    VerifyMessage {
        /// Expected signer
        #[arg(long)]
        address: String,

        /// 65-byte signature (0x hex)
        #[arg(long)]
        signature: String,

        /// Message text
        message: String,
    },

    /// Generate a fresh BIP-39 mnemonic
    NewMnemonic {
        /// Word count (12 or 24)
        #[arg(short, long, default_value_t = 12)]
        words: usize,
    },
}

/// Where the master seed comes from
#[derive(Args)]
pub struct SeedArgs {
    /// Master seed (hex)
    #[arg(long, env = "TESSERA_SEED", hide_env_values = true, conflicts_with = "mnemonic")]
    pub seed: Option<String>,

    /// BIP-39 mnemonic phrase
    #[arg(long, env = "TESSERA_MNEMONIC", hide_env_values = true)]
    pub mnemonic: Option<String>,

    /// BIP-39 passphrase
    #[arg(long, env = "TESSERA_PASSPHRASE", hide_env_values = true, default_value = "")]
    pub passphrase: String,
}

/// Overrides for the configured derivation
#[derive(Args)]
pub struct DerivationArgs {
    /// Explicit derivation path (wins over the index flags)
    #[arg(long)]
    pub path: Option<String>,

    /// BIP-44 account index
    #[arg(long)]
    pub account: Option<u32>,

    /// BIP-44 change index
    #[arg(long)]
    pub change: Option<u32>,

    /// BIP-44 address index
    #[arg(long)]
    pub index: Option<u32>,
}

impl DerivationArgs {
    /// Merge the flags over the configured defaults
    pub fn resolve(&self, defaults: &DerivationOptions) -> DerivationOptions {
        let mut options = defaults.clone();
        if let Some(account) = self.account {
            options.account_index = account;
        }
        if let Some(change) = self.change {
            options.change_index = change;
        }
        if let Some(index) = self.index {
            options.address_index = index;
        }
        if self.path.is_some() {
            options.path = self.path.clone();
        } else if self.account.is_some() || self.change.is_some() || self.index.is_some() {
            options.path = None;
        }
        options
    }
}

impl SeedArgs {
    fn account(&self, options: &DerivationOptions) -> Result<HdAccount> {
        match (&self.seed, &self.mnemonic) {
            (Some(seed), _) => {
                let bytes = Zeroizing::new(
                    hex::decode(seed.trim_start_matches("0x")).context("seed must be hex")?,
                );
                Ok(HdAccount::from_seed(&bytes, options)?)
            }
            (None, Some(phrase)) => Ok(HdAccount::from_mnemonic(
                phrase,
                &self.passphrase,
                options,
            )?),
            (None, None) => bail!("no seed given: pass --seed or --mnemonic (or set TESSERA_SEED / TESSERA_MNEMONIC)"),
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", rendered);
    Ok(())
}

fn signature_json(address: Address, signature: &Signature) -> serde_json::Value {
    json!({
        "address": address,
        "signature": signature,
        "r": B256(signature.r),
        "s": B256(signature.s),
        "v": signature.v(),
    })
}

/// Run the CLI
pub fn run(command: Commands, config: &CliConfig) -> Result<()> {
    let pretty = config.pretty;
    match command {
        Commands::Address {
            seed,
            derivation,
            count,
        } => {
            let base = derivation.resolve(&config.derivation);
            if base.path.is_some() && count > 1 {
                bail!("--count cannot be combined with an explicit --path");
            }
            let mut rows = Vec::new();
            for offset in 0..count {
                let options = DerivationOptions {
                    address_index: base
                        .address_index
                        .checked_add(offset)
                        .context("address index overflow")?,
                    ..base.clone()
                };
                let account = seed.account(&options)?;
                rows.push(json!({
                    "path": options.derivation_path()?.to_string(),
                    "address": account.address(),
                }));
            }
            print_json(&rows, pretty)
        }

        Commands::Keys { seed, derivation } => {
            let options = derivation.resolve(&config.derivation);
            let account = seed.account(&options)?;
            print_json(
                &json!({
                    "path": options.derivation_path()?.to_string(),
                    "address": account.address(),
                    "publicKey": format!("0x{}", hex::encode(account.node().uncompressed_public_key())),
                    "xpriv": account.hd_key().xpriv,
                    "xpub": account.hd_key().xpub,
                }),
                pretty,
            )
        }

        Commands::SignMessage {
            seed,
            derivation,
            message,
            raw,
        } => {
            let account = seed.account(&derivation.resolve(&config.derivation))?;
            let message = if raw {
                SignableMessage::Raw {
                    raw: Bytes::from_hex(&message).context("--raw message must be hex")?,
                }
            } else {
                SignableMessage::Text(message)
            };
            let signature = account.sign_message(&message)?;
            print_json(&signature_json(account.address(), &signature), pretty)
        }

        Commands::SignHash {
            seed,
            derivation,
            hash,
        } => {
            let account = seed.account(&derivation.resolve(&config.derivation))?;
            let digest = B256::from_hex(&hash).context("hash must be 32 bytes of hex")?;
            let signature = account.sign(&digest)?;
            print_json(&signature_json(account.address(), &signature), pretty)
        }

        Commands::SignTx {
            seed,
            derivation,
            file,
        } => {
            let account = seed.account(&derivation.resolve(&config.derivation))?;
            let tx: TransactionRequest = serde_json::from_str(&read_input(&file)?)
                .context("parsing transaction request")?;
            debug!(?tx, "parsed transaction request");
            let signed = account.sign_transaction(&tx)?;
            print_json(&signed, pretty)
        }

        Commands::SignTypedData {
            seed,
            derivation,
            file,
        } => {
            let account = seed.account(&derivation.resolve(&config.derivation))?;
            let data: TypedData =
                serde_json::from_str(&read_input(&file)?).context("parsing typed data")?;
            let signature = account.sign_typed_data(&data)?;
            print_json(&signature_json(account.address(), &signature), pretty)
        }

        Commands::SignAuthorization {
            seed,
            derivation,
            chain_id,
            contract,
            nonce,
            no_verify,
        } => {
            let account = seed.account(&derivation.resolve(&config.derivation))?;
            let auth = Authorization {
                chain_id,
                address: contract.parse()?,
                nonce,
            };
            let signed = account.sign_authorization(&auth, !no_verify)?;
            print_json(&signed, pretty)
        }

        Commands::VerifyMessage {
            address,
            signature,
            message,
        } => {
            let expected: Address = address.parse()?;
            let signature = Signature::from_hex(&signature)?;
            let recovered = recover_message_address(&SignableMessage::Text(message), &signature)?;
            print_json(
                &json!({
                    "valid": recovered == expected,
                    "recovered": recovered,
                }),
                pretty,
            )
        }

        Commands::NewMnemonic { words } => {
            let entropy_len = match words {
                12 => 16,
                24 => 32,
                other => bail!("unsupported word count {} (use 12 or 24)", other),
            };
            let mut entropy = Zeroizing::new(vec![0u8; entropy_len]);
            rand::thread_rng().fill_bytes(&mut entropy);
            let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
                .context("generating mnemonic")?;
            println!("{}", mnemonic);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_flags() -> DerivationArgs {
        DerivationArgs {
            path: None,
            account: None,
            change: None,
            index: None,
        }
    }

    #[test]
    fn test_resolve_keeps_config_defaults() {
        let defaults = DerivationOptions {
            account_index: 2,
            ..Default::default()
        };
        assert_eq!(no_flags().resolve(&defaults), defaults);
    }

    #[test]
    fn test_index_flags_override_configured_path() {
        let defaults = DerivationOptions::with_path("m/44'/60'/0'/0/9");
        let args = DerivationArgs {
            index: Some(3),
            ..no_flags()
        };
        let resolved = args.resolve(&defaults);
        assert_eq!(resolved.path, None);
        assert_eq!(
            resolved.derivation_path().unwrap().to_string(),
            "m/44'/60'/0'/0/3"
        );
    }

    #[test]
    fn test_seed_args_require_a_source() {
        let args = SeedArgs {
            seed: None,
            mnemonic: None,
            passphrase: String::new(),
        };
        assert!(args.account(&DerivationOptions::default()).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "tessera",
            "sign-message",
            "--seed",
            "000102030405060708090a0b0c0d0e0f",
            "--index",
            "4",
            "hello world",
        ])
        .unwrap();
        match cli.command {
            Commands::SignMessage { derivation, message, .. } => {
                assert_eq!(derivation.index, Some(4));
                assert_eq!(message, "hello world");
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
