//! CLI args and validated runtime configuration.
//!
//! Args are parsed once at startup and validated into a [`Config`], which is
//! then wired into the [`Context`](crate::context::Context). There are no
//! process-wide singletons; anything that needs a tunable takes it from the
//! context.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{bail, ensure, Context as _};
use argh::FromArgs;
use hopper_common::amount::Amount;
use rust_decimal::Decimal;

/// The token in the payer URL template replaced with the transaction id.
pub const TX_ID_TOKEN: &str = "{transaction_id}";

/// Represents a validated deploy environment configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeployEnv {
    Dev,
    Staging,
    Prod,
}

impl DeployEnv {
    /// Shorthand to check whether this [`DeployEnv`] is prod.
    #[inline]
    pub fn is_prod(self) -> bool {
        matches!(self, Self::Prod)
    }

    /// Get a [`str`] containing "dev", "staging", or "prod".
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }
}

impl FromStr for DeployEnv {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "dev" => Ok(Self::Dev),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            _ => bail!("Unrecognized deploy environment '{s}': must be in [\"dev\", \"staging\", \"prod\"]"),
        }
    }
}

/// Pricing and lifecycle tunables. Snapshotted onto every transaction / job
/// row at creation time, so changing them mid-flight never affects rows that
/// already exist.
#[derive(Clone, Debug)]
pub struct Tunables {
    /// Fiat value of a single coin.
    pub coin_unit: Amount,
    /// Fixed fee added to every transaction.
    pub fee: Amount,
    /// Upper bound on the per-transaction amount.
    pub amount_cap: Amount,
    /// How long a pending transaction stays payable.
    pub auth_window: Duration,
    /// Maximum delivery attempts per dispense job.
    pub attempt_ceiling: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            coin_unit: Amount::from_cents(25),
            fee: Amount::from_cents(50),
            amount_cap: Amount::from_cents(100_00),
            auth_window: Duration::from_secs(15 * 60),
            attempt_ceiling: 3,
        }
    }
}

/// Run the hopper coordinator daemon.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the SQLite database file (created if missing)
    #[argh(option, default = "String::from(\"hopper.sqlite3\")")]
    pub db: String,

    /// socket address the HTTP server binds
    #[argh(option, default = "\"127.0.0.1:8080\".parse().unwrap()")]
    pub listen: SocketAddr,

    /// deploy environment: "dev", "staging", or "prod"
    #[argh(option, default = "DeployEnv::Dev")]
    pub deploy_env: DeployEnv,

    /// base URL of the external proof verifier
    #[argh(option)]
    pub verifier_url: Option<String>,

    /// action id forwarded to the verifier with each proof
    #[argh(option, default = "String::from(\"hopper-payout\")")]
    pub verifier_action_id: String,

    /// accept every proof without calling the verifier. Dev/staging only;
    /// the coordinator refuses to start with this set in prod.
    #[argh(switch)]
    pub skip_verify: bool,

    /// payer deep-link URL template; must contain "{transaction_id}"
    #[argh(
        option,
        default = "String::from(\"https://pay.hopper.example/t/{transaction_id}\")"
    )]
    pub payer_url_template: String,

    /// fiat value of one coin, e.g. "0.25"
    #[argh(option, from_str_fn(parse_amount), default = "Amount::from_cents(25)")]
    pub coin_unit: Amount,

    /// fixed fee added to every transaction, e.g. "0.50"
    #[argh(option, from_str_fn(parse_amount), default = "Amount::from_cents(50)")]
    pub fee: Amount,

    /// maximum per-transaction amount, e.g. "100.00"
    #[argh(
        option,
        from_str_fn(parse_amount),
        default = "Amount::from_cents(100_00)"
    )]
    pub amount_cap: Amount,

    /// authorization window in seconds
    #[argh(option, default = "900")]
    pub auth_window_secs: u64,

    /// maximum delivery attempts per dispense job
    #[argh(option, default = "3")]
    pub attempt_ceiling: u32,

    /// janitor sweep period in seconds
    #[argh(option, default = "60")]
    pub sweep_interval_secs: u64,

    /// age after which an unreported in-progress job is considered stuck,
    /// in seconds
    #[argh(option, default = "120")]
    pub lease_max_age_secs: u64,
}

fn parse_amount(s: &str) -> Result<Amount, String> {
    let value = Decimal::from_str(s).map_err(|err| err.to_string())?;
    Amount::try_from_decimal(value).map_err(|err| err.to_string())
}

/// How `Pay` authorizes proofs.
#[derive(Clone, Debug)]
pub enum VerifierConfig {
    /// Call the external verifier service.
    Http { url: String, action_id: String },
    /// Short-circuit to always-accept. Refused outside dev/staging.
    AcceptAll,
}

/// Validated runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub db: String,
    pub listen: SocketAddr,
    pub deploy_env: DeployEnv,
    pub verifier: VerifierConfig,
    pub payer_url_template: String,
    pub tunables: Tunables,
    pub sweep_interval: Duration,
    pub lease_max_age: Duration,
}

impl Config {
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        let verifier = if args.skip_verify {
            // An always-accept path in prod is a misconfiguration, not a
            // convenience.
            ensure!(
                !args.deploy_env.is_prod(),
                "--skip-verify is not allowed in prod"
            );
            VerifierConfig::AcceptAll
        } else {
            let url = args
                .verifier_url
                .context("--verifier-url is required unless --skip-verify")?;
            VerifierConfig::Http {
                url,
                action_id: args.verifier_action_id,
            }
        };

        ensure!(
            args.payer_url_template.contains(TX_ID_TOKEN),
            "--payer-url-template must contain {TX_ID_TOKEN}"
        );
        ensure!(
            args.coin_unit.is_positive(),
            "--coin-unit must be positive"
        );
        ensure!(
            args.amount_cap.is_positive(),
            "--amount-cap must be positive"
        );
        ensure!(args.attempt_ceiling > 0, "--attempt-ceiling must be > 0");
        ensure!(args.auth_window_secs > 0, "--auth-window-secs must be > 0");

        Ok(Self {
            db: args.db,
            listen: args.listen,
            deploy_env: args.deploy_env,
            verifier,
            payer_url_template: args.payer_url_template,
            tunables: Tunables {
                coin_unit: args.coin_unit,
                fee: args.fee,
                amount_cap: args.amount_cap,
                auth_window: Duration::from_secs(args.auth_window_secs),
                attempt_ceiling: args.attempt_ceiling,
            },
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            lease_max_age: Duration::from_secs(args.lease_max_age_secs),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn base_args() -> Args {
        Args {
            db: "hopper.sqlite3".to_owned(),
            listen: "127.0.0.1:8080".parse().unwrap(),
            deploy_env: DeployEnv::Dev,
            verifier_url: Some("https://verifier.example".to_owned()),
            verifier_action_id: "hopper-payout".to_owned(),
            skip_verify: false,
            payer_url_template: "https://pay.example/t/{transaction_id}"
                .to_owned(),
            coin_unit: Amount::from_cents(25),
            fee: Amount::from_cents(50),
            amount_cap: Amount::from_cents(100_00),
            auth_window_secs: 900,
            attempt_ceiling: 3,
            sweep_interval_secs: 60,
            lease_max_age_secs: 120,
        }
    }

    #[test]
    fn skip_verify_refused_in_prod() {
        let mut args = base_args();
        args.skip_verify = true;
        args.deploy_env = DeployEnv::Prod;
        assert!(Config::from_args(args).is_err());

        let mut args = base_args();
        args.skip_verify = true;
        args.deploy_env = DeployEnv::Staging;
        assert!(Config::from_args(args).is_ok());
    }

    #[test]
    fn verifier_url_required_unless_skipping() {
        let mut args = base_args();
        args.verifier_url = None;
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn payer_url_template_must_contain_token() {
        let mut args = base_args();
        args.payer_url_template = "https://pay.example/t/".to_owned();
        assert!(Config::from_args(args).is_err());
    }
}
