//! Relay configuration, read once from the environment at start-up.

use crate::application::ledger::MatchPolicy;
use crate::application::notifier::EmailTemplate;
use crate::application::scheduler::HourWindow;
use crate::error::{RelayError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// OAuth client and endpoints of the accounting API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingConfig {
    pub authority: String,
    pub client_id: String,
    pub client_secret: String,
    pub resource: String,
    pub sales_invoice_endpoint: String,
    pub credit_memo_endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub smtp: SmtpConfig,
    pub template: EmailTemplate,
}

/// A section that is only required by some commands. `Err` names the first missing variable.
type Section<T> = std::result::Result<T, String>;

#[derive(Debug, Clone)]
pub struct Config {
    /// Store directory holding one sub-directory per branch.
    pub inbox_root: String,
    /// Local mount of the shared store.
    pub store_root: PathBuf,
    pub branches: Vec<String>,
    pub target_month: u32,
    pub queue_dir: PathBuf,
    pub queue_name: String,
    /// How long a received message may stay unacknowledged before another
    /// consumer may take it.
    pub queue_lease_timeout: Duration,
    pub ledger_match: MatchPolicy,
    /// 0 disables the retry cap.
    pub retry_max_attempts: u32,
    pub branch_timeout: Duration,
    pub scan_interval: Duration,
    pub scan_hours: HourWindow,
    pub notify_interval: Duration,
    pub retry_hour: u32,
    pub worker_poll: Duration,
    accounting: Section<AccountingConfig>,
    notification: Section<NotificationConfig>,
}

struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn require(&self, name: &str) -> Result<String> {
        self.get(name)
            .ok_or_else(|| RelayError::Config(format!("{name} must be set")))
    }

    fn parse_or<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| RelayError::Config(format!("{name} has an invalid value '{raw}'"))),
        }
    }

    fn secs_or(&self, name: &str, default: u64) -> Result<Duration> {
        let secs: u64 = self.parse_or(name, default)?;
        if secs == 0 {
            return Err(RelayError::Config(format!("{name} must be greater than zero")));
        }
        Ok(Duration::from_secs(secs))
    }

    fn section(&self, name: &str) -> Section<String> {
        self.get(name).ok_or_else(|| name.to_string())
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };
        let inbox_root = vars.require("INBOX_ROOT")?;
        let store_root = PathBuf::from(vars.require("STORE_ROOT")?);

        let branches: Vec<String> = vars
            .require("BRANCHES")?
            .split(',')
            .map(|branch| branch.trim().to_string())
            .filter(|branch| !branch.is_empty())
            .collect();
        if branches.is_empty() {
            return Err(RelayError::Config(
                "BRANCHES must name at least one branch".to_string(),
            ));
        }

        let target_month: u32 = vars
            .require("TARGET_MONTH")?
            .parse()
            .map_err(|_| RelayError::Config("TARGET_MONTH must be a number".to_string()))?;
        if !(1..=12).contains(&target_month) {
            return Err(RelayError::Config(format!(
                "TARGET_MONTH must be between 1 and 12, got {target_month}"
            )));
        }

        let retry_hour: u32 = vars.parse_or("RETRY_HOUR", 10)?;
        if retry_hour > 23 {
            return Err(RelayError::Config(format!(
                "RETRY_HOUR must be between 0 and 23, got {retry_hour}"
            )));
        }

        Ok(Self {
            inbox_root,
            store_root,
            branches,
            target_month,
            queue_dir: PathBuf::from(vars.get("QUEUE_DIR").unwrap_or_else(|| "./queue".to_string())),
            queue_name: vars
                .get("QUEUE_NAME")
                .unwrap_or_else(|| "order-details".to_string()),
            queue_lease_timeout: vars.secs_or("QUEUE_LEASE_TIMEOUT_SECS", 600)?,
            ledger_match: vars.parse_or("LEDGER_MATCH", MatchPolicy::default())?,
            retry_max_attempts: vars.parse_or("RETRY_MAX_ATTEMPTS", 0)?,
            branch_timeout: vars.secs_or("BRANCH_TIMEOUT_SECS", 300)?,
            scan_interval: vars.secs_or("SCAN_INTERVAL_SECS", 300)?,
            scan_hours: vars.parse_or("SCAN_HOURS", HourWindow { start: 10, end: 21 })?,
            notify_interval: vars.secs_or("NOTIFY_INTERVAL_SECS", 3600)?,
            retry_hour,
            worker_poll: vars.secs_or("WORKER_POLL_SECS", 5)?,
            accounting: Self::accounting_section(&vars),
            notification: Self::notification_section(&vars)?,
        })
    }

    fn accounting_section<F: Fn(&str) -> Option<String>>(
        vars: &Vars<F>,
    ) -> Section<AccountingConfig> {
        Ok(AccountingConfig {
            authority: vars.section("BC_AUTHORITY")?,
            client_id: vars.section("BC_CLIENT_ID")?,
            client_secret: vars.section("BC_CLIENT_SECRET")?,
            resource: vars.section("BC_RESOURCE")?,
            sales_invoice_endpoint: vars.section("BC_CREATE_SI_ENDPOINT")?,
            credit_memo_endpoint: vars.section("BC_CREATE_CM_ENDPOINT")?,
        })
    }

    /// A malformed `SMTP_PORT` is always an error; missing values only matter to `notify`.
    fn notification_section<F: Fn(&str) -> Option<String>>(
        vars: &Vars<F>,
    ) -> Result<Section<NotificationConfig>> {
        let port = vars.parse_or("SMTP_PORT", 587u16)?;
        let build = || -> Section<NotificationConfig> {
            let username = vars.section("SMTP_USERNAME")?;
            Ok(NotificationConfig {
                smtp: SmtpConfig {
                    host: vars.section("SMTP_HOST")?,
                    port,
                    password: vars.section("SMTP_PASSWORD")?,
                    from: vars.get("EMAIL_FROM").unwrap_or_else(|| username.clone()),
                    to: vars.section("EMAIL_TO")?,
                    username,
                },
                template: EmailTemplate {
                    subject: vars.section("EMAIL_SUBJECT")?,
                    body: vars.section("EMAIL_BODY")?,
                },
            })
        };
        Ok(build())
    }

    pub fn accounting(&self) -> Result<&AccountingConfig> {
        self.accounting
            .as_ref()
            .map_err(|name| RelayError::Config(format!("{name} must be set to submit orders")))
    }

    pub fn notification(&self) -> Result<&NotificationConfig> {
        self.notification
            .as_ref()
            .map_err(|name| RelayError::Config(format!("{name} must be set to send notifications")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("INBOX_ROOT", "/inbox"),
            ("STORE_ROOT", "/mnt/store"),
            ("BRANCHES", "BR01, br02,"),
            ("TARGET_MONTH", "3"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config> {
        Config::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base()).unwrap();
        assert_eq!(config.branches, vec!["BR01", "br02"]);
        assert_eq!(config.target_month, 3);
        assert_eq!(config.queue_name, "order-details");
        assert_eq!(config.queue_lease_timeout, Duration::from_secs(600));
        assert_eq!(config.ledger_match, MatchPolicy::Contains);
        assert_eq!(config.retry_max_attempts, 0);
        assert_eq!(config.scan_interval, Duration::from_secs(300));
        assert_eq!(config.scan_hours, HourWindow { start: 10, end: 21 });
        assert_eq!(config.retry_hour, 10);
        assert_eq!(config.worker_poll, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_required_value_is_named() {
        let mut vars = base();
        vars.remove("INBOX_ROOT");
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("INBOX_ROOT"));
    }

    #[test]
    fn test_target_month_range() {
        let mut vars = base();
        vars.insert("TARGET_MONTH", "13");
        assert!(matches!(load(&vars), Err(RelayError::Config(_))));
        vars.insert("TARGET_MONTH", "march");
        assert!(matches!(load(&vars), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_optional_sections() {
        let config = load(&base()).unwrap();
        let err = config.accounting().unwrap_err();
        assert!(err.to_string().contains("BC_AUTHORITY"));
        assert!(config.notification().is_err());

        let mut vars = base();
        vars.extend([
            ("BC_AUTHORITY", "https://login.example.com/t"),
            ("BC_CLIENT_ID", "id"),
            ("BC_CLIENT_SECRET", "secret"),
            ("BC_RESOURCE", "https://api.example.com"),
            ("BC_CREATE_SI_ENDPOINT", "https://api.example.com/si"),
            ("BC_CREATE_CM_ENDPOINT", "https://api.example.com/cm"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "relay@example.com"),
            ("SMTP_PASSWORD", "pw"),
            ("EMAIL_TO", "ops@example.com"),
            ("EMAIL_SUBJECT", "Failed transactions"),
            ("EMAIL_BODY", "See attached."),
            ("LEDGER_MATCH", "exact"),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.accounting().unwrap().client_id, "id");
        let notification = config.notification().unwrap();
        assert_eq!(notification.smtp.port, 587);
        assert_eq!(notification.smtp.from, "relay@example.com");
        assert_eq!(config.ledger_match, MatchPolicy::Exact);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let mut vars = base();
        vars.insert("SMTP_PORT", "smtp");
        assert!(load(&vars).is_err());

        let mut vars = base();
        vars.insert("SCAN_INTERVAL_SECS", "0");
        assert!(load(&vars).is_err());

        let mut vars = base();
        vars.insert("LEDGER_MATCH", "fuzzy");
        assert!(load(&vars).is_err());
    }
}
