//! Ledger configuration.
//!
//! Both knobs default to the behavior observed in the deployed tip jar:
//! anyone may trigger a withdrawal, and withdrawing an empty jar is an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tipjar_auth::WithdrawAccess;
use tipjar_ledger::{EmptyWithdrawal, LedgerPolicy};

/// `anyone` | `owner`
pub const WITHDRAW_ACCESS_VAR: &str = "TIPJAR_WITHDRAW_ACCESS";

/// `reject` | `noop`
pub const EMPTY_WITHDRAWAL_VAR: &str = "TIPJAR_EMPTY_WITHDRAWAL";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var} (expected one of: {expected})")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub withdraw_access: WithdrawAccess,
    pub empty_withdrawal: EmptyWithdrawal,
}

impl LedgerConfig {
    /// Read the configuration from the process environment.
    ///
    /// Unset or blank variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LedgerConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = non_blank(lookup(WITHDRAW_ACCESS_VAR)) {
            config.withdraw_access = parse_withdraw_access(&raw)?;
        }
        if let Some(raw) = non_blank(lookup(EMPTY_WITHDRAWAL_VAR)) {
            config.empty_withdrawal = parse_empty_withdrawal(&raw)?;
        }

        Ok(config)
    }

    pub fn policy(&self) -> LedgerPolicy {
        LedgerPolicy::new(self.withdraw_access, self.empty_withdrawal)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_ascii_lowercase()).filter(|v| !v.is_empty())
}

fn parse_withdraw_access(raw: &str) -> Result<WithdrawAccess, ConfigError> {
    match raw {
        "anyone" | "any" => Ok(WithdrawAccess::Anyone),
        "owner" | "owner_only" => Ok(WithdrawAccess::OwnerOnly),
        _ => Err(ConfigError::InvalidValue {
            var: WITHDRAW_ACCESS_VAR,
            value: raw.to_string(),
            expected: "anyone, owner",
        }),
    }
}

fn parse_empty_withdrawal(raw: &str) -> Result<EmptyWithdrawal, ConfigError> {
    match raw {
        "reject" => Ok(EmptyWithdrawal::Reject),
        "noop" | "no_op" => Ok(EmptyWithdrawal::NoOp),
        _ => Err(ConfigError::InvalidValue {
            var: EMPTY_WITHDRAWAL_VAR,
            value: raw.to_string(),
            expected: "reject, noop",
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.withdraw_access, WithdrawAccess::Anyone);
        assert_eq!(config.empty_withdrawal, EmptyWithdrawal::Reject);
    }

    #[test]
    fn reads_both_variables_case_insensitively() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (WITHDRAW_ACCESS_VAR, " Owner "),
            (EMPTY_WITHDRAWAL_VAR, "NOOP"),
        ]))
        .unwrap();

        assert_eq!(config.withdraw_access, WithdrawAccess::OwnerOnly);
        assert_eq!(config.empty_withdrawal, EmptyWithdrawal::NoOp);
        assert_eq!(
            config.policy(),
            LedgerPolicy::new(WithdrawAccess::OwnerOnly, EmptyWithdrawal::NoOp)
        );
    }

    #[test]
    fn blank_value_keeps_default() {
        let config = LedgerConfig::from_lookup(lookup(&[(WITHDRAW_ACCESS_VAR, "  ")])).unwrap();
        assert_eq!(config.withdraw_access, WithdrawAccess::Anyone);
    }

    #[test]
    fn unknown_value_is_reported() {
        let err = LedgerConfig::from_lookup(lookup(&[(EMPTY_WITHDRAWAL_VAR, "ignore")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: EMPTY_WITHDRAWAL_VAR,
                value: "ignore".to_string(),
                expected: "reject, noop",
            }
        );
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let config: LedgerConfig = serde_json::from_str(r#"{"withdraw_access":"owner_only"}"#).unwrap();
        assert_eq!(config.withdraw_access, WithdrawAccess::OwnerOnly);
        assert_eq!(config.empty_withdrawal, EmptyWithdrawal::Reject);
    }
}
