// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Environment variable helpers.
//!
//! Every tunable of the deployment toolkit can be overridden from the
//! environment. Values that look like booleans go through [`is_truthy`] /
//! [`is_falsey`], everything else through [`env_parse`]. Empty variables are
//! treated as unset so that `FOO= dynkube ...` falls back to the default.

use std::str::FromStr;

/// Truthy values: "1", "true", "on", "yes" (case-insensitive)
pub fn is_truthy(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

/// Falsey values: "0", "false", "off", "no" (case-insensitive)
pub fn is_falsey(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "0" | "false" | "off" | "no")
}

/// Strict boolean parse. Anything that is neither truthy nor falsey is an error.
pub fn parse_bool(val: &str) -> anyhow::Result<bool> {
    if is_truthy(val) {
        Ok(true)
    } else if is_falsey(val) {
        Ok(false)
    } else {
        anyhow::bail!(
            "Invalid boolean value: '{}'. Expected one of: true/false, 1/0, on/off, yes/no",
            val
        )
    }
}

/// Value of `env` if it is set and not blank.
pub fn env_non_empty(env: &str) -> Option<String> {
    match std::env::var(env) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

/// `false` when unset, blank or not truthy.
pub fn env_is_truthy(env: &str) -> bool {
    env_non_empty(env).is_some_and(|v| is_truthy(&v))
}

/// `false` when unset, blank or not falsey.
pub fn env_is_falsey(env: &str) -> bool {
    env_non_empty(env).is_some_and(|v| is_falsey(&v))
}

/// Parse an environment variable as a boolean.
///
/// * `Ok(None)` - unset or blank
/// * `Ok(Some(_))` - a recognised boolean
/// * `Err(_)` - set to something else
pub fn env_parse_bool(env: &str) -> anyhow::Result<Option<bool>> {
    match env_non_empty(env) {
        Some(val) => parse_bool(&val)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{env}: {e}")),
        None => Ok(None),
    }
}

/// Parse an environment variable with [`FromStr`], `Ok(None)` when unset or blank.
pub fn env_parse<T>(env: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_non_empty(env) {
        Some(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value '{val}' for {env}: {e}")),
        None => Ok(None),
    }
}

/// Like [`env_parse`] but falls back to `default` when unset.
pub fn env_parse_or<T>(env: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(env_parse(env)?.unwrap_or(default))
}
