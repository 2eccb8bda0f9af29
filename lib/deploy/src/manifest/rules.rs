// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Substitution rules applied to every manifest document.
//!
//! The walk is structural: a rule fires on a mapping key (`image`, `args`,
//! `command`, `env`, `model`) wherever it appears in the tree, so the same
//! rules cover plain Deployments and the nested service specs of a
//! `DynamoGraphDeployment`.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_yaml::Value;

use super::prefix::NamePrefix;

/// Image repository names that identify a Dynamo runtime container.
pub const KNOWN_RUNTIMES: &[&str] = &[
    "vllm-runtime",
    "sglang-runtime",
    "tensorrtllm-runtime",
    "vllm",
    "sglang",
    "trtllm",
];

/// Command-line flags whose value is the model identifier.
pub const MODEL_FLAGS: &[&str] = &["--model", "--model-path", "--served-model-name"];

/// Container env vars whose value is the model identifier.
pub const MODEL_ENV_NAMES: &[&str] = &["MODEL", "MODEL_NAME", "MODEL_PATH"];

static SHELL_FLAG_RE: OnceLock<Regex> = OnceLock::new();

fn shell_flag_re() -> &'static Regex {
    SHELL_FLAG_RE.get_or_init(|| {
        Regex::new(
            r#"(^|\s)(--model|--model-path|--served-model-name)(=|\s+)("[^"]*"|'[^']*'|[^\s"';&|]+)"#,
        )
        .unwrap()
    })
}

/// Replacement for runtime image references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOverride {
    /// A complete reference (`nvcr.io/.../vllm-runtime:0.7.0`) replacing the whole value.
    Reference(String),
    /// A bare tag (`0.7.0`) replacing only the tag of the existing reference.
    Tag(String),
}

impl ImageOverride {
    /// Classify a user supplied image. Anything with a registry path, digest
    /// or explicit tag separator is a full reference.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if value.contains(['/', '@', ':']) {
            Some(Self::Reference(value.to_string()))
        } else {
            Some(Self::Tag(value.to_string()))
        }
    }

    pub fn apply(&self, current: &str) -> String {
        match self {
            Self::Reference(reference) => reference.clone(),
            Self::Tag(tag) => format!("{}:{}", image_repository(current), tag),
        }
    }
}

/// Repository part of an image reference, with tag and digest removed.
/// A port in the registry host (`host:5000/repo`) is not mistaken for a tag.
pub fn image_repository(image: &str) -> &str {
    let without_digest = image.split_once('@').map_or(image, |(repo, _)| repo);
    let last_segment = without_digest.rfind('/').map_or(0, |idx| idx + 1);
    match without_digest[last_segment..].rfind(':') {
        Some(colon) => &without_digest[..last_segment + colon],
        None => without_digest,
    }
}

pub fn is_runtime_image(image: &str) -> bool {
    let repository = image_repository(image);
    let name = repository.rsplit('/').next().unwrap_or(repository);
    KNOWN_RUNTIMES.contains(&name)
}

/// What to substitute. Every field is optional; an empty rule set leaves the
/// manifest untouched.
#[derive(Debug, Clone, Default)]
pub struct PatchRules {
    pub model: Option<String>,
    pub image: Option<ImageOverride>,
    pub name_prefix: Option<NamePrefix>,
}

impl PatchRules {
    pub fn is_empty(&self) -> bool {
        self.model.is_none() && self.image.is_none() && self.name_prefix.is_none()
    }
}

/// Per-rule counters collected while patching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub images: usize,
    pub flags: usize,
    pub env_vars: usize,
    pub model_keys: usize,
    pub renamed: usize,
    pub relabeled: usize,
    pub env_from_secret: usize,
}

impl PatchReport {
    /// Number of places that now carry the target model.
    pub fn model_fields(&self) -> usize {
        self.flags + self.env_vars + self.model_keys
    }
}

pub(crate) fn apply_rules(node: &mut Value, rules: &PatchRules, report: &mut PatchReport) {
    match node {
        Value::Mapping(map) => {
            for (key, value) in map.iter_mut() {
                if let Some(key) = key.as_str() {
                    patch_entry(key, value, rules, report);
                }
                apply_rules(value, rules, report);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                apply_rules(item, rules, report);
            }
        }
        Value::Tagged(tagged) => apply_rules(&mut tagged.value, rules, report),
        _ => {}
    }
}

fn patch_entry(key: &str, value: &mut Value, rules: &PatchRules, report: &mut PatchReport) {
    match (key, value) {
        ("image", Value::String(image)) => {
            if let Some(image_override) = &rules.image {
                if is_runtime_image(image) {
                    let replacement = image_override.apply(image);
                    tracing::debug!(from = %image, to = %replacement, "patching image");
                    *image = replacement;
                    report.images += 1;
                }
            }
        }
        ("args" | "command", Value::Sequence(items)) => {
            if let Some(model) = &rules.model {
                report.flags += patch_flag_list(items, model);
            }
        }
        ("args" | "command", Value::String(script)) => {
            if let Some(model) = &rules.model {
                report.flags += patch_flag_string(script, model);
            }
        }
        ("env", Value::Sequence(items)) => {
            if let Some(model) = &rules.model {
                report.env_vars += patch_env_list(items, model);
            }
        }
        ("model", Value::String(current)) => {
            if let Some(model) = &rules.model {
                *current = model.clone();
                report.model_keys += 1;
            }
        }
        _ => {}
    }
}

fn inline_flag(arg: &str) -> Option<&'static str> {
    MODEL_FLAGS.iter().copied().find(|flag| {
        arg.strip_prefix(flag)
            .is_some_and(|rest| rest.starts_with('='))
    })
}

/// Patch `--flag VALUE`, `--flag=VALUE` and shell strings inside an argv list.
fn patch_flag_list(items: &mut [Value], model: &str) -> usize {
    let mut patched = 0;
    let mut idx = 0;
    while idx < items.len() {
        let Some(item) = items[idx].as_str() else {
            idx += 1;
            continue;
        };

        if MODEL_FLAGS.contains(&item) {
            if let Some(Value::String(next)) = items.get_mut(idx + 1) {
                *next = model.to_string();
                patched += 1;
                idx += 2;
                continue;
            }
        } else if let Some(flag) = inline_flag(item) {
            items[idx] = Value::String(format!("{flag}={model}"));
            patched += 1;
        } else if item.contains(char::is_whitespace) {
            if let Value::String(script) = &mut items[idx] {
                patched += patch_flag_string(script, model);
            }
        }
        idx += 1;
    }
    patched
}

/// Patch model flags embedded in a shell command string.
fn patch_flag_string(script: &mut String, model: &str) -> usize {
    let mut patched = 0;
    let replaced = shell_flag_re().replace_all(script.as_str(), |caps: &Captures| {
        patched += 1;
        format!("{}{}{}{}", &caps[1], &caps[2], &caps[3], model)
    });
    if patched > 0 {
        *script = replaced.into_owned();
    }
    patched
}

fn patch_env_list(items: &mut [Value], model: &str) -> usize {
    let mut patched = 0;
    for entry in items.iter_mut().filter_map(Value::as_mapping_mut) {
        let is_model_var = entry
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| MODEL_ENV_NAMES.contains(&name));
        if is_model_var && !entry.contains_key("valueFrom") {
            entry.insert(Value::from("value"), Value::from(model));
            patched += 1;
        }
    }
    patched
}
