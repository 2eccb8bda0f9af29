// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde_yaml::Value;

use super::PatchReport;
use crate::error::DeployError;

/// Annotation recording the prefix a document was renamed with.
pub const NAME_PREFIX_ANNOTATION: &str = "dynkube.io/name-prefix";

/// Label keys that conventionally carry a resource's own name.
const NAME_LABEL_KEYS: &[&str] = &["app", "name"];

/// Label maps reconciled after renaming.
const LABEL_PATHS: &[&[&str]] = &[
    &["metadata", "labels"],
    &["spec", "selector"],
    &["spec", "selector", "matchLabels"],
    &["spec", "template", "metadata", "labels"],
];

static PREFIX_RE: OnceLock<Regex> = OnceLock::new();

fn prefix_re() -> &'static Regex {
    PREFIX_RE.get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap())
}

/// A validated DNS-label style prefix for resource names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamePrefix(String);

impl NamePrefix {
    pub fn new(prefix: impl Into<String>) -> Result<Self, DeployError> {
        let prefix = prefix.into();
        if prefix_re().is_match(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(DeployError::InvalidNamePrefix(prefix))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn apply(&self, name: &str) -> String {
        format!("{}-{}", self.0, name)
    }
}

impl FromStr for NamePrefix {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for NamePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn document_name(doc: &Value) -> Option<&str> {
    doc.get("metadata")?.get("name")?.as_str()
}

fn lookup_mut<'a>(doc: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    path.iter().try_fold(doc, |node, key| node.get_mut(*key))
}

fn applied_prefix(doc: &Value) -> Option<&str> {
    doc.get("metadata")?
        .get("annotations")?
        .get(NAME_PREFIX_ANNOTATION)?
        .as_str()
}

fn mark_prefixed(doc: &mut Value, prefix: &NamePrefix) {
    let Some(Value::Mapping(metadata)) = doc.get_mut("metadata") else {
        return;
    };
    let annotations = metadata
        .entry(Value::from("annotations"))
        .or_insert_with(|| Value::Mapping(Default::default()));
    if let Value::Mapping(annotations) = annotations {
        annotations.insert(
            Value::from(NAME_PREFIX_ANNOTATION),
            Value::from(prefix.as_str()),
        );
    }
}

/// Rename every document to `<prefix>-<name>` and rewrite name labels that
/// pointed at an original name. Renamed documents are annotated with the
/// prefix and skipped on later runs, so running twice is the same as running
/// once. A name that merely starts with `<prefix>-` is still renamed.
pub(crate) fn apply_name_prefix(docs: &mut [Value], prefix: &NamePrefix, report: &mut PatchReport) {
    let is_done = |doc: &Value| applied_prefix(doc) == Some(prefix.as_str());
    let originals: HashSet<String> = docs
        .iter()
        .filter(|doc| !is_done(doc))
        .filter_map(document_name)
        .map(str::to_string)
        .collect();

    for doc in docs.iter_mut() {
        if is_done(doc) {
            continue;
        }
        if let Some(Value::String(name)) = lookup_mut(doc, &["metadata", "name"]) {
            *name = prefix.apply(name);
            report.renamed += 1;
            mark_prefixed(doc, prefix);
        }

        for path in LABEL_PATHS {
            let Some(Value::Mapping(labels)) = lookup_mut(doc, path) else {
                continue;
            };
            for key in NAME_LABEL_KEYS {
                if let Some(Value::String(value)) = labels.get_mut(*key) {
                    if originals.contains(value.as_str()) {
                        *value = prefix.apply(value);
                        report.relabeled += 1;
                    }
                }
            }
        }
    }
}
