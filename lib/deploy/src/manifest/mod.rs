// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Typed multi-document manifest model and patcher.
//!
//! A template is parsed into an ordered list of YAML documents, rewritten in
//! place by [`PatchRules`], and serialized back out. The output is valid YAML
//! by construction and the [`PatchReport`] says which rules actually fired.

mod graph;
mod prefix;
mod rules;

pub use graph::GraphInfo;
pub use prefix::{NAME_PREFIX_ANNOTATION, NamePrefix};
pub use rules::{
    ImageOverride, KNOWN_RUNTIMES, MODEL_ENV_NAMES, MODEL_FLAGS, PatchReport, PatchRules,
    image_repository, is_runtime_image,
};

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use serde_yaml::Value;
use tempfile::NamedTempFile;

use crate::error::{DeployError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    documents: Vec<Value>,
}

impl Manifest {
    /// Parse a multi-document YAML stream. Empty documents are dropped;
    /// anything else that is not a mapping is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let mut documents = Vec::new();
        for (index, de) in serde_yaml::Deserializer::from_str(text).enumerate() {
            match Value::deserialize(de)? {
                Value::Null => continue,
                doc @ Value::Mapping(_) => documents.push(doc),
                _ => {
                    return Err(DeployError::ManifestShape {
                        index,
                        reason: "expected a mapping at the top level".to_string(),
                    });
                }
            }
        }
        Ok(Self { documents })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DeployError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn documents(&self) -> &[Value] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Value> {
        self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for (idx, doc) in self.documents.iter().enumerate() {
            if idx > 0 {
                out.push_str("---\n");
            }
            out.push_str(&serde_yaml::to_string(doc)?);
        }
        Ok(out)
    }

    /// `metadata.name` of every document, in order.
    pub fn names(&self) -> Vec<&str> {
        self.documents
            .iter()
            .filter_map(prefix::document_name)
            .collect()
    }

    /// The first `DynamoGraphDeployment` in the stream, if any.
    pub fn graph(&self) -> Option<GraphInfo> {
        self.documents.iter().find_map(GraphInfo::from_document)
    }

    /// Lowercased document names and graph service names, used to recognise
    /// cluster resources that came from this manifest.
    pub fn candidate_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> =
            self.names().into_iter().map(str::to_lowercase).collect();
        for graph in self.documents.iter().filter_map(GraphInfo::from_document) {
            names.extend(graph.services.iter().map(|svc| svc.to_lowercase()));
        }
        names
    }

    /// Apply every rule to every document.
    pub fn patch(&mut self, rules: &PatchRules) -> PatchReport {
        let mut report = PatchReport::default();
        for doc in self.documents.iter_mut() {
            rules::apply_rules(doc, rules, &mut report);
        }
        if let Some(prefix) = &rules.name_prefix {
            prefix::apply_name_prefix(&mut self.documents, prefix, &mut report);
        }
        report
    }

    /// Set `envFromSecret` on the known services of every graph document.
    pub fn inject_env_from_secret(&mut self, secret: &str) -> usize {
        self.documents
            .iter_mut()
            .filter(|doc| GraphInfo::from_document(doc).is_some())
            .map(|doc| graph::inject_env_from_secret(doc, secret))
            .sum()
    }

    /// Serialize into a temporary file owned by the returned value.
    pub fn into_temp_file(self, report: PatchReport) -> Result<PatchedManifest> {
        let yaml = self.to_yaml()?;
        let io_err = |source| DeployError::ManifestIo {
            path: std::env::temp_dir(),
            source,
        };
        let mut file = tempfile::Builder::new()
            .prefix("dynkube-")
            .suffix(".yaml")
            .tempfile()
            .map_err(io_err)?;
        file.write_all(yaml.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        Ok(PatchedManifest {
            manifest: self,
            report,
            file,
        })
    }
}

impl FromStr for Manifest {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A patched manifest and the temporary file it was written to. The file is
/// removed when this value is dropped.
#[derive(Debug)]
pub struct PatchedManifest {
    manifest: Manifest,
    report: PatchReport,
    file: NamedTempFile,
}

impl PatchedManifest {
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn report(&self) -> &PatchReport {
        &self.report
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Keep the file on disk past the lifetime of this value.
    pub fn persist(self) -> Result<PathBuf> {
        let (_, path) = self.file.keep().map_err(|err| DeployError::ManifestIo {
            path: err.file.path().to_path_buf(),
            source: err.error,
        })?;
        Ok(path)
    }
}

/// Load `template`, apply `rules` and optionally wire graph services to an
/// HF token secret, then write the result to a temporary file.
pub fn patch_manifest(
    template: impl AsRef<Path>,
    rules: &PatchRules,
    env_secret: Option<&str>,
) -> Result<PatchedManifest> {
    let template = template.as_ref();
    let mut manifest = Manifest::load(template)?;
    if manifest.is_empty() {
        tracing::warn!(path = %template.display(), "manifest contains no documents");
    }

    let mut report = manifest.patch(rules);
    if let Some(secret) = env_secret {
        report.env_from_secret = manifest.inject_env_from_secret(secret);
    }

    if let Some(model) = &rules.model {
        if report.model_fields() == 0 {
            tracing::warn!(
                model = %model,
                path = %template.display(),
                "no model field was patched; the manifest may not serve the requested model"
            );
        }
    }
    tracing::info!(
        images = report.images,
        flags = report.flags,
        env = report.env_vars,
        model_keys = report.model_keys,
        renamed = report.renamed,
        "patched manifest"
    );

    manifest.into_temp_file(report)
}
