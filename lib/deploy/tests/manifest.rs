// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use dynkube_deploy::manifest::{
    ImageOverride, Manifest, NamePrefix, PatchRules, patch_manifest,
};

const MODEL: &str = "meta-llama/Llama-3.2-1B-Instruct";

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/vllm_agg.yaml")
}

fn rules() -> PatchRules {
    PatchRules {
        model: Some(MODEL.to_string()),
        image: ImageOverride::parse("0.7.0"),
        name_prefix: Some(NamePrefix::new("team-a").unwrap()),
    }
}

#[test]
fn patches_every_rule_and_writes_valid_yaml() {
    let patched = patch_manifest(fixture(), &rules(), Some("hf-token-secret")).unwrap();
    let report = patched.report().clone();

    assert_eq!(report.images, 3);
    // one shell string, one list pair, one inline flag
    assert_eq!(report.flags, 3);
    assert_eq!(report.env_vars, 1);
    assert_eq!(report.renamed, 3);
    assert_eq!(report.env_from_secret, 2);
    assert!(report.model_fields() > 0);

    let written = std::fs::read_to_string(patched.path()).unwrap();
    assert!(written.contains(MODEL));
    assert!(!written.contains("Qwen/Qwen3-0.6B"));
    assert!(!written.contains(":0.6.1"));

    let reparsed = Manifest::parse(&written).unwrap();
    assert_eq!(reparsed.documents().len(), 3);
    assert_eq!(reparsed.names(), ["team-a-vllm-agg", "team-a-bench", "team-a-bench"]);
    assert_eq!(reparsed.graph().unwrap().name, "team-a-vllm-agg");
}

#[test]
fn temp_file_is_removed_on_drop() {
    let patched = patch_manifest(fixture(), &PatchRules::default(), None).unwrap();
    let path = patched.path().to_path_buf();
    assert!(path.exists());
    drop(patched);
    assert!(!path.exists());
}

#[test]
fn patching_twice_matches_patching_once() {
    let mut once = Manifest::load(fixture()).unwrap();
    once.patch(&rules());
    let mut twice = once.clone();
    let second = twice.patch(&rules());
    assert_eq!(once, twice);
    assert_eq!(second.renamed, 0);
}

#[test]
fn candidate_names_cover_documents_and_services() {
    let manifest = Manifest::load(fixture()).unwrap();
    let names: Vec<String> = manifest.candidate_names().into_iter().collect();
    assert_eq!(names, ["bench", "frontend", "vllm-agg", "vllmdecodeworker"]);
}

#[test]
fn missing_template_is_an_error() {
    let err = Manifest::load("/nonexistent/dynkube.yaml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/dynkube.yaml"));
}
