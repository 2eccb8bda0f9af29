// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Run several fixed conversations against the frontend with bounded
//! concurrency and collect their transcripts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context as _;
use dynkube_runtime::CancellationToken;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chat::ChatSession;
use crate::client::{ClientError, OpenAiClient};

pub const FIXED_TURNS: [&str; 3] = [
    "Name one benefit of disaggregated prefill and decode.",
    "Explain that benefit in a single sentence.",
    "Summarize our conversation in five words.",
];

#[derive(Debug, Clone)]
pub struct ConversationOptions {
    pub num_convos: usize,
    /// Maximum number of conversations in flight
    pub concurrency: usize,
    pub model: String,
    /// Where transcripts are written. A temporary directory when unset.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Transcript {
    pub id: usize,
    pub path: PathBuf,
    pub text: String,
    pub error: Option<String>,
}

impl Transcript {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug)]
pub struct MultiChatReport {
    /// Sorted by conversation id
    pub transcripts: Vec<Transcript>,
    pub max_in_flight: usize,
    // Keeps a temporary output directory alive until the report is dropped.
    _output: Option<TempDir>,
}

impl MultiChatReport {
    pub fn failed(&self) -> usize {
        self.transcripts.iter().filter(|t| t.failed()).count()
    }

    /// Directory the transcripts were written to.
    pub fn output_dir(&self) -> Option<&Path> {
        self.transcripts.first().and_then(|t| t.path.parent())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for transcript in &self.transcripts {
            out.push_str(&format!("===== conversation {} =====\n", transcript.id));
            out.push_str(&transcript.text);
            if let Some(err) = &transcript.error {
                out.push_str(&format!("ERROR: {err}\n"));
            }
        }
        out
    }
}

/// Tracks how many conversations hold a permit.
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn converse(
    id: usize,
    client: OpenAiClient,
    model: String,
    dir: PathBuf,
    cancel: CancellationToken,
) -> Transcript {
    let mut session = ChatSession::new(client, model);
    let mut text = String::new();
    let mut error = None;

    for prompt in FIXED_TURNS {
        if cancel.is_cancelled() {
            error = Some(ClientError::Cancelled.to_string());
            break;
        }
        text.push_str(&format!("User: {prompt}\n"));
        match session.send(prompt).await {
            Ok(turn) => {
                text.push_str(&format!("Assistant: {}\n\n", turn.answer));
            }
            Err(err) => {
                tracing::warn!(conversation = id, %err, "conversation failed");
                error = Some(err.to_string());
                break;
            }
        }
    }

    let path = dir.join(format!("conversation-{id}.txt"));
    if let Err(err) = tokio::fs::write(&path, &text).await {
        tracing::warn!(path = %path.display(), %err, "could not write transcript");
    }
    Transcript {
        id,
        path,
        text,
        error,
    }
}

pub async fn run_conversations(
    client: &OpenAiClient,
    options: &ConversationOptions,
    cancel: &CancellationToken,
) -> anyhow::Result<MultiChatReport> {
    anyhow::ensure!(options.concurrency > 0, "concurrency must be at least 1");

    let (dir, temp) = match &options.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            (dir.clone(), None)
        }
        None => {
            let temp = tempfile::Builder::new()
                .prefix("dynkube-chat-")
                .tempdir()
                .context("creating transcript directory")?;
            (temp.path().to_path_buf(), Some(temp))
        }
    };
    tracing::info!(
        num_convos = options.num_convos,
        concurrency = options.concurrency,
        dir = %dir.display(),
        "Starting conversations"
    );

    let semaphore = Arc::new(Semaphore::new(options.concurrency));
    let in_flight = Arc::new(InFlight::default());
    let mut tasks = JoinSet::new();

    for id in 1..=options.num_convos {
        let semaphore = semaphore.clone();
        let in_flight = in_flight.clone();
        let client = client.clone();
        let model = options.model.clone();
        let dir = dir.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            // Held for the whole conversation
            let _permit = semaphore
                .acquire_owned()
                .await
                .context("semaphore closed")?;
            in_flight.enter();
            let transcript = converse(id, client, model, dir, cancel).await;
            in_flight.exit();
            anyhow::Ok(transcript)
        });
    }

    let mut transcripts = Vec::with_capacity(options.num_convos);
    while let Some(joined) = tasks.join_next().await {
        transcripts.push(joined.context("conversation task panicked")??);
    }
    transcripts.sort_by_key(|t| t.id);

    Ok(MultiChatReport {
        transcripts,
        max_in_flight: in_flight.max.load(Ordering::SeqCst),
        _output: temp,
    })
}
