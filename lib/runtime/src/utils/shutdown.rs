// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use tokio_util::sync::CancellationToken;

/// Root token cancelled on the first Ctrl-C.
///
/// Long waits (watches, discovery polls, the chat loop) observe a child of this
/// token. A second Ctrl-C exits the process immediately.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::debug!("Unable to listen for Ctrl-C: {e}");
            return;
        }
        tracing::warn!("Ctrl-C received, cancelling. Press again to exit now");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_starts_live_and_children_follow() {
        let token = cancel_on_ctrl_c();
        let child = token.child_token();
        assert!(!child.is_cancelled());
        token.cancel();
        assert!(child.is_cancelled());
    }
}
