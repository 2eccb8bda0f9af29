// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;

use dynkube_run::{Flags, parse_exit_code};
use dynkube_runtime::logging;
use dynkube_runtime::utils::cancel_on_ctrl_c;

fn main() -> anyhow::Result<()> {
    logging::init();
    let flags = match Flags::try_parse() {
        Ok(flags) => flags,
        Err(err) => {
            // help and version go to stdout, usage errors to stderr
            let _ = err.print();
            std::process::exit(parse_exit_code(&err));
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async move {
        let cancel = cancel_on_ctrl_c();
        dynkube_run::run(flags, cancel).await
    });

    if let Err(err) = result {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
    Ok(())
}
