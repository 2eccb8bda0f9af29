// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

pub use tokio::time::{Duration, Instant};

pub mod command;
pub mod shutdown;

pub use command::{
    CommandOutput, CommandRunner, CommandSpec, DryRunRunner, TokioCommandRunner, find_in_path,
};
pub use shutdown::cancel_on_ctrl_c;
