// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! troupe entry point.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    troupe::cli::run().await
}
