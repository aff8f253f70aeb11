//! Build automation tasks for trawlnet
//!
//! This tool provides various automation tasks for the trawlnet project,
//! including:
//! - Generating CLI documentation from source code
//! - Future build-related tasks

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for trawlnet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate CLI documentation in MDX format
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs/content/en")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<trawlnet_cli::Cli>();

    let mdx_content = format!(
        r#"---
title: CLI Reference
description: Complete command reference for the trawlnet CLI
---

# trawlnet CLI Reference

This documentation is auto-generated from the CLI source code. Last updated: {}.

## Overview

trawlnet discovers FTP servers on a private network, walks their directory
trees, and indexes the results for search. The `trawlnet` binary operates a
running daemon's registry and file index from the command line.

## Installation

### From Source

```bash
git clone https://github.com/trawlnet/trawlnet.git
cd trawlnet
cargo install --path crates/trawlnet-cli
```

## Quick Start

```bash
# Start the daemon in the foreground
trawlnet run

# List known hosts
trawlnet hosts

# Search the file index
trawlnet search readme

# Show stats for one host
trawlnet stats 10.0.0.5
```

## Commands

{}

## Environment Variables

See the daemon's configuration reference for the full list (`PORT`, `USER`,
`PASSWD`, `NETWORK`, `SCAN_INTERVAL`, `SCAN_TIMEOUT`, `MAX_SCAN_TASKS`,
`OFFLINE_DELAY`, `INDEX_INTERVAL`, `INDEX_TIMEOUT`, `MAX_INDEX_TASKS`,
`MAX_INDEX_ERRORS`, `SOFT_SIGNALS`, `STORE_PATH`). `RUST_LOG` controls the
tracing filter for both the CLI and the daemon.

## Support

- GitHub Issues: https://github.com/trawlnet/trawlnet/issues

---

*This documentation is automatically generated from the CLI source code. To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.mdx");
    fs::write(&file_path, mdx_content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
