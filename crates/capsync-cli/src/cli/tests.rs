//! CLI parse tests.

use super::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

#[test]
fn cli_parse_pending() {
    match parse(&["capsync", "pending"]).command {
        CliCommand::Pending { all } => assert!(!all),
        other => panic!("unexpected: {other:?}"),
    }
    match parse(&["capsync", "pending", "--all"]).command {
        CliCommand::Pending { all } => assert!(all),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn cli_parse_sync_budget() {
    match parse(&["capsync", "sync"]).command {
        CliCommand::Sync { retry_budget } => assert_eq!(retry_budget, None),
        other => panic!("unexpected: {other:?}"),
    }
    match parse(&["capsync", "sync", "--retry-budget", "5"]).command {
        CliCommand::Sync { retry_budget } => assert_eq!(retry_budget, Some(5)),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn cli_parse_abandon_requires_id() {
    match parse(&["capsync", "abandon", "0b6f7c1e"]).command {
        CliCommand::Abandon { id } => assert_eq!(id, "0b6f7c1e"),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(Cli::try_parse_from(["capsync", "abandon"]).is_err());
}

#[test]
fn cli_parse_global_paths_after_subcommand() {
    let cli = parse(&["capsync", "pending", "--queue", "/tmp/q.db", "--config", "/tmp/c.toml"]);
    assert_eq!(cli.queue, Some(PathBuf::from("/tmp/q.db")));
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    assert!(matches!(cli.command, CliCommand::Pending { all: false }));
}

#[test]
fn cli_rejects_unknown_command() {
    assert!(Cli::try_parse_from(["capsync", "upload"]).is_err());
}
