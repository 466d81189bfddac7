//! Desired-state reconciliation engine for dotfiles.
//!
//! A config repository holds one directory per module, each with a
//! `module.toml` declaring links, templates, registry values, PATH entries,
//! global packages, editor extensions and hooks. Deploying converges the
//! machine toward that declaration; status reports drift without changing
//! anything.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: parse modules, machine profiles, package manifests and settings
//! - **[`resources`]**: idempotent `check + apply` primitives (links, registry, packages, ...)
//! - **[`template`]**: placeholder rendering with secret references and variables
//! - **[`deploy`]**: the orchestrator, its collaborators and the result stream
//! - **[`diff`]**: record a directory and list what changed in it
//! - **[`commands`]**: top-level subcommands (`deploy`, `status`, `restore`, `diff`, ...)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod deploy;
pub mod diff;
pub mod error;
pub mod exec;
pub mod logging;
pub mod paths;
pub mod platform;
pub mod resources;
pub mod template;
