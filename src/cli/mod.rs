//! Command-line interface

pub mod commands;

pub use commands::{
    cmd_create_wallet, cmd_derive, cmd_serve, cmd_validate_address, load_wallet_file, CliResult,
};
