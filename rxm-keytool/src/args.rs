// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Command line arguments.

use std::path::PathBuf;
use uuid::Uuid;

#[derive(clap::Parser)]
#[command(version, about = "Receiver master key tool", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Generate a new random master key file.
    Keygen {
        /// The key file to create. Never overwritten.
        key: PathBuf,
    },
    /// Print the key as entered in the phone app setup dialog.
    Text {
        /// The binary key file.
        key: PathBuf,
    },
    /// Write an Intel HEX file placing the key in the UICR customer registers.
    UicrHex {
        /// The binary key file.
        key: PathBuf,
        /// Path to write the HEX file.
        output: PathBuf,
    },
    /// Print the key of a transmitter, in hex.
    Derive {
        /// The binary key file.
        key: PathBuf,
        /// The transmitter service UUID.
        uuid: Uuid,
    },
    /// Sign a command the way a transmitter does.
    Seal {
        /// The binary key file.
        key: PathBuf,
        /// The transmitter service UUID.
        uuid: Uuid,
        /// Sequence number, below 2^24.
        seq: u32,
        /// Command code.
        #[arg(long, default_value_t = 0)]
        command: u8,
    },
}

pub fn args<I, T>(args: I) -> Result<Command, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    use clap::Parser;
    Ok(Args::try_parse_from(args)?.command)
}
