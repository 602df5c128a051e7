// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use {
    colored::Colorize,
    consts::{RXM_KEY_SIZE, UICR_SECRET_START},
    rand::RngCore,
    receiver_core::{message::service_data_ad, Authenticator, TransmitterIdentity},
    std::{
        ffi::OsString,
        io::{Read, Write},
        path::{Path, PathBuf},
    },
    tracing_subscriber::{fmt, prelude::*, EnvFilter},
};
// critical-section implementation for the receiver core
use critical_section as _;

mod args;

#[cfg(test)]
mod tests;

/// zlib's CRC-32, as shown by the phone app.
const CRC_32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

fn main() -> std::process::ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    main_args(std::env::args_os(), &mut std::io::stdout(), &mut std::io::stderr()).into()
}

fn main_args<I, T>(args: I, stdout: impl Write, mut stderr: impl Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match run(args, stdout) {
        Ok(()) => ExitCode(0),
        Err(Error::Args(e)) => {
            // Clap already does the "error: {}" formatting.
            let _ = write!(stderr, "{e}");
            ExitCode(if e.use_stderr() { 1 } else { 0 })
        }
        Err(e) => {
            let _ = writeln!(stderr, "{} {e}", "error:".bold().red());
            ExitCode(1)
        }
    }
}

fn run<I, T>(args: I, mut stdout: impl Write) -> Result<(), Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match args::args(args)? {
        args::Command::Keygen { key: path } => {
            let mut key = [0u8; RXM_KEY_SIZE];
            rand::rngs::OsRng.fill_bytes(&mut key);
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::AlreadyExists => Error::KeyExists(path.clone()),
                    _ => Error::CreateFile(e),
                })?;
            file.write_all(&key).map_err(Error::WriteFile)?;
            tracing::info!("new master key written to {}", path.display());
        }
        args::Command::Text { key } => {
            let key = read_key(&key)?;
            let encoded = data_encoding::BASE32.encode(&key).to_lowercase();
            let groups: Vec<&str> = encoded
                .as_bytes()
                .chunks(5)
                .map(|c| std::str::from_utf8(c).unwrap_or_default())
                .collect();
            writeln!(stdout, "Base32 encoded Receiver Master Key with CRC-32 checksum\n").map_err(Error::Stdout)?;
            writeln!(stdout, "{:10}{}", "key:", groups.join(" ")).map_err(Error::Stdout)?;
            writeln!(stdout, "{:10}{}", "length:", key.len()).map_err(Error::Stdout)?;
            writeln!(stdout, "{:10}{:08x}", "checksum:", CRC_32.checksum(&key)).map_err(Error::Stdout)?;
        }
        args::Command::UicrHex { key, output } => {
            let key = read_key(&key)?;
            let hex = uicr_hex(&key)?;
            std::fs::write(&output, hex).map_err(Error::WriteFile)?;
            tracing::info!("UICR image written to {}", output.display());
        }
        args::Command::Derive { key, uuid } => {
            let key = read_key(&key)?;
            let identity = TransmitterIdentity::from_be_bytes(*uuid.as_bytes());
            let tx_key = Authenticator::new(&key).derive_key(&identity)?;
            writeln!(stdout, "{}", hex::encode(tx_key)).map_err(Error::Stdout)?;
        }
        args::Command::Seal {
            key,
            uuid,
            seq,
            command,
        } => {
            let key = read_key(&key)?;
            let identity = TransmitterIdentity::from_be_bytes(*uuid.as_bytes());
            let message = Authenticator::new(&key).seal(&identity, command, seq)?;
            writeln!(stdout, "{:10}{}", "message:", hex::encode(message.to_bytes())).map_err(Error::Stdout)?;
            writeln!(stdout, "{:10}{}", "ad:", hex::encode(service_data_ad(&identity, &message)))
                .map_err(Error::Stdout)?;
        }
    }
    Ok(())
}

fn read_key(path: &Path) -> Result<[u8; RXM_KEY_SIZE], Error> {
    let mut buf = Vec::new();
    std::fs::File::open(path)
        .map_err(Error::OpenFile)?
        .read_to_end(&mut buf)
        .map_err(Error::ReadFile)?;
    buf.as_slice().try_into().map_err(|_| Error::KeyLength(buf.len()))
}

/// Intel HEX image holding `key` at the UICR secret address.
fn uicr_hex(key: &[u8]) -> Result<String, Error> {
    let records = [
        ihex::Record::ExtendedLinearAddress((UICR_SECRET_START >> 16) as u16),
        ihex::Record::Data {
            offset: (UICR_SECRET_START & 0xFFFF) as u16,
            value: key.to_vec(),
        },
        ihex::Record::EndOfFile,
    ];
    ihex::create_object_file_representation(&records).map_err(Error::Hex)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExitCode(u8);

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        code.0.into()
    }
}

#[derive(Debug)]
enum Error {
    Args(clap::Error),
    Core(receiver_core::Error),
    CreateFile(std::io::Error),
    Hex(ihex::WriterError),
    KeyExists(PathBuf),
    KeyLength(usize),
    OpenFile(std::io::Error),
    ReadFile(std::io::Error),
    Stdout(std::io::Error),
    WriteFile(std::io::Error),
}

impl From<clap::Error> for Error {
    fn from(e: clap::Error) -> Self {
        Error::Args(e)
    }
}

impl From<receiver_core::Error> for Error {
    fn from(e: receiver_core::Error) -> Self {
        Error::Core(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Args(e) => write!(f, "{e}"),
            Error::Core(e) => write!(f, "{e}"),
            Error::CreateFile(e) => write!(f, "failed to create file: {e}"),
            Error::Hex(e) => write!(f, "failed to build HEX file: {e}"),
            Error::KeyExists(path) => write!(f, "{} already exists, refusing to overwrite", path.display()),
            Error::KeyLength(len) => write!(f, "key file holds {len} bytes, expected {RXM_KEY_SIZE}"),
            Error::OpenFile(e) => write!(f, "failed to open file: {e}"),
            Error::ReadFile(e) => write!(f, "failed to read file: {e}"),
            Error::Stdout(e) => write!(f, "failed to write to stdout: {e}"),
            Error::WriteFile(e) => write!(f, "failed to write file: {e}"),
        }
    }
}

impl std::error::Error for Error {}
