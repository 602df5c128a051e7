// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use {
    crate::ExitCode,
    consts::RXM_KEY_SIZE,
    receiver_core::{message::parse_report, Authenticator, Message, TransmitterIdentity},
    std::io::Write,
};

const KEY: [u8; RXM_KEY_SIZE] = *b"0123456789abcdefghij";
const UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// Generate a key and refuse to overwrite it afterwards.
#[test]
fn keygen_creates_key_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rxm.key");
    let path = path.to_str().unwrap();

    let output = test(["keygen", path]);
    assert_eq!(output.exit_code, ExitCode(0));
    let key = std::fs::read(path).unwrap();
    assert_eq!(key.len(), RXM_KEY_SIZE);

    let output = test(["keygen", path]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("refusing to overwrite"));
    assert_eq!(std::fs::read(path).unwrap(), key);
}

/// Print the key in the phone app format.
#[test]
fn text_output() {
    let file = create_file(&KEY);
    let output = test(["text", file.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(0));

    let expected = data_encoding::BASE32.encode(&KEY).to_lowercase();
    let key_line = output.stdout.lines().find(|l| l.starts_with("key:")).unwrap();
    let groups: Vec<&str> = key_line["key:".len()..].split_whitespace().collect();
    assert_eq!(groups.len(), 7);
    assert!(groups.iter().take(6).all(|g| g.len() == 5));
    assert_eq!(groups.concat(), expected);

    assert!(output.stdout.contains("length:   20"));
    let crc = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC).checksum(&KEY);
    assert!(output.stdout.contains(&format!("checksum: {crc:08x}")));
    assert!(output.stderr.is_empty());
}

/// A key file of the wrong size is rejected.
#[test]
fn wrong_key_length() {
    let file = create_file(&KEY[..16]);
    let output = test(["text", file.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.contains("holds 16 bytes"));
}

/// The HEX image places the key at the UICR secret address.
#[test]
fn uicr_hex_image() {
    let file = create_file(&KEY);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("uicr.hex");
    let output = test(["uicr-hex", file.path().to_str().unwrap(), out.to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(0));

    let hex = std::fs::read_to_string(out).unwrap();
    let records: Vec<ihex::Record> = ihex::Reader::new(&hex).map(|r| r.unwrap()).collect();
    assert_eq!(
        records,
        vec![
            ihex::Record::ExtendedLinearAddress(0x1000),
            ihex::Record::Data {
                offset: 0x1080,
                value: KEY.to_vec(),
            },
            ihex::Record::EndOfFile,
        ]
    );
}

/// The derived key matches the receiver's own derivation.
#[test]
fn derive_matches_receiver() {
    let file = create_file(&KEY);
    let output = test(["derive", file.path().to_str().unwrap(), UUID]);
    assert_eq!(output.exit_code, ExitCode(0));

    let identity = TransmitterIdentity::from_be_bytes(*uuid::Uuid::parse_str(UUID).unwrap().as_bytes());
    let expected = Authenticator::new(&KEY).derive_key(&identity).unwrap();
    assert_eq!(output.stdout.trim(), hex::encode(expected));
}

/// Sealed messages pass the receiver's verification, both as printed and
/// after going through the advertisement parser.
#[test]
fn sealed_message_verifies() {
    let file = create_file(&KEY);
    let output = test(["seal", file.path().to_str().unwrap(), UUID, "4711", "--command", "1"]);
    assert_eq!(output.exit_code, ExitCode(0));

    let field = |name: &str| {
        let line = output.stdout.lines().find(|l| l.starts_with(name)).unwrap();
        hex::decode(line[name.len()..].trim()).unwrap()
    };
    let message: [u8; Message::SIZE] = field("message:").try_into().unwrap();
    let message = Message::from_bytes(&message);
    assert_eq!(message.command, 1);
    assert_eq!(message.seq_no(), 4711);

    let identity = TransmitterIdentity::from_be_bytes(*uuid::Uuid::parse_str(UUID).unwrap().as_bytes());
    let auth = Authenticator::new(&KEY);
    assert_eq!(auth.verify(&identity, &message), Ok(true));

    let mut received = Vec::new();
    parse_report(&field("ad:"), -40, |rec| received.push(rec)).unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].identity, identity);
    assert_eq!(received[0].message, message);

    // Signed for someone else
    let other = TransmitterIdentity::from_be_bytes([0x42; 16]);
    assert_eq!(auth.verify(&other, &message), Ok(false));
}

/// Sequence numbers do not fit in 24 bits.
#[test]
fn seal_rejects_large_sequence() {
    let file = create_file(&KEY);
    let output = test(["seal", file.path().to_str().unwrap(), UUID, "16777216"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("24 bits"));
}

/// Malformed UUIDs are reported by the argument parser.
#[test]
fn bad_uuid() {
    let file = create_file(&KEY);
    let output = test(["derive", file.path().to_str().unwrap(), "not-a-uuid"]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.contains("not-a-uuid"));
}

fn test<const N: usize>(args: [&str; N]) -> Output {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = crate::main_args(std::iter::once("rxm-keytool").chain(args), &mut stdout, &mut stderr);
    println!("* args: {:?}", args);
    println!("* exit_code: {:?}", exit_code);
    println!("* stdout:\n{}", String::from_utf8_lossy(&stdout));
    println!("* stderr:\n{}", String::from_utf8_lossy(&stderr));
    Output {
        exit_code,
        stdout: String::from_utf8(stdout).unwrap(),
        stderr: String::from_utf8(stderr).unwrap(),
    }
}

#[derive(Debug)]
struct Output {
    exit_code: ExitCode,
    stdout: String,
    stderr: String,
}

fn create_file(data: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file
}
