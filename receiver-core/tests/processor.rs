// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

mod common;

use common::{authenticator, identity, mount, open_store, power_cycle, CrampedLog, RamFlash};
use consts::{LEARN_WINDOW_MS, MAX_TRANSMITTERS, RX_DISABLE_MS, TICK_MS};
use futures::executor::block_on;
use receiver_core::message::{parse_report, service_data_ad};
use receiver_core::{
    AdvertisementRecord, CommandProcessor, Error, FlashLog, Message, Outcome, PersistentStore, SharedState,
    TransmitterIdentity,
};

const OPEN: u8 = 0x01;

fn signed(id: &TransmitterIdentity, seq_no: u32) -> AdvertisementRecord {
    AdvertisementRecord {
        identity: *id,
        message: authenticator().seal(id, OPEN, seq_no).unwrap(),
        rssi: -70,
    }
}

fn forged(id: &TransmitterIdentity, seq_no: u32) -> AdvertisementRecord {
    let mut record = signed(id, seq_no);
    record.message.digest[0] ^= 0x80;
    record
}

fn store_with(enrolled: &[(u8, u32)]) -> PersistentStore<FlashLog<RamFlash>> {
    let mut store = open_store(RamFlash::new());
    for (n, seq) in enrolled {
        block_on(store.enroll(&identity(*n), *seq)).unwrap();
    }
    store
}

fn tick_for(state: &SharedState, ms: u32) {
    for _ in 0..ms / TICK_MS {
        state.tick(false);
    }
}

#[test]
fn newer_sequence_is_accepted_and_stored() {
    let state = SharedState::new();
    let processor = CommandProcessor::new(authenticator(), &state);
    let mut store = store_with(&[(1, 10)]);

    let outcome = block_on(processor.process(&mut store, &signed(&identity(1), 11))).unwrap();
    assert_eq!(outcome, Outcome::Accepted);
    assert!(outcome.activates_relay());
    assert!(state.is_relay_active());
    assert_eq!(store.get_sequence(&identity(1)), Some(11));

    // Gaps are fine, only the order matters
    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(1), 500))),
        Ok(Outcome::Accepted)
    );
    let store = power_cycle(store);
    assert_eq!(store.get_sequence(&identity(1)), Some(500));
}

#[test]
fn replayed_or_older_sequence_is_rejected() {
    let state = SharedState::new();
    let processor = CommandProcessor::new(authenticator(), &state);
    let mut store = store_with(&[(1, 10)]);
    block_on(processor.process(&mut store, &signed(&identity(1), 11))).unwrap();
    tick_for(&state, 1000);
    assert!(!state.is_relay_active());

    let writes = store.log().flash().writes;
    for seq in [11, 10, 3] {
        let outcome = block_on(processor.process(&mut store, &signed(&identity(1), seq))).unwrap();
        assert_eq!(outcome, Outcome::Replayed { stored: 11 });
    }
    assert!(!state.is_relay_active());
    assert!(!state.is_rx_disabled());
    assert_eq!(store.log().flash().writes, writes);
    assert_eq!(store.get_sequence(&identity(1)), Some(11));
}

#[test]
fn bad_digest_suspends_reception() {
    let state = SharedState::new();
    let processor = CommandProcessor::new(authenticator(), &state);
    let mut store = store_with(&[(1, 10)]);
    let writes = store.log().flash().writes;

    assert_eq!(
        block_on(processor.process(&mut store, &forged(&identity(1), 11))),
        Ok(Outcome::BadDigest)
    );
    assert!(state.is_rx_disabled());
    assert!(!state.is_relay_active());
    assert_eq!(store.log().flash().writes, writes);

    // Even a valid command is dropped during the cooldown
    tick_for(&state, RX_DISABLE_MS - TICK_MS);
    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(1), 11))),
        Ok(Outcome::Throttled)
    );
    assert_eq!(store.get_sequence(&identity(1)), Some(10));

    tick_for(&state, TICK_MS);
    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(1), 11))),
        Ok(Outcome::Accepted)
    );
}

#[test]
fn message_signed_for_another_transmitter_is_forged() {
    let state = SharedState::new();
    let processor = CommandProcessor::new(authenticator(), &state);
    let mut store = store_with(&[(1, 10), (2, 10)]);

    let mut record = signed(&identity(2), 11);
    record.identity = identity(1);
    assert_eq!(
        block_on(processor.process(&mut store, &record)),
        Ok(Outcome::BadDigest)
    );
    assert_eq!(store.get_sequence(&identity(1)), Some(10));
}

#[test]
fn unknown_transmitter_enrolls_only_while_learning() {
    let state = SharedState::new();
    let processor = CommandProcessor::new(authenticator(), &state);
    let mut store = store_with(&[]);
    let writes = store.log().flash().writes;

    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(7), 42))),
        Ok(Outcome::UnknownTransmitter)
    );
    assert_eq!(store.get_sequence(&identity(7)), None);
    assert_eq!(store.log().flash().writes, writes);

    state.arm_learn();
    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(7), 42))),
        Ok(Outcome::Enrolled)
    );
    assert!(!state.is_relay_active());
    assert_eq!(store.get_sequence(&identity(7)), Some(42));

    // The enrolling command itself cannot be replayed
    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(7), 42))),
        Ok(Outcome::Replayed { stored: 42 })
    );
    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(7), 43))),
        Ok(Outcome::Accepted)
    );
}

#[test]
fn learn_window_closes() {
    let state = SharedState::new();
    let processor = CommandProcessor::new(authenticator(), &state);
    let mut store = store_with(&[]);

    state.arm_learn();
    tick_for(&state, consts::LEARN_WINDOW_MS);
    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(7), 1))),
        Ok(Outcome::UnknownTransmitter)
    );
}

#[test]
fn enrollment_failure_is_not_fatal() {
    let state = SharedState::new();
    let processor = CommandProcessor::new(authenticator(), &state);
    let enrolled: Vec<(u8, u32)> = (0..MAX_TRANSMITTERS as u8).map(|n| (n, 1)).collect();
    let mut store = store_with(&enrolled);

    state.arm_learn();
    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(99), 1))),
        Ok(Outcome::EnrollFailed(Error::RegistryFull))
    );
    assert_eq!(store.get_sequence(&identity(99)), None);
}

#[test]
fn failed_enrollment_is_rejected_on_retry() {
    let state = SharedState::new();
    let processor = CommandProcessor::new(authenticator(), &state);
    let log = CrampedLog::new(mount(RamFlash::new()), 1);
    let mut store = block_on(PersistentStore::init(log)).unwrap();

    state.arm_learn();
    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(5), 20))),
        Ok(Outcome::EnrollFailed(Error::LogFull))
    );
    tick_for(&state, LEARN_WINDOW_MS);
    assert!(!state.is_learning());

    for seq in [20, 21] {
        assert_eq!(
            block_on(processor.process(&mut store, &signed(&identity(5), seq))),
            Ok(Outcome::UnknownTransmitter)
        );
    }
    assert!(!state.is_relay_active());

    // Still unknown after a reboot with room to spare
    let mut store = open_store(store.into_log().inner.release());
    assert_eq!(
        block_on(processor.process(&mut store, &signed(&identity(5), 21))),
        Ok(Outcome::UnknownTransmitter)
    );
    assert!(!state.is_relay_active());
    assert_eq!(store.get_sequence(&identity(5)), None);
}

#[test]
fn over_the_air_report_end_to_end() {
    let state = SharedState::new();
    let processor = CommandProcessor::new(authenticator(), &state);
    let mut store = store_with(&[(1, 0)]);

    let message: Message = authenticator().seal(&identity(1), OPEN, 1).unwrap();
    let mut report = vec![0x02, 0x01, 0x06];
    report.extend_from_slice(&service_data_ad(&identity(1), &message));

    let mut received = Vec::new();
    parse_report(&report, -55, |rec| received.push(rec)).unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(
        block_on(processor.process(&mut store, &received[0])),
        Ok(Outcome::Accepted)
    );
}
