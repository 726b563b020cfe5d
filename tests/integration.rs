//! Integration tests for the BLE-MIDI public API.
//!
//! Two profiles talk through an in-memory link: whatever one side
//! notifies is written into the other side's MIDI I/O characteristic.

use std::cell::RefCell;
use std::rc::Rc;

use ble_midi::config::DEFAULT_ATT_MTU;
use ble_midi::{
    midi, Decoder, Encoder, Error, MessageSink, MidiEvent, MidiProfile, TimedMessage, Transport,
    TransportError,
};
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal_async::delay::DelayNs;

#[derive(Clone, Copy)]
struct NoDelay;

impl DelayNs for NoDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

type Log = Rc<RefCell<Vec<(u16, Vec<u8>)>>>;

/// Sink that appends into a log shared with the test.
struct SharedLog(Log);

impl MessageSink for SharedLog {
    fn on_message(&mut self, timestamp: u16, message: &[u8]) {
        self.0.borrow_mut().push((timestamp, message.to_vec()));
    }

    fn on_overflow(&mut self, _timestamp: u16) {
        panic!("unexpected SysEx overflow");
    }
}

type Profile = MidiProfile<NoopRawMutex, SharedLog, NoDelay>;

/// Captures notifications for later delivery to the peer.
struct Air {
    mtu: Option<u16>,
    in_flight: RefCell<Vec<Vec<u8>>>,
}

impl Air {
    fn new(mtu: Option<u16>) -> Self {
        Self {
            mtu,
            in_flight: RefCell::new(Vec::new()),
        }
    }

    fn take(&self) -> Vec<Vec<u8>> {
        self.in_flight.take()
    }
}

impl Transport for Air {
    fn att_mtu(&self) -> Option<u16> {
        self.mtu
    }

    fn notify(&self, bep: &[u8]) -> Result<(), TransportError> {
        let limit = usize::from(self.mtu.unwrap_or(DEFAULT_ATT_MTU)) - 3;
        assert!(bep.len() <= limit, "BEP of {} bytes exceeds MTU", bep.len());
        self.in_flight.borrow_mut().push(bep.to_vec());
        Ok(())
    }
}

fn endpoint() -> (Profile, Log) {
    let log = Log::default();
    let profile = Profile::new(NoDelay);
    block_on(async {
        profile.init().await;
        profile
            .register_sink(Some(SharedLog(log.clone())))
            .await
            .unwrap();
        profile.set_notify_enabled(true).await.unwrap();
    });
    (profile, log)
}

fn deliver(air: &Air, to: &Profile) {
    for bep in air.take() {
        block_on(to.on_bep_received(&bep)).unwrap();
    }
}

#[test]
fn decode_note_on_with_closure_sink() {
    let mut decoder: Decoder = Decoder::new();
    let mut events = Vec::new();
    let mut sink = |ts: u16, event: MidiEvent<'_>| {
        if let MidiEvent::Message(bytes) = event {
            events.push((ts, bytes.to_vec()));
        }
    };
    let count = decoder.decode(&[0x83, 0xF4, 0x90, 0x3C, 0x64], &mut sink).unwrap();
    assert_eq!(count, 1);
    assert_eq!(events, vec![(500, vec![0x90, 0x3C, 0x64])]);
}

#[test]
fn channel_messages_reach_the_peer() {
    let (sender, _) = endpoint();
    let (receiver, log) = endpoint();
    let air = Air::new(None);

    block_on(async {
        sender.send_note_on(&air, 0, 60, 100, 10).await.unwrap();
        sender.send_cc(&air, 1, 64, 127, 11).await.unwrap();
        sender.send_pitch_bend(&air, 2, 0x1234, 12).await.unwrap();
        sender.send_note_off(&air, 0, 60, 0, 13).await.unwrap();
    });
    deliver(&air, &receiver);

    assert_eq!(
        *log.borrow(),
        vec![
            (10, midi::note_on(0, 60, 100).to_vec()),
            (11, midi::control_change(1, 64, 127).to_vec()),
            (12, midi::pitch_bend(2, 0x1234).to_vec()),
            (13, midi::note_off(0, 60, 0).to_vec()),
        ]
    );
}

#[test]
fn multi_message_burst_round_trips() {
    let (sender, _) = endpoint();
    let (receiver, log) = endpoint();
    let air = Air::new(None);

    let notes: Vec<[u8; 3]> = (0..24).map(|i| midi::note_on(i % 16, 36 + i, 90)).collect();
    let messages: Vec<TimedMessage<'_>> = notes
        .iter()
        .enumerate()
        .map(|(i, note)| TimedMessage::new(100 + 10 * i as u16, note))
        .collect();

    block_on(sender.send_multi(&air, &messages)).unwrap();
    let packets = air.in_flight.borrow().len();
    assert!(packets > 1 && packets < messages.len());
    deliver(&air, &receiver);

    let expected: Vec<(u16, Vec<u8>)> = messages
        .iter()
        .map(|m| (m.timestamp, m.bytes.to_vec()))
        .collect();
    assert_eq!(*log.borrow(), expected);
}

#[test]
fn large_sysex_round_trips_at_several_mtus() {
    for mtu in [23u16, 64, 185, 517] {
        let (sender, _) = endpoint();
        let (receiver, log) = endpoint();
        let air = Air::new(Some(mtu));

        let mut sysex = vec![0xF0, 0x43, 0x10];
        sysex.extend((0..240u16).map(|i| (i % 0x80) as u8));
        sysex.push(0xF7);

        block_on(sender.send_sysex(&air, &sysex, 7000)).unwrap();
        deliver(&air, &receiver);
        assert_eq!(*log.borrow(), vec![(7000, sysex.clone())], "MTU {}", mtu);
    }
}

#[test]
fn clock_packets_between_sysex_fragments() {
    let (receiver, log) = endpoint();
    let encoder = Encoder::for_mtu(DEFAULT_ATT_MTU);

    let mut sysex = vec![0xF0, 0x7D];
    sysex.extend(std::iter::repeat(0x55).take(60));
    sysex.push(0xF7);

    let clock = encoder.encode_single(&[0xF8], 42).unwrap();
    block_on(async {
        for fragment in encoder.fragment_sysex(&sysex, 40).unwrap() {
            receiver.on_bep_received(&fragment).await.unwrap();
            receiver.on_bep_received(&clock).await.unwrap();
        }
    });

    let log = log.borrow();
    let clocks = log.iter().filter(|(_, m)| m.as_slice() == [0xF8]).count();
    let sysexes: Vec<_> = log.iter().filter(|(_, m)| m.len() > 1).collect();
    assert!(clocks >= 4);
    assert_eq!(sysexes, vec![&(40, sysex.clone())]);
}

#[test]
fn nothing_is_sent_until_the_central_subscribes() {
    let (sender, _) = endpoint();
    let air = Air::new(None);
    block_on(async {
        sender.set_notify_enabled(false).await.unwrap();
        assert_eq!(
            sender.send_note_on(&air, 0, 60, 100, 0).await,
            Err(Error::NotReady)
        );
        assert_eq!(
            sender.send_sysex(&air, &[0xF0, 0x01, 0xF7], 0).await,
            Err(Error::NotReady)
        );
    });
    assert!(air.take().is_empty());
}
