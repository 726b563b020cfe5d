//! BLE-MIDI peripheral firmware for nRF52840 + SoftDevice S140.
//!
//! Advertises the MIDI service, feeds characteristic writes into the
//! shared [`MidiProfile`] and plays a demo note once a central has
//! subscribed to notifications.
//!
//! Tasks:
//! - `softdevice_task` - runs the SoftDevice event loop.
//! - `receive_task`    - drains GATT writes/CCCD changes into the profile.
//! - `main`            - advertising loop; per connection runs the GATT
//!                       server alongside the demo sender.

#![no_std]
#![no_main]

use ble_midi::config::{
    ADV_INTERVAL, DEMO_NOTE_PERIOD_MS, DEVICE_NAME, MAX_PACKET_LEN, MIDI_SERVICE_UUID128,
    PREFERRED_ATT_MTU,
};
use ble_midi::{timestamp, Error, MessageSink, MidiProfile, Packet, Transport, TransportError};
use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_futures::select::select;
use embassy_nrf::interrupt::Priority;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Timer;
use embedded_hal_async::delay::DelayNs;
use nrf_softdevice::ble::advertisement_builder::{
    Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload, ServiceList,
};
use nrf_softdevice::ble::gatt_server::NotifyValueError;
use nrf_softdevice::ble::{gatt_server, peripheral, Connection};
use nrf_softdevice::{raw, RawError, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

// ═══════════════════════════════════════════════════════════════════════════
// GATT
// ═══════════════════════════════════════════════════════════════════════════

#[nrf_softdevice::gatt_service(uuid = "03B80E5A-EDE8-4B33-A751-6CE34EC4C700")]
pub struct MidiService {
    /// MIDI I/O. Reads return an empty payload.
    #[characteristic(
        uuid = "7772E5DB-3868-4112-A1A9-F2669D106BF3",
        read,
        write_without_response,
        notify
    )]
    io: heapless::Vec<u8, MAX_PACKET_LEN>,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    midi: MidiService,
}

static SERVER: StaticCell<Server> = StaticCell::new();

static ADV_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
    .services_128(ServiceList::Complete, &[MIDI_SERVICE_UUID128])
    .build();

static SCAN_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .full_name(DEVICE_NAME)
    .build();

// ═══════════════════════════════════════════════════════════════════════════
// Profile wiring
// ═══════════════════════════════════════════════════════════════════════════

/// Logs every incoming MIDI message over RTT.
struct LogSink;

impl MessageSink for LogSink {
    fn on_message(&mut self, timestamp: u16, message: &[u8]) {
        info!("MIDI in @{=u16}: {=[u8]:02x}", timestamp, message);
    }

    fn on_overflow(&mut self, timestamp: u16) {
        warn!("SysEx overflow @{=u16}", timestamp);
    }
}

/// Lock timeouts on the Embassy time driver.
#[derive(Clone, Copy)]
struct TimerDelay;

impl DelayNs for TimerDelay {
    async fn delay_ns(&mut self, ns: u32) {
        Timer::after_nanos(u64::from(ns)).await
    }
}

static PROFILE: MidiProfile<CriticalSectionRawMutex, LogSink, TimerDelay> =
    MidiProfile::new(TimerDelay);

/// GATT callbacks are synchronous; they queue work for `receive_task`.
enum LinkEvent {
    Packet(Packet),
    Notifications(bool),
    Lost,
}

static LINK_EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, 8> = Channel::new();

/// Notification path of the current connection.
struct Link<'a> {
    server: &'a Server,
    conn: &'a Connection,
}

impl Transport for Link<'_> {
    fn att_mtu(&self) -> Option<u16> {
        Some(self.conn.att_mtu())
    }

    fn notify(&self, bep: &[u8]) -> Result<(), TransportError> {
        let value = Packet::from_slice(bep).map_err(|_| TransportError::Raw(raw::NRF_ERROR_DATA_SIZE))?;
        self.server
            .midi
            .io_notify(self.conn, &value)
            .map_err(|e| match e {
                NotifyValueError::Disconnected => TransportError::Disconnected,
                NotifyValueError::Raw(RawError::Busy | RawError::Resources) => TransportError::Busy,
                NotifyValueError::Raw(raw) => TransportError::Raw(raw as u32),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════════════════════════

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn receive_task() -> ! {
    loop {
        let result = match LINK_EVENTS.receive().await {
            LinkEvent::Packet(bep) => PROFILE.on_bep_received(&bep).await.map(|_| ()),
            LinkEvent::Notifications(enabled) => PROFILE.set_notify_enabled(enabled).await,
            LinkEvent::Lost => PROFILE.link_lost().await,
        };
        if let Err(e) = result {
            warn!("MIDI link event failed: {:?}", e);
        }
    }
}

/// Plays middle C on channel 1 while the connection lasts.
async fn demo_notes(link: &Link<'_>) {
    const NOTE: u8 = 60;
    loop {
        Timer::after_millis(DEMO_NOTE_PERIOD_MS).await;
        match PROFILE.send_note_on(link, 0, NOTE, 100, timestamp::now()).await {
            // Central has not subscribed yet.
            Err(Error::NotReady) => continue,
            Err(e) => {
                warn!("Demo note on failed: {:?}", e);
                continue;
            }
            Ok(()) => {}
        }
        Timer::after_millis(DEMO_NOTE_PERIOD_MS / 4).await;
        if let Err(e) = PROFILE.send_note_off(link, 0, NOTE, 0, timestamp::now()).await {
            warn!("Demo note off failed: {:?}", e);
        }
    }
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_XTAL as u8,
            rc_ctiv: 0,
            rc_temp_ctiv: 0,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_20_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: raw::BLE_GAP_EVENT_LENGTH_DEFAULT as u16,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: PREFERRED_ATT_MTU,
        }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr().cast_mut(),
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("BLE-MIDI starting");

    // SoftDevice reserves priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let _p = embassy_nrf::init(config);

    let sd = Softdevice::enable(&softdevice_config());
    let server: &'static Server = SERVER.init(unwrap!(Server::new(sd)));
    unwrap!(spawner.spawn(softdevice_task(sd)));

    PROFILE.init().await;
    unwrap!(PROFILE.register_sink(Some(LogSink)).await);
    unwrap!(spawner.spawn(receive_task()));

    let adv_config = peripheral::Config {
        interval: ADV_INTERVAL,
        ..Default::default()
    };

    loop {
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &ADV_DATA,
            scan_data: &SCAN_DATA,
        };
        let conn = match peripheral::advertise_connectable(sd, adv, &adv_config).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Advertising failed: {:?}", e);
                Timer::after_millis(DEMO_NOTE_PERIOD_MS).await;
                continue;
            }
        };
        info!("Central connected");

        let link = Link {
            server,
            conn: &conn,
        };
        let gatt = gatt_server::run(&conn, server, |event| match event {
            ServerEvent::Midi(MidiServiceEvent::IoWrite(bep)) => {
                if LINK_EVENTS.try_send(LinkEvent::Packet(bep)).is_err() {
                    warn!("MIDI receive queue full, BEP dropped");
                }
            }
            ServerEvent::Midi(MidiServiceEvent::IoCccdWrite { notifications }) => {
                if LINK_EVENTS
                    .try_send(LinkEvent::Notifications(notifications))
                    .is_err()
                {
                    warn!("MIDI receive queue full, CCCD write dropped");
                }
            }
        });
        select(gatt, demo_notes(&link)).await;

        LINK_EVENTS.send(LinkEvent::Lost).await;
        info!("Central disconnected");
    }
}
