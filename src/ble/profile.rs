//! Shared BLE-MIDI profile context.
//!
//! One mutex guards the decoder, the registered sink and the notify flag.
//! The receive path waits at most [`RX_LOCK_TIMEOUT_MS`] for it so the BLE
//! stack's callback never stalls; control and send paths wait as long as
//! needed. Teardown raises `shutting_down` first, and the receive path
//! checks it both before and after taking the lock.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embedded_hal_async::delay::DelayNs;

use super::Transport;
use crate::config::{
    DEFAULT_ATT_MTU, DEINIT_GRACE_MS, DEINIT_LOCK_TIMEOUT_MS, RX_LOCK_TIMEOUT_MS,
};
use crate::error::{Error, SendMultiError};
use crate::midi;
use crate::packet::{Decoder, DecoderStats, Encoder, MessageSink, TimedMessage};

struct ProfileState<S> {
    decoder: Decoder,
    sink: Option<S>,
    notify_enabled: bool,
}

impl<S> ProfileState<S> {
    const fn new() -> Self {
        Self {
            decoder: Decoder::new(),
            sink: None,
            notify_enabled: false,
        }
    }

    fn clear(&mut self) {
        self.decoder.reset();
        self.sink = None;
        self.notify_enabled = false;
    }
}

/// BLE-MIDI profile context.
///
/// - `M`: raw mutex flavour (`CriticalSectionRawMutex` on target).
/// - `S`: receiver of decoded messages.
/// - `D`: delay source bounding lock waits (`embassy_time::Delay` on target).
///
/// `new` is `const`, so the profile can live in a `static` shared between
/// the GATT server task and application tasks.
pub struct MidiProfile<M: RawMutex, S, D> {
    state: Mutex<M, ProfileState<S>>,
    initialized: AtomicBool,
    shutting_down: AtomicBool,
    delay: D,
}

impl<M, S, D> MidiProfile<M, S, D>
where
    M: RawMutex,
    S: MessageSink,
    D: DelayNs + Clone,
{
    pub const fn new(delay: D) -> Self {
        Self {
            state: Mutex::new(ProfileState::new()),
            initialized: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            delay,
        }
    }

    /// `true` between `init` and the start of `deinit`.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire) && !self.shutting_down.load(Ordering::Acquire)
    }

    /// Prepare the profile for use. Idempotent.
    ///
    /// Clears anything a timed-out `deinit` had to leave behind.
    pub async fn init(&self) {
        if self.initialized.load(Ordering::Acquire) {
            return;
        }
        self.state.lock().await.clear();
        self.shutting_down.store(false, Ordering::Release);
        self.initialized.store(true, Ordering::Release);
        info!("BLE-MIDI profile initialised");
    }

    /// Tear the profile down, dropping the sink and any partial SysEx.
    ///
    /// Returns `Timeout` if the lock stayed busy for
    /// [`DEINIT_LOCK_TIMEOUT_MS`]; the profile is still marked
    /// uninitialised and the next `init` finishes the cleanup.
    pub async fn deinit(&self) -> Result<(), Error> {
        if !self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.shutting_down.store(true, Ordering::Release);

        let result = match self.lock_within(DEINIT_LOCK_TIMEOUT_MS).await {
            Some(mut state) => {
                state.clear();
                Ok(())
            }
            None => {
                error!(
                    "Profile lock busy for {} ms during deinit",
                    DEINIT_LOCK_TIMEOUT_MS
                );
                // Let in-flight receive callbacks see the shutdown flag.
                let mut delay = self.delay.clone();
                delay.delay_ms(DEINIT_GRACE_MS).await;
                Err(Error::Timeout)
            }
        };

        self.initialized.store(false, Ordering::Release);
        self.shutting_down.store(false, Ordering::Release);
        info!("BLE-MIDI profile deinitialised");
        result
    }

    /// Install (or with `None`, remove) the receiver of decoded messages.
    pub async fn register_sink(&self, sink: Option<S>) -> Result<(), Error> {
        self.ensure_ready()?;
        self.state.lock().await.sink = sink;
        Ok(())
    }

    /// Record the CCCD state written by the central.
    pub async fn set_notify_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.ensure_ready()?;
        self.state.lock().await.notify_enabled = enabled;
        debug!("MIDI notifications {}", enabled);
        Ok(())
    }

    /// The central went away: notifications off, partial SysEx and running
    /// status dropped. The sink stays registered for the next connection.
    pub async fn link_lost(&self) -> Result<(), Error> {
        self.ensure_ready()?;
        let mut state = self.state.lock().await;
        state.notify_enabled = false;
        state.decoder.reset();
        Ok(())
    }

    /// `false` when not initialised.
    pub async fn is_notify_enabled(&self) -> bool {
        if !self.is_initialized() {
            return false;
        }
        self.state.lock().await.notify_enabled
    }

    pub async fn decoder_stats(&self) -> DecoderStats {
        self.state.lock().await.decoder.stats()
    }

    /// Entry point for a BEP written to the MIDI I/O characteristic.
    ///
    /// Hands the raw packet to the sink, then decodes it into the sink.
    /// Without a registered sink the packet is ignored. Returns the number
    /// of decoded events.
    pub async fn on_bep_received(&self, bep: &[u8]) -> Result<usize, Error> {
        if bep.is_empty() {
            return Err(Error::InvalidArgument);
        }
        if !self.is_initialized() {
            return Err(Error::NotReady);
        }

        let Some(mut state) = self.lock_within(RX_LOCK_TIMEOUT_MS).await else {
            warn!("Profile lock busy, dropping {} byte BEP", bep.len());
            return Err(Error::Timeout);
        };
        // Teardown may have run, or timed out, while we waited.
        if !self.is_initialized() {
            return Err(Error::NotReady);
        }

        let ProfileState { decoder, sink, .. } = &mut *state;
        let Some(sink) = sink.as_mut() else {
            return Ok(0);
        };
        sink.on_packet(bep);
        decoder.decode(bep, sink)
    }

    /// Notify one complete BEP to the connected central.
    pub async fn send<T>(&self, transport: &T, bep: &[u8]) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        if bep.is_empty() {
            return Err(Error::InvalidArgument);
        }
        self.ensure_ready()?;
        if !self.state.lock().await.notify_enabled {
            return Err(Error::NotReady);
        }
        transport.notify(bep).map_err(|e| {
            warn!("MIDI notify failed: {}", e);
            Error::from(e)
        })
    }

    /// Wrap one MIDI message in a BEP and send it.
    pub async fn send_raw_midi<T>(&self, transport: &T, midi: &[u8], timestamp: u16) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        let packet = encoder_for(transport).encode_single(midi, timestamp)?;
        self.send(transport, &packet).await
    }

    pub async fn send_note_on<T>(
        &self,
        transport: &T,
        channel: u8,
        note: u8,
        velocity: u8,
        timestamp: u16,
    ) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        self.send_raw_midi(transport, &midi::note_on(channel, note, velocity), timestamp)
            .await
    }

    pub async fn send_note_off<T>(
        &self,
        transport: &T,
        channel: u8,
        note: u8,
        velocity: u8,
        timestamp: u16,
    ) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        self.send_raw_midi(transport, &midi::note_off(channel, note, velocity), timestamp)
            .await
    }

    pub async fn send_cc<T>(
        &self,
        transport: &T,
        channel: u8,
        controller: u8,
        value: u8,
        timestamp: u16,
    ) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        self.send_raw_midi(transport, &midi::control_change(channel, controller, value), timestamp)
            .await
    }

    /// `value` is 14-bit, 8192 = centre.
    pub async fn send_pitch_bend<T>(
        &self,
        transport: &T,
        channel: u8,
        value: u16,
        timestamp: u16,
    ) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        self.send_raw_midi(transport, &midi::pitch_bend(channel, value), timestamp)
            .await
    }

    /// Aggregate several messages into as few notifications as the MTU allows.
    ///
    /// On failure `first_unsent` is the first message that did not reach
    /// the transport; everything before it was delivered.
    pub async fn send_multi<T>(
        &self,
        transport: &T,
        messages: &[TimedMessage<'_>],
    ) -> Result<(), SendMultiError>
    where
        T: Transport + ?Sized,
    {
        if messages.is_empty() {
            return Err(SendMultiError {
                error: Error::InvalidArgument,
                first_unsent: 0,
            });
        }

        for batch in encoder_for(transport).pack_multi(messages) {
            let batch = batch.map_err(|index| SendMultiError {
                error: Error::InvalidArgument,
                first_unsent: index,
            })?;
            self.send(transport, &batch.packet)
                .await
                .map_err(|error| SendMultiError {
                    error,
                    first_unsent: batch.first_index,
                })?;
        }
        Ok(())
    }

    /// Send a complete `F0 .. F7` SysEx, fragmented to the current MTU.
    pub async fn send_sysex<T>(&self, transport: &T, sysex: &[u8], timestamp: u16) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        for packet in encoder_for(transport).fragment_sysex(sysex, timestamp)? {
            self.send(transport, &packet).await?;
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        if self.is_initialized() {
            Ok(())
        } else {
            error!("BLE-MIDI profile used before init");
            Err(Error::NotReady)
        }
    }

    /// Take the state lock, giving up after `timeout_ms`.
    async fn lock_within(&self, timeout_ms: u32) -> Option<MutexGuard<'_, M, ProfileState<S>>> {
        let mut delay = self.delay.clone();
        let winner = select(self.state.lock(), delay.delay_ms(timeout_ms)).await;
        match winner {
            Either::First(guard) => Some(guard),
            Either::Second(()) => None,
        }
    }
}

fn encoder_for<T: Transport + ?Sized>(transport: &T) -> Encoder {
    Encoder::for_mtu(transport.att_mtu().unwrap_or(DEFAULT_ATT_MTU))
}
