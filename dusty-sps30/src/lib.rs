//! # Introduction
//!
//! This is a platform agnostic Rust driver for the Sensirion SPS30
//! particulate matter sensor over I²C, based on the
//! [`embedded-hal`](https://github.com/rust-embedded/embedded-hal) traits
//! and the [`dusty-sched`](../dusty_sched/index.html) cooperative scheduler
//! contract.
//!
//! ## Cooperative, non-blocking operation
//!
//! The driver never busy-waits on the sensor. It owns a small protocol
//! state machine that is advanced by two scheduler tasks registered at
//! construction:
//!
//! - the *step task* runs the protocol state machine: it issues one or
//!   more bus transactions, and whenever the sensor needs time to settle it
//!   plans its own next invocation and returns control to the scheduler;
//! - the *interval task* fires periodic measurement requests at the
//!   configured update interval.
//!
//! The embedder maps the two [`TaskId`]s (see [`Sps30::step_task_id`] and
//! [`Sps30::interval_task_id`]) to the matching entry points
//! [`Sps30::task_step`] and [`Sps30::task_interval`] and calls them when
//! the scheduler fires the tasks. Everything runs on one logical thread;
//! no locking is involved anywhere.
//!
//! After power-up the driver reads the device serial number to verify the
//! sensor is alive, then idles. Each measurement cycle starts the fan,
//! polls the data-ready flag, reads and decodes the ten-float measurement
//! block, and stops the fan again. Every reply is guarded by the sensor's
//! CRC-8; any bus or checksum failure raises [`Sps30Event::Error`] once
//! and restarts the whole sequence from initialization on a later tick,
//! so the driver self-heals without embedder involvement.
//!
//! ## Usage
//!
//! ```no_run
//! use dusty_sched::{Scheduler, TaskId, Tick};
//! use dusty_sps30::{Sps30, Sps30Event, SPS30_I2C_ADDRESS};
//! use linux_embedded_hal::I2cdev;
//!
//! # struct Loopy(usize);
//! # impl Scheduler for Loopy {
//! #     fn register(&mut self, _: Tick) -> TaskId {
//! #         self.0 += 1;
//! #         TaskId::new(self.0 - 1)
//! #     }
//! #     fn plan_now(&mut self, _: TaskId) {}
//! #     fn plan_from_now(&mut self, _: TaskId, _: Tick) {}
//! #     fn plan_absolute(&mut self, _: TaskId, _: Tick) {}
//! #     fn plan_current_relative(&mut self, _: Tick) {}
//! #     fn plan_current_from_now(&mut self, _: Tick) {}
//! # }
//! # let mut scheduler = Loopy(0);
//! let dev = I2cdev::new("/dev/i2c-1").unwrap();
//! let mut sensor = Sps30::new(dev, SPS30_I2C_ADDRESS, &mut scheduler);
//!
//! sensor.set_event_handler(|event| {
//!     if event == Sps30Event::Update {
//!         // fresh snapshot available via the getters
//!     }
//! });
//!
//! // one measurement every minute
//! sensor.set_update_interval(&mut scheduler, 60_000);
//!
//! // in the scheduler's dispatch loop:
//! sensor.task_step(&mut scheduler);
//! if let Some(mass) = sensor.mass_concentration() {
//!     println!("PM2.5: {} ug/m3", mass.mc_2p5);
//! }
//! ```
//!
//! ## Bus configuration
//!
//! The SPS30 talks standard-mode I²C; configure the peripheral for
//! 100 kHz before handing it to [`Sps30::new`]. The driver assumes
//! address 0x69 ([`SPS30_I2C_ADDRESS`]) unless told otherwise.
#![deny(unsafe_code, missing_docs)]
#![no_std]

mod crc;
mod types;
mod words;

use dusty_sched::{Scheduler, TaskId, Tick, TICK_INFINITY};
use embedded_hal::i2c::{I2c, SevenBitAddress};

use crc::crc8;
use types::Measurement;
use words::decode_words;

pub use types::{MassConcentration, NumberConcentration};

/// Factory-default I²C address of the SPS30.
pub const SPS30_I2C_ADDRESS: u8 = 0x69;

/// Delay before the first protocol step after construction, and before
/// re-running initialization after an error [ms].
const DELAY_RUN: Tick = 100;
/// Settling delay before the first periodic measurement trigger [ms].
const DELAY_INITIALIZE: Tick = 500;
/// Time the sensor needs to prepare a reply after a command write [ms].
const DELAY_READ: Tick = 30;
/// Re-poll period while the data-ready flag is unset [ms].
const DELAY_MEASUREMENT: Tick = 250;

/// Lifecycle events raised to the registered event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sps30Event {
    /// A measurement cycle completed; the snapshot getters are fresh.
    Update,
    /// The protocol failed; the previous snapshot is stale and the driver
    /// is reinitializing itself.
    Error,
}

/// Protocol state, advanced exclusively by [`Sps30::task_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Error,
    Initialize,
    GetSerialNumber,
    ReadSerialNumber,
    Ready,
    StartMeasurement,
    SetDataReadyFlag,
    ReadDataReadyFlag,
    GetMeasurementData,
    ReadMeasurementData,
    StopMeasurement,
}

/// Start-measurement payload: command 0x0010, argument 0x0300 (big-endian
/// float output format) plus the argument's checksum.
const START_MEASUREMENT: [u8; 5] = {
    let args = [0x03, 0x00];
    [0x00, 0x10, args[0], args[1], crc8(&args)]
};

/// I²C command payloads sent to the sensor.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Command {
    GetSerialNumber,
    StartMeasurement,
    SetDataReadyFlag,
    GetMeasurementData,
    StopMeasurement,
}

impl Command {
    const fn as_bytes(self) -> &'static [u8] {
        match self {
            Command::GetSerialNumber => &[0xD0, 0x33],
            Command::StartMeasurement => &START_MEASUREMENT,
            Command::SetDataReadyFlag => &[0x02, 0x02],
            Command::GetMeasurementData => &[0x03, 0x00],
            Command::StopMeasurement => &[0x01, 0x04],
        }
    }
}

/// Driver for the SPS30 sensor.
///
/// `H` is the event handler type; it defaults to a plain function pointer
/// so a driver without a handler needs no annotations. Closures work too,
/// but fix the handler type at first registration.
pub struct Sps30<I2C, H = fn(Sps30Event)> {
    /// The concrete I²C device implementation.
    i2c: I2C,
    /// The I²C device address.
    address: u8,
    state: State,
    update_interval: Tick,
    measurement: Measurement,
    measurement_valid: bool,
    serial: Option<[u8; 32]>,
    handler: Option<H>,
    interval_task: TaskId,
    step_task: TaskId,
}

/// Snapshot access and event wiring. None of these touch the bus.
impl<I2C, H> Sps30<I2C, H> {
    /// Register the event handler, replacing any previous registration.
    ///
    /// Only the most recent registration receives events; there is no
    /// queuing.
    pub fn set_event_handler(&mut self, handler: H) {
        self.handler = Some(handler);
    }

    /// The last decoded mass concentration record, or `None` while no
    /// valid measurement is held.
    pub fn mass_concentration(&self) -> Option<MassConcentration> {
        self.measurement_valid
            .then(|| self.measurement.mass_concentration)
    }

    /// The last decoded number concentration record, or `None` while no
    /// valid measurement is held.
    pub fn number_concentration(&self) -> Option<NumberConcentration> {
        self.measurement_valid
            .then(|| self.measurement.number_concentration)
    }

    /// The last decoded typical particle size [µm], or `None` while no
    /// valid measurement is held.
    pub fn typical_particle_size(&self) -> Option<f32> {
        self.measurement_valid
            .then(|| self.measurement.typical_particle_size)
    }

    /// The device serial number read during initialization, or `None`
    /// before the first successful read (or if the device reports
    /// something that is not UTF-8).
    pub fn serial_number(&self) -> Option<&str> {
        let raw = self.serial.as_ref()?;
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        core::str::from_utf8(&raw[..len]).ok()
    }

    /// Id of the periodic trigger task, for embedder dispatch to
    /// [`Sps30::task_interval`].
    pub fn interval_task_id(&self) -> TaskId {
        self.interval_task
    }

    /// Id of the protocol step task, for embedder dispatch to
    /// [`Sps30::task_step`].
    pub fn step_task_id(&self) -> TaskId {
        self.step_task
    }

    /// Destroy driver instance, return I²C bus instance.
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

/// Driver lifecycle and the scheduler-invoked task entry points.
impl<I2C, H> Sps30<I2C, H>
where
    I2C: I2c<SevenBitAddress>,
    H: FnMut(Sps30Event),
{
    /// Create a new driver instance and register its two tasks.
    ///
    /// The step task is planned to run the initialization sequence after a
    /// short startup delay; the interval task stays dormant until
    /// [`Sps30::set_update_interval`] enables it. The bus must already be
    /// configured for 100 kHz.
    pub fn new(i2c: I2C, address: u8, scheduler: &mut impl Scheduler) -> Self {
        let interval_task = scheduler.register(TICK_INFINITY);
        let step_task = scheduler.register(DELAY_RUN);

        Self {
            i2c,
            address,
            state: State::Initialize,
            update_interval: TICK_INFINITY,
            measurement: Measurement::default(),
            measurement_valid: false,
            serial: None,
            handler: None,
            interval_task,
            step_task,
        }
    }

    /// Configure periodic measurement triggering.
    ///
    /// [`TICK_INFINITY`] disables the periodic trigger (an already planned
    /// firing still occurs). Any finite interval plans the first trigger
    /// after a settling delay; subsequent triggers repeat at exactly
    /// `interval` from their own firing tick.
    pub fn set_update_interval(&mut self, scheduler: &mut impl Scheduler, interval: Tick) {
        self.update_interval = interval;

        if interval == TICK_INFINITY {
            scheduler.plan_absolute(self.interval_task, TICK_INFINITY);
        } else {
            scheduler.plan_from_now(self.interval_task, DELAY_INITIALIZE);
        }
    }

    /// Request one measurement cycle.
    ///
    /// Accepted only while the driver is idle and initialized; returns
    /// whether the request was accepted. A rejected request is dropped, it
    /// is not queued.
    pub fn measure(&mut self, scheduler: &mut impl Scheduler) -> bool {
        if self.state != State::Ready {
            return false;
        }

        self.state = State::StartMeasurement;
        scheduler.plan_now(self.step_task);

        true
    }

    /// Periodic trigger task. Dispatch here when the task behind
    /// [`Sps30::interval_task_id`] fires.
    pub fn task_interval(&mut self, scheduler: &mut impl Scheduler) {
        self.measure(scheduler);

        scheduler.plan_current_relative(self.update_interval);
    }

    /// Protocol step task. Dispatch here when the task behind
    /// [`Sps30::step_task_id`] fires.
    ///
    /// Runs protocol states back to back until one has to wait for the
    /// sensor (it then plans its own resumption and returns) or the
    /// machine reaches the idle state.
    pub fn task_step(&mut self, scheduler: &mut impl Scheduler) {
        loop {
            #[cfg(feature = "defmt")]
            defmt::trace!("state: {}", self.state);

            match self.state {
                State::Error => {
                    self.measurement_valid = false;
                    self.raise(Sps30Event::Error);

                    #[cfg(feature = "defmt")]
                    defmt::warn!("protocol failed, reinitializing");

                    self.state = State::Initialize;
                    scheduler.plan_current_from_now(DELAY_RUN);

                    return;
                }
                State::Ready => {
                    return;
                }
                State::Initialize => {
                    self.state = State::GetSerialNumber;
                }
                State::GetSerialNumber => {
                    self.state = State::Error;

                    if self.write(Command::GetSerialNumber).is_err() {
                        continue;
                    }

                    self.state = State::ReadSerialNumber;
                    scheduler.plan_current_from_now(DELAY_READ);

                    return;
                }
                State::ReadSerialNumber => {
                    self.state = State::Error;

                    let mut buf = [0u8; 48];
                    if self.read(&mut buf).is_err() {
                        continue;
                    }

                    let Ok(id_words) = decode_words::<16>(&buf) else {
                        continue;
                    };

                    let mut serial = [0u8; 32];
                    for (pair, word) in serial.chunks_exact_mut(2).zip(id_words) {
                        pair.copy_from_slice(&word.to_be_bytes());
                    }
                    self.serial = Some(serial);

                    self.state = State::Ready;
                }
                State::StartMeasurement => {
                    self.state = State::Error;

                    if self.write(Command::StartMeasurement).is_err() {
                        continue;
                    }

                    self.state = State::SetDataReadyFlag;
                }
                State::SetDataReadyFlag => {
                    self.state = State::Error;

                    if self.write(Command::SetDataReadyFlag).is_err() {
                        continue;
                    }

                    self.state = State::ReadDataReadyFlag;
                    scheduler.plan_current_from_now(DELAY_READ);

                    return;
                }
                State::ReadDataReadyFlag => {
                    self.state = State::Error;

                    let mut buf = [0u8; 3];
                    if self.read(&mut buf).is_err() {
                        continue;
                    }

                    let Ok([flag]) = decode_words::<1>(&buf) else {
                        continue;
                    };

                    if (flag & 0x00FF) == 0x01 {
                        self.state = State::GetMeasurementData;
                    } else {
                        // Not an error: the sensor has no new data yet.
                        self.state = State::ReadDataReadyFlag;
                        scheduler.plan_current_from_now(DELAY_MEASUREMENT);

                        return;
                    }
                }
                State::GetMeasurementData => {
                    self.state = State::Error;

                    if self.write(Command::GetMeasurementData).is_err() {
                        continue;
                    }

                    self.state = State::ReadMeasurementData;
                    scheduler.plan_current_from_now(DELAY_READ);

                    return;
                }
                State::ReadMeasurementData => {
                    self.state = State::Error;

                    let mut buf = [0u8; 60];
                    if self.read(&mut buf).is_err() {
                        continue;
                    }

                    let Ok(data_words) = decode_words::<20>(&buf) else {
                        continue;
                    };

                    self.measurement = Measurement::from_words(&data_words);
                    self.measurement_valid = true;
                    self.raise(Sps30Event::Update);

                    self.state = State::StopMeasurement;
                }
                State::StopMeasurement => {
                    self.state = State::Error;

                    if self.write(Command::StopMeasurement).is_err() {
                        continue;
                    }

                    self.state = State::Ready;
                }
            }
        }
    }

    /// Write an I²C command payload to the sensor.
    fn write(&mut self, command: Command) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, command.as_bytes())
    }

    /// Fill `buf` from the sensor.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), I2C::Error> {
        self.i2c.read(self.address, buf)
    }

    fn raise(&mut self, event: Sps30Event) {
        if let Some(handler) = self.handler.as_mut() {
            handler(event);
        }
    }
}
