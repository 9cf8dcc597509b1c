use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::topic::WriteCommand;
use super::{Bridge, Publisher};
use crate::core::BridgeConfig;
use crate::protocol::ProtocolEngine;
use crate::util::IntervalTimer;

/// Single-threaded driver of the engine and the bridge
///
/// Each iteration waits for at most one engine event, runs whichever
/// periodic jobs are due and then drains the write-command queue. The loop
/// owns all gateway state; other threads reach it only through the queue
/// and the shutdown flag.
pub struct PollingLoop<E, P> {
    engine: E,
    bridge: Bridge<P>,
    commands: mpsc::Receiver<WriteCommand>,
    shutdown: Arc<AtomicBool>,
    receive_timeout: Duration,
    engine_timer: IntervalTimer,
    maintenance: IntervalTimer,
    renewal: IntervalTimer,
    who_is: IntervalTimer,
}

impl<E: ProtocolEngine, P: Publisher> PollingLoop<E, P> {
    /// Creates a new polling loop
    pub fn new(
        config: &BridgeConfig,
        engine: E,
        publisher: P,
        commands: mpsc::Receiver<WriteCommand>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let now = Instant::now();
        PollingLoop {
            engine,
            bridge: Bridge::new(config, publisher),
            commands,
            shutdown,
            receive_timeout: config.receive_timeout,
            engine_timer: IntervalTimer::new(config.engine_timer_interval, now),
            maintenance: IntervalTimer::new(config.maintenance_interval, now),
            renewal: IntervalTimer::new(config.renewal_interval, now),
            who_is: IntervalTimer::new(config.who_is_interval(), now),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn bridge(&self) -> &Bridge<P> {
        &self.bridge
    }

    /// Restarts every timer at `now` and announces the gateway with a Who-Is
    pub fn start(&mut self, now: Instant) {
        for timer in [
            &mut self.engine_timer,
            &mut self.maintenance,
            &mut self.renewal,
            &mut self.who_is,
        ] {
            timer.reset(now);
        }
        self.send_who_is();
    }

    /// Runs one iteration of the loop
    pub fn poll_once(&mut self, now: Instant) {
        if let Some(event) = self.engine.receive(self.receive_timeout) {
            self.bridge.dispatch(&mut self.engine, event, SystemTime::now());
        }

        if let Some(elapsed) = self.engine_timer.fire(now) {
            self.engine.expire_timers(elapsed);
        }

        if let Some(elapsed) = self.maintenance.fire(now) {
            self.engine.maintain(elapsed);
            self.bridge.retry_stalled(&mut self.engine, SystemTime::now());
        }

        if self.renewal.fire(now).is_some() {
            self.bridge.renew(&mut self.engine, SystemTime::now());
        }

        if self.who_is.fire(now).is_some() {
            self.send_who_is();
        }

        self.drain_commands();
    }

    /// Polls until the shutdown flag is raised
    pub fn run(&mut self) {
        info!(who_is_interval = ?self.who_is.interval(), "polling loop started");
        self.start(Instant::now());
        while !self.shutdown.load(Ordering::Relaxed) {
            self.poll_once(Instant::now());
        }
        info!("polling loop stopped");
    }

    fn send_who_is(&mut self) {
        match self.engine.send_who_is() {
            Ok(()) => debug!("who-is sent"),
            Err(err) => warn!(error = %err, "failed to send who-is"),
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            // Errors are logged by the bridge
            let _ = self.bridge.write(&mut self.engine, &command);
        }
    }
}
