//! Transport coordinator.
//!
//! Owns the UART transport and the switch between UART and WebSocket. On
//! every tick it compares the configured transport with the one last
//! applied and switches if they differ: the old producer is disabled
//! (partial input discarded, sessions closed) before the new one is
//! enabled, so at most one producer feeds the command channel.
//!
//! A baud change arrives as the session's UART dirty flag and is applied
//! in place without a transport switch.

use crate::clock::Clock;
use crate::config::TransportMode;
use crate::outbound::{EventSink, Outbox};
use crate::session::SessionState;
use crate::status::{self, events};
use crate::uart::UartTransport;
use crate::web::WebSocketTransport;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Coordinator loop period.
pub const COORDINATOR_TICK: Duration = Duration::from_millis(5);

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Transport switched to this mode.
    pub switched_to: Option<TransportMode>,
    pub baud_applied: bool,
    pub commands_enqueued: usize,
    pub lines_written: usize,
    pub events_broadcast: usize,
}

pub struct TransportCoordinator {
    session: Arc<SessionState>,
    outbox: Arc<Outbox>,
    uart: UartTransport,
    ws: Arc<WebSocketTransport>,
    applied: Option<TransportMode>,
}

impl TransportCoordinator {
    pub fn new(
        session: Arc<SessionState>,
        outbox: Arc<Outbox>,
        uart: UartTransport,
        ws: Arc<WebSocketTransport>,
    ) -> Self {
        Self {
            session,
            outbox,
            uart,
            ws,
            applied: None,
        }
    }

    /// Transport currently producing, `None` before the first tick.
    pub fn active(&self) -> Option<TransportMode> {
        self.applied
    }

    pub fn uart(&self) -> &UartTransport {
        &self.uart
    }

    /// Advance once. Never blocks beyond a serial read.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let desired = self.session.transport();
        if self.applied != Some(desired) {
            self.switch_to(desired);
            report.switched_to = Some(desired);
        }

        if self.session.take_uart_dirty() {
            report.baud_applied = self.apply_uart_settings();
        }

        // Always polled: while disabled this drains and discards input
        report.commands_enqueued = self.uart.poll();
        report.lines_written = self.uart.flush_outgoing(self.outbox.uart_queue());
        if desired == TransportMode::Websocket {
            report.events_broadcast = self.ws.pump_broadcast();
        }
        report
    }

    fn switch_to(&mut self, mode: TransportMode) {
        match self.applied {
            Some(TransportMode::Uart) => self.uart.disable(),
            Some(TransportMode::Websocket) => self.ws.disable(),
            None => {
                self.uart.disable();
                self.ws.disable();
            }
        }
        match mode {
            TransportMode::Uart => self.uart.enable(),
            TransportMode::Websocket => self.ws.enable(),
        }
        info!(
            "[coord] transport {} -> {}",
            self.applied.map(|m| m.as_str()).unwrap_or("none"),
            mode
        );
        self.applied = Some(mode);
        self.outbox.emit(status::event_with_detail(
            events::TRANSPORT_MODE,
            mode.as_str(),
        ));
    }

    fn apply_uart_settings(&mut self) -> bool {
        let baud = self.session.snapshot().uart_baud;
        if baud == self.uart.baud() {
            return false;
        }
        match self.uart.set_baud(baud) {
            Ok(()) => true,
            Err(e) => {
                warn!("[coord] failed to set UART baud {}: {}", baud, e);
                self.outbox
                    .emit(status::warning("Failed to apply UART baud rate"));
                false
            }
        }
    }

    /// Coordinator task body.
    pub fn run(mut self, clock: Arc<dyn Clock>) -> ! {
        loop {
            self.tick();
            clock.sleep(COORDINATOR_TICK);
        }
    }
}
