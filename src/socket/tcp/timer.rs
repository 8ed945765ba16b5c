use crate::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running { elapsed: Duration },
}

/// A single retransmission countdown with exponential back-off.
///
/// The timer only advances when it is ticked; it never samples a clock.
#[derive(Debug, Clone)]
pub struct RetransmissionTimer {
    state: State,
    initial_rto: Duration,
    rto: Duration,
    retries: u32,
}

impl RetransmissionTimer {
    pub fn new(initial_rto: Duration) -> RetransmissionTimer {
        RetransmissionTimer {
            state: State::Idle,
            initial_rto,
            rto: initial_rto,
            retries: 0,
        }
    }

    /// Start counting from zero with the initial timeout and a clean retry count.
    pub fn start(&mut self) {
        self.state = State::Running {
            elapsed: Duration::ZERO,
        };
        self.rto = self.initial_rto;
        self.retries = 0;
    }

    /// Advance the timer by `delta`, and return whether it has expired.
    pub fn tick(&mut self, delta: Duration) -> bool {
        match self.state {
            State::Idle => false,
            State::Running { ref mut elapsed } => {
                *elapsed += delta;
                *elapsed >= self.rto
            }
        }
    }

    /// Rearm an expired timer.
    ///
    /// The timeout doubles only if the peer's window is open; a peer that
    /// advertised a zero window is probed at a steady rate. The retry count
    /// grows either way.
    pub fn back_off(&mut self, window_open: bool) {
        if window_open {
            self.rto *= 2;
            tcp_trace!("timer: doubling rto to {}", self.rto);
        }
        self.retries += 1;
        self.state = State::Running {
            elapsed: Duration::ZERO,
        };
    }

    /// Forget the back-off after new data was acknowledged.
    ///
    /// The timer keeps running only if something is still outstanding.
    pub fn reset(&mut self, outstanding: bool) {
        if outstanding {
            self.start();
        } else {
            self.close();
        }
    }

    /// Stop the timer.
    pub fn close(&mut self) {
        self.state = State::Idle;
        self.rto = self.initial_rto;
        self.retries = 0;
    }

    pub fn running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// Return the current timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Return how many times in a row the timer expired without progress.
    pub fn consecutive_retransmissions(&self) -> u32 {
        self.retries
    }
}
