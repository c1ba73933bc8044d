use parking_lot::Mutex;

/// Number of low bits reserved for the server identifier.
pub const SERVER_ID_BITS: u32 = 16;

const COUNTER_MASK: u64 = (1 << 48) - 1;

/// Source of server-unique, globally ordered identifiers.
///
/// A tick is `counter << 16 | server_id`. The counter only ever grows; one
/// generator is created per process (or per test) and shared by reference.
#[derive(Debug)]
pub struct TickGenerator {
    server_id: u16,
    current: Mutex<u64>,
}

impl TickGenerator {
    /// Generator with a random server identifier.
    pub fn new() -> Self {
        Self::with_server_id(rand::random::<u16>())
    }

    pub fn with_server_id(server_id: u16) -> Self {
        TickGenerator {
            server_id,
            current: Mutex::new(0),
        }
    }

    pub fn server_id(&self) -> u16 {
        self.server_id
    }

    pub fn new_tick(&self) -> u64 {
        let counter = {
            let mut current = self.current.lock();
            *current = (*current + 1) & COUNTER_MASK;
            *current
        };

        (counter << SERVER_ID_BITS) | self.server_id as u64
    }

    /// Raises the counter to the counter part of `tick` if that is larger.
    pub fn observe_tick(&self, tick: u64) {
        let seen = tick >> SERVER_ID_BITS;
        let mut current = self.current.lock();

        if *current < seen {
            *current = seen;
        }
    }

    /// Counter part of the last tick handed out or observed.
    pub fn current(&self) -> u64 {
        *self.current.lock()
    }
}

impl Default for TickGenerator {
    fn default() -> Self {
        Self::new()
    }
}
