//! Per-connection counters shared by the reception loop and command senders.

/// Key count the bench tooling starts from
pub const DEFAULT_INITIAL_KEY_COUNT: u8 = 1;

/// State of one open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    key_count: u8,
    error_count: u64,
    frames_received: u64,
    keep_alive: bool,
}

impl ConnectionState {
    /// Fresh state with the given first key count
    pub fn new(initial_key_count: u8) -> Self {
        Self {
            key_count: initial_key_count,
            error_count: 0,
            frames_received: 0,
            keep_alive: true,
        }
    }

    /// Key count the next key press will carry
    pub fn key_count(&self) -> u8 {
        self.key_count
    }

    /// Return the current key count and advance it, wrapping after 0xFF
    pub fn take_key_count(&mut self) -> u8 {
        let current = self.key_count;
        self.key_count = self.key_count.wrapping_add(1);
        current
    }

    /// Count a checksum or framing failure; returns the new total
    pub fn record_checksum_error(&mut self) -> u64 {
        self.error_count += 1;
        self.error_count
    }

    /// Checksum and framing failures seen so far
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Count a validated frame
    pub fn record_frame(&mut self) {
        self.frames_received += 1;
    }

    /// Validated frames seen so far
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Whether the reception loop should keep running
    pub fn is_alive(&self) -> bool {
        self.keep_alive
    }

    /// Ask the reception loop to stop after its current read
    pub fn stop(&mut self) {
        self.keep_alive = false;
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_KEY_COUNT)
    }
}
