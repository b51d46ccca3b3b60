use std::io::Write;

/// Six-dot cell pattern for `ch`. Bit n is dot n+1; letters are
/// case-insensitive and anything outside a-z and space is all dots off.
pub fn dots_for(ch: char) -> u8 {
    match ch.to_ascii_lowercase() {
        'a' => 0b000001,
        'b' => 0b000011,
        'c' => 0b001001,
        'd' => 0b011001,
        'e' => 0b010001,
        'f' => 0b001011,
        'g' => 0b011011,
        'h' => 0b010011,
        'i' => 0b001010,
        'j' => 0b011010,
        'k' => 0b000101,
        'l' => 0b000111,
        'm' => 0b001101,
        'n' => 0b011101,
        'o' => 0b010101,
        'p' => 0b001111,
        'q' => 0b011111,
        'r' => 0b010111,
        's' => 0b001110,
        't' => 0b011110,
        'u' => 0b100101,
        'v' => 0b100111,
        // Standard dots 2-4-5-6 cell, distinct from j.
        'w' => 0b111010,
        'x' => 0b101101,
        'y' => 0b111101,
        'z' => 0b110101,
        _ => 0,
    }
}

/// Drives the tactile cell: one byte per position.
///
/// Write failures are logged and swallowed so a flaky actuator never stops
/// the reading session.
pub struct Actuator<W: Write> {
    out: Option<W>,
    failures: u64,
}

impl<W: Write> Actuator<W> {
    pub fn new(out: W) -> Self {
        Self { out: Some(out), failures: 0 }
    }

    /// An actuator with nothing attached.
    pub fn disconnected() -> Self {
        Self { out: None, failures: 0 }
    }

    /// Emit the cell for `ch`, returning the byte that was (or would have been) written.
    pub fn show(&mut self, ch: char) -> u8 {
        let dots = dots_for(ch);
        if let Some(out) = self.out.as_mut() {
            if let Err(err) = out.write_all(&[dots]).and_then(|_| out.flush()) {
                self.failures += 1;
                log::warn!("Actuator write failed ({} so far): {}", self.failures, err);
            }
        }
        dots
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}
