//! Value types carried in command and response packets

use std::fmt;

/// Number of output pins on port 1 (J1[0:7])
pub const OUTPUT_PIN_COUNT: u8 = 8;

/// Number of pulled-up input pins on port 2 (J2[0:3])
pub const INPUT_PIN_COUNT: u8 = 4;

/// Command sequence number
///
/// Stamped into byte 63 of every command and echoed back by the device so a
/// response can be matched to the command that produced it. Wraps at 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceNumber(pub u8);

impl SequenceNumber {
    /// The sequence number following this one (mod 256)
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Last-known state of the eight output pins
///
/// The device has no read-modify-write primitive for the output port, so a
/// partial (masked) write has to be merged with the previously written state
/// on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OutputState(pub u8);

impl OutputState {
    /// Merge a masked write into this state
    ///
    /// Bits set in `mask` take their value from `data`; all other bits keep
    /// their current value.
    pub fn merge(self, mask: u8, data: u8) -> Self {
        Self((self.0 & !mask) | (data & mask))
    }

    /// Whether output pin `pin` is driven on
    pub fn is_on(self, pin: u8) -> bool {
        pin < OUTPUT_PIN_COUNT && self.0 & (1 << pin) != 0
    }
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} ({:08b})", self.0, self.0)
    }
}

/// Input byte returned by the device
///
/// Bit `n` is set when input pin `n` is open (pulled high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InputPins(pub u8);

impl InputPins {
    /// Whether input pin `pin` is open
    pub fn is_open(self, pin: u8) -> bool {
        pin < INPUT_PIN_COUNT && self.0 & (1 << pin) != 0
    }

    /// Per-pin state of the wired input pins, lowest pin first
    pub fn pins(self) -> impl Iterator<Item = (u8, bool)> {
        (0..INPUT_PIN_COUNT).map(move |pin| (pin, self.is_open(pin)))
    }
}

impl fmt::Display for InputPins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} ({:08b})", self.0, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_wraps() {
        assert_eq!(SequenceNumber(0).next(), SequenceNumber(1));
        assert_eq!(SequenceNumber(254).next(), SequenceNumber(255));
        assert_eq!(SequenceNumber(255).next(), SequenceNumber(0));
    }

    #[test]
    fn test_merge_only_touches_masked_bits() {
        let state = OutputState(0b1010_1010);
        assert_eq!(state.merge(0x0f, 0xff), OutputState(0b1010_1111));
        assert_eq!(state.merge(0xf0, 0x00), OutputState(0b0000_1010));
        assert_eq!(state.merge(0x00, 0xff), state);
        assert_eq!(state.merge(0xff, 0x3c), OutputState(0x3c));
    }

    #[test]
    fn test_data_outside_mask_is_ignored() {
        let state = OutputState(0x00);
        assert_eq!(state.merge(0x01, 0xff), OutputState(0x01));
    }

    #[test]
    fn test_output_pin_state() {
        let state = OutputState(0x81);
        assert!(state.is_on(0));
        assert!(state.is_on(7));
        assert!(!state.is_on(1));
        assert!(!state.is_on(8));
    }

    #[test]
    fn test_input_pins() {
        let pins = InputPins(0x05);
        assert!(pins.is_open(0));
        assert!(!pins.is_open(1));
        assert!(pins.is_open(2));
        assert!(!pins.is_open(3));

        let states: Vec<_> = pins.pins().collect();
        assert_eq!(states, vec![(0, true), (1, false), (2, true), (3, false)]);
    }

    #[test]
    fn test_input_pins_ignore_unwired_bits() {
        let pins = InputPins(0xf0);
        assert!(pins.pins().all(|(_, open)| !open));
        assert!(!pins.is_open(4));
    }

    #[test]
    fn test_display() {
        assert_eq!(SequenceNumber(9).to_string(), "#9");
        assert_eq!(InputPins(0x05).to_string(), "0x05 (00000101)");
        assert_eq!(OutputState(0xa0).to_string(), "0xa0 (10100000)");
    }
}
