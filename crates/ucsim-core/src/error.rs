//! Error taxonomy (§7). Nothing here is fatal: every error is a value
//! routed through an [`ErrorSink`], never a panic or a process exit.

use std::fmt;

use crate::fmt::hex_addr;
use crate::Addr;

/// §7 item 1-2: an access the memory subsystem could not honour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemError {
    pub kind: MemErrorKind,
    pub space: String,
    pub address: Addr,
    pub addr_bits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemErrorKind {
    /// Address outside `[start, start+size)` of the space.
    InvalidAddress,
    /// Inside the space, but no active decoder maps it.
    NonDecoded,
}

impl MemError {
    #[must_use]
    pub fn invalid_address(space: &str, address: Addr, addr_bits: u32) -> Self {
        Self {
            kind: MemErrorKind::InvalidAddress,
            space: space.to_string(),
            address,
            addr_bits,
        }
    }

    #[must_use]
    pub fn non_decoded(space: &str, address: Addr, addr_bits: u32) -> Self {
        Self {
            kind: MemErrorKind::NonDecoded,
            space: space.to_string(),
            address,
            addr_bits,
        }
    }
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            MemErrorKind::InvalidAddress => "invalid address",
            MemErrorKind::NonDecoded => "non decoded address",
        };
        write!(
            f,
            "{}: {} in space \"{}\"",
            what,
            hex_addr(self.address, self.addr_bits),
            self.space
        )
    }
}

impl std::error::Error for MemError {}

/// §7 item 3: a peripheral/debugger-facing configuration request was
/// refused. The operation that produced it leaves all state unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    #[must_use]
    pub fn bank_out_of_range(index: i64, count: usize) -> Self {
        Self {
            message: format!("bank index {index} out of range (0..{count})"),
        }
    }

    #[must_use]
    pub fn unknown_ticker(id: &str) -> Self {
        Self {
            message: format!("no such ticker: \"{id}\""),
        }
    }

    #[must_use]
    pub fn negative_ticker_id(id: i64) -> Self {
        Self {
            message: format!("ticker id must not be negative: {id}"),
        }
    }

    #[must_use]
    pub fn unknown_cpu_state(name: &str) -> Self {
        Self {
            message: format!("unknown CPU state: \"{name}\""),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// §7 item 6: a resource (usually a file) could not be obtained. The
/// command that needed it becomes a no-op.
#[derive(Debug)]
pub struct ResourceError {
    pub message: String,
    pub source: std::io::Error,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.message, self.source)
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// The sink every core error is routed through rather than printed or
/// panicked directly. A real debugger console would implement this by
/// writing to its active output; tests implement it by recording into a
/// `Vec<String>`.
pub trait ErrorSink {
    fn report_mem(&mut self, err: &MemError);
    fn report_config(&mut self, err: &ConfigError);
    fn report_resource(&mut self, err: &ResourceError);
}

/// An `ErrorSink` that records every report for later inspection —
/// useful in tests and as the default when no console is attached.
#[derive(Debug, Default, Clone)]
pub struct RecordingErrorSink {
    pub messages: Vec<String>,
}

impl ErrorSink for RecordingErrorSink {
    fn report_mem(&mut self, err: &MemError) {
        self.messages.push(err.to_string());
    }

    fn report_config(&mut self, err: &ConfigError) {
        self.messages.push(err.to_string());
    }

    fn report_resource(&mut self, err: &ResourceError) {
        self.messages.push(err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_address_message() {
        let e = MemError::invalid_address("code", 0x1_0000, 16);
        assert_eq!(e.to_string(), "invalid address: 0x10000 in space \"code\"");
    }

    #[test]
    fn non_decoded_message() {
        let e = MemError::non_decoded("sfr", 0x50, 16);
        assert_eq!(e.to_string(), "non decoded address: 0x0050 in space \"sfr\"");
    }

    #[test]
    fn sink_records_everything() {
        let mut sink = RecordingErrorSink::default();
        sink.report_mem(&MemError::invalid_address("code", 0, 16));
        sink.report_config(&ConfigError::unknown_ticker("foo"));
        assert_eq!(sink.messages.len(), 2);
    }
}
