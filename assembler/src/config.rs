//! Assembler configuration options

/// Configuration options for a single assembly run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Insert `WIDE` prefixes for variable slots above 255
    pub auto_wide: bool,
    /// Emit an image even when errors were reported
    pub force: bool,
    /// Append the method and label symbol blocks to the image
    pub debug_symbols: bool,
}

impl AssemblerConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable automatic `WIDE` insertion
    pub fn with_auto_wide(mut self, auto_wide: bool) -> Self {
        self.auto_wide = auto_wide;
        self
    }

    /// Enable or disable writing output despite errors
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Enable or disable debug symbol emission
    pub fn with_debug_symbols(mut self, debug_symbols: bool) -> Self {
        self.debug_symbols = debug_symbols;
        self
    }
}
