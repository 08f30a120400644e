/// Runtime preferences. Limits are enforced by the runtime, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Payload alignment the byte code is laid out for. Zero means packed.
    pub alignment: usize,
    /// Deepest nesting of `BeginBlock` frames before the runtime faults.
    pub max_block_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            alignment: 0,
            max_block_depth: 64,
        }
    }
}
