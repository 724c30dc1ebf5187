const DEFAULT_CAPACITY: usize = 1024 * 1024;
const DEFAULT_NWORKERS: usize = 8;

/// Construction parameters of a ring buffer.
#[derive(Debug, Clone)]
pub struct RingbufSettings {
    pub(crate) capacity: usize,
    pub(crate) nworkers: usize,
}

#[derive(Default)]
pub struct RingbufSettingsBuilder {
    capacity: Option<usize>,
    nworkers: Option<usize>,
}

impl RingbufSettingsBuilder {
    pub fn new() -> Self {
        RingbufSettingsBuilder::default()
    }

    /// Set the ring buffer capacity in bytes. Offsets are 32-bit, so
    /// the capacity must stay below `u32::MAX`.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the number of registerable producer slots.
    pub fn nworkers(mut self, nworkers: usize) -> Self {
        self.nworkers = Some(nworkers);
        self
    }

    pub fn build(self) -> RingbufSettings {
        let capacity = self.capacity.unwrap_or(DEFAULT_CAPACITY);
        let nworkers = self.nworkers.unwrap_or(DEFAULT_NWORKERS);

        RingbufSettings { capacity, nworkers }
    }
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_CAPACITY;
    use super::DEFAULT_NWORKERS;

    #[test]
    fn test_default_settings() {
        let settings = super::RingbufSettingsBuilder::new().build();

        assert_eq!(settings.capacity, DEFAULT_CAPACITY);
        assert_eq!(settings.nworkers, DEFAULT_NWORKERS);
    }

    #[test]
    fn test_settings() {
        let settings = super::RingbufSettingsBuilder::new()
            .capacity(4096)
            .nworkers(2)
            .build();

        assert_eq!(settings.capacity, 4096);
        assert_eq!(settings.nworkers, 2);
    }
}
