//! Cache maintenance.
//!
//! The debug port reads and writes memory behind the caches. Dirty data cache lines are written
//! back before memory is read, and both caches are invalidated after memory was written. Each
//! happens at most once between two halts.

use super::Core;
use crate::Error;

#[derive(Debug, Clone, Copy)]
pub(crate) struct CacheState {
    pub(crate) dcache_flushed: bool,
    pub(crate) caches_invalidated: bool,
    pub(crate) dcache_flush_enabled: bool,
}

impl CacheState {
    pub(crate) fn new(dcache_flush_enabled: bool) -> Self {
        Self {
            dcache_flushed: false,
            caches_invalidated: false,
            dcache_flush_enabled,
        }
    }
}

impl Core<'_> {
    /// Forget about cache maintenance done so far. Called whenever the core executed code.
    pub fn reset_cache_state(&mut self) {
        self.state.cache.dcache_flushed = false;
        self.state.cache.caches_invalidated = false;
    }

    /// Enable or disable flushing the data cache before memory reads.
    pub fn set_dcache_flush(&mut self, enabled: bool) {
        self.state.cache.dcache_flush_enabled = enabled;
    }

    /// Whether the data cache is flushed before memory reads.
    pub fn dcache_flush_enabled(&self) -> bool {
        self.state.cache.dcache_flush_enabled
    }

    /// Write back dirty data cache lines.
    pub fn flush_data_cache(&mut self) -> Result<(), Error> {
        if self.state.cache.dcache_flushed || !self.state.cache.dcache_flush_enabled {
            return Ok(());
        }
        let Some(dcache) = self.state.variant.caches.data.clone() else {
            return Ok(());
        };

        tracing::debug!("{}: flushing data cache", self.state.selector);

        let core = self.state.selector;
        let control = self.transport.read_register(core, dcache.control)?;
        self.transport
            .write_register(core, dcache.control, control | dcache.flush_mode)?;
        self.transport
            .write_register(core, dcache.invalidate, dcache.command)?;
        self.transport.write_register(core, dcache.control, control)?;

        self.state.cache.dcache_flushed = true;
        Ok(())
    }

    /// Invalidate the instruction and data caches.
    pub fn invalidate_caches(&mut self) -> Result<(), Error> {
        if self.state.cache.caches_invalidated {
            return Ok(());
        }

        let core = self.state.selector;
        let caches = self.state.variant.caches.clone();

        if let Some(icache) = &caches.instruction {
            tracing::debug!("{}: invalidating instruction cache", core);
            self.transport
                .write_register(core, icache.invalidate, icache.command)?;
        }

        if let Some(dcache) = &caches.data {
            tracing::debug!("{}: invalidating data cache", core);
            let control = self.transport.read_register(core, dcache.control)?;
            self.transport
                .write_register(core, dcache.control, control & !dcache.flush_mode)?;
            self.transport
                .write_register(core, dcache.invalidate, dcache.command)?;
            self.transport.write_register(core, dcache.control, control)?;
        }

        self.state.cache.caches_invalidated = true;
        Ok(())
    }
}
