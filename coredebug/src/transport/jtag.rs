//! The JTAG transaction protocol of the debug port.
//!
//! A logical access is a fixed sequence of scans: select the transaction register and write the
//! transaction command, write the address register, then shift the data register. The TAP runs the
//! transaction while it sits in Run-Test/Idle after a scan, and increments the address after every
//! data access, so contiguous accesses only write the address once.

use std::time::{Duration, Instant};

use bitfield::bitfield;
use bitvec::field::BitField;

use super::{AccessWidth, CoreSelector, RegisterTransport, ResetLine, TransportError};
use crate::probe::{CapturedBits, JtagAccess};

/// JTAG instruction register values of the debug port.
mod instruction {
    pub const STATUS: u32 = 0x8;
    pub const TRANSACTION: u32 = 0x9;
    pub const ADDRESS: u32 = 0xa;
    pub const DATA: u32 = 0xb;
}

const TRANSACTION_LEN: u32 = 4;
const WORD_LEN: u32 = 32;

/// Run-Test/Idle cycles after each scan, raised whenever a memory transaction is still busy.
const DEFAULT_IDLE_CYCLES: u8 = 2;

/// Transaction commands of the debug port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, docsplay::Display)]
pub enum Transaction {
    /// memory write
    WriteMemory = 0x0,
    /// core register write
    WriteCore = 0x1,
    /// aux register write
    WriteAux = 0x2,
    /// no-op
    Nop = 0x3,
    /// memory read
    ReadMemory = 0x4,
    /// core register read
    ReadCore = 0x5,
    /// aux register read
    ReadAux = 0x6,
}

impl Transaction {
    fn is_memory(self) -> bool {
        matches!(self, Transaction::ReadMemory | Transaction::WriteMemory)
    }

    /// Address increment the TAP applies after each data access.
    fn address_step(self) -> u32 {
        if self.is_memory() {
            4
        } else {
            1
        }
    }
}

bitfield! {
    /// The debug port status register.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct JtagStatus(u32);
    impl Debug;
    /// The core is stalled.
    pub stalled, _: 0;
    /// The last transaction failed.
    pub failure, _: 1;
    /// The last transaction completed.
    pub ready, _: 2;
    /// The program counter was selected for the last transaction.
    pub pc_select, _: 3;
    /// The core is running.
    pub running, _: 4;
}

/// [`RegisterTransport`] implementation on top of a JTAG probe.
pub struct JtagTransport<P> {
    probe: P,
    selected: Option<CoreSelector>,
    ready_timeout: Duration,
}

impl<P: JtagAccess> JtagTransport<P> {
    /// Create a transport using `probe`.
    pub fn new(mut probe: P) -> Self {
        probe.set_idle_cycles(DEFAULT_IDLE_CYCLES);
        Self {
            probe,
            selected: None,
            ready_timeout: Duration::from_millis(100),
        }
    }

    /// Set how long a memory transaction may take before it is reported as timed out.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Access the underlying probe.
    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    /// Destroy the transport and return the probe.
    pub fn into_inner(self) -> P {
        self.probe
    }

    /// Read the status register of a core.
    pub fn status(&mut self, core: CoreSelector) -> Result<JtagStatus, TransportError> {
        self.select(core)?;
        let bits = self.probe.read_register(instruction::STATUS, WORD_LEN)?;
        Ok(JtagStatus(word(&bits)?))
    }

    fn select(&mut self, core: CoreSelector) -> Result<(), TransportError> {
        if self.selected != Some(core) {
            tracing::trace!("Selecting {}", core);
            self.probe.select_target(core.0)?;
            self.selected = Some(core);
        }
        Ok(())
    }

    fn set_transaction(&mut self, transaction: Transaction) -> Result<(), TransportError> {
        self.probe.write_register(
            instruction::TRANSACTION,
            &[transaction as u8],
            TRANSACTION_LEN,
        )?;
        Ok(())
    }

    fn write_address(&mut self, address: u32) -> Result<(), TransportError> {
        self.probe
            .write_register(instruction::ADDRESS, &address.to_le_bytes(), WORD_LEN)?;
        Ok(())
    }

    fn wait_ready(
        &mut self,
        core: CoreSelector,
        transaction: Transaction,
        address: u32,
    ) -> Result<(), TransportError> {
        let start = Instant::now();
        let mut busy = false;

        loop {
            let status = self.status(core)?;
            if status.failure() {
                return Err(TransportError::TransactionFailed(transaction, address));
            }
            if status.ready() {
                return Ok(());
            }
            if !busy {
                busy = true;
                let idle_cycles = self.probe.idle_cycles().saturating_add(1);
                tracing::trace!("{} busy, raising idle cycles to {}", transaction, idle_cycles);
                self.probe.set_idle_cycles(idle_cycles);
            }
            if start.elapsed() >= self.ready_timeout {
                tracing::warn!("{} transaction at {:#010x} did not complete", transaction, address);
                return Err(TransportError::Timeout(transaction, address));
            }

            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Check the status after a batch and leave the TAP in a neutral transaction.
    ///
    /// `address` is the last address accessed by the batch.
    fn finish(
        &mut self,
        core: CoreSelector,
        transaction: Transaction,
        address: u32,
    ) -> Result<(), TransportError> {
        // The last memory access may still be in flight.
        if transaction.is_memory() {
            self.wait_ready(core, transaction, address)?;
        }
        self.set_transaction(Transaction::Nop)?;

        if self.status(core)?.failure() {
            return Err(TransportError::TransactionFailed(transaction, address));
        }
        Ok(())
    }

    fn read_batch(
        &mut self,
        core: CoreSelector,
        transaction: Transaction,
        addresses: &[u32],
    ) -> Result<Vec<u32>, TransportError> {
        let (Some(&first), Some(&last)) = (addresses.first(), addresses.last()) else {
            return Ok(vec![]);
        };

        tracing::debug!(
            "{}: {} x {} starting at {:#x}",
            core,
            addresses.len(),
            transaction,
            first
        );

        self.select(core)?;
        self.set_transaction(Transaction::Nop)?;
        self.set_transaction(transaction)?;

        let mut values = Vec::with_capacity(addresses.len());
        let mut next_address = None;
        for &address in addresses {
            if next_address != Some(address) {
                self.write_address(address)?;
            }
            if transaction.is_memory() {
                self.wait_ready(core, transaction, address)?;
            }

            let bits = self.probe.read_register(instruction::DATA, WORD_LEN)?;
            values.push(word(&bits)?);
            next_address = address.checked_add(transaction.address_step());
        }

        self.finish(core, transaction, last)?;

        Ok(values)
    }

    fn write_batch(
        &mut self,
        core: CoreSelector,
        transaction: Transaction,
        writes: &[(u32, u32)],
    ) -> Result<(), TransportError> {
        let (Some(&(first, _)), Some(&(last, _))) = (writes.first(), writes.last()) else {
            return Ok(());
        };

        tracing::debug!(
            "{}: {} x {} starting at {:#x}",
            core,
            writes.len(),
            transaction,
            first
        );

        self.select(core)?;
        self.set_transaction(Transaction::Nop)?;
        self.set_transaction(transaction)?;

        let mut next_address = None;
        for &(address, value) in writes {
            if next_address != Some(address) {
                self.write_address(address)?;
            }
            if transaction.is_memory() {
                self.wait_ready(core, transaction, address)?;
            }

            self.probe
                .write_register(instruction::DATA, &value.to_le_bytes(), WORD_LEN)?;
            next_address = address.checked_add(transaction.address_step());
        }

        self.finish(core, transaction, last)
    }

    fn read_words(
        &mut self,
        core: CoreSelector,
        address: u32,
        count: usize,
    ) -> Result<Vec<u32>, TransportError> {
        let addresses = (0..count as u32)
            .map(|index| address + index * 4)
            .collect::<Vec<_>>();
        self.read_batch(core, Transaction::ReadMemory, &addresses)
    }
}

impl<P: JtagAccess> RegisterTransport for JtagTransport<P> {
    fn read_core_registers(
        &mut self,
        core: CoreSelector,
        numbers: &[u32],
    ) -> Result<Vec<u32>, TransportError> {
        self.read_batch(core, Transaction::ReadCore, numbers)
    }

    fn write_core_registers(
        &mut self,
        core: CoreSelector,
        writes: &[(u32, u32)],
    ) -> Result<(), TransportError> {
        self.write_batch(core, Transaction::WriteCore, writes)
    }

    fn read_aux_registers(
        &mut self,
        core: CoreSelector,
        numbers: &[u32],
    ) -> Result<Vec<u32>, TransportError> {
        self.read_batch(core, Transaction::ReadAux, numbers)
    }

    fn write_aux_registers(
        &mut self,
        core: CoreSelector,
        writes: &[(u32, u32)],
    ) -> Result<(), TransportError> {
        self.write_batch(core, Transaction::WriteAux, writes)
    }

    fn read_memory(
        &mut self,
        core: CoreSelector,
        address: u32,
        width: AccessWidth,
        count: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let len = count * width.bytes() as usize;
        if len == 0 {
            return Ok(vec![]);
        }
        let (start, end) = word_span(address, len)?;

        let words = self.read_words(core, start, ((end - start) / 4) as usize)?;
        let bytes = words
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect::<Vec<_>>();

        let offset = (address - start) as usize;
        Ok(bytes[offset..offset + len].to_vec())
    }

    fn write_memory(
        &mut self,
        core: CoreSelector,
        address: u32,
        width: AccessWidth,
        data: &[u8],
    ) -> Result<(), TransportError> {
        if data.len() % width.bytes() as usize != 0 {
            return Err(TransportError::InvalidLength {
                address,
                len: data.len(),
            });
        }
        if data.is_empty() {
            return Ok(());
        }
        let (start, end) = word_span(address, data.len())?;

        let mut buffer = vec![0u8; (end - start) as usize];
        let offset = (address - start) as usize;

        // The debug port only does word accesses, partial words are read back first.
        if offset != 0 {
            let head = self.read_words(core, start, 1)?;
            buffer[..4].copy_from_slice(&head[0].to_le_bytes());
        }
        if (offset + data.len()) % 4 != 0 {
            let tail = self.read_words(core, end - 4, 1)?;
            let tail_offset = buffer.len() - 4;
            buffer[tail_offset..].copy_from_slice(&tail[0].to_le_bytes());
        }
        buffer[offset..offset + data.len()].copy_from_slice(data);

        let writes = buffer
            .chunks_exact(4)
            .enumerate()
            .map(|(index, chunk)| {
                (
                    start + index as u32 * 4,
                    u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                )
            })
            .collect::<Vec<_>>();

        self.write_batch(core, Transaction::WriteMemory, &writes)
    }

    fn read_status(&mut self, core: CoreSelector) -> Result<u32, TransportError> {
        Ok(self.status(core)?.0)
    }

    fn set_reset_line(&mut self, line: ResetLine, asserted: bool) -> Result<(), TransportError> {
        tracing::debug!("{:?} reset line asserted: {}", line, asserted);

        match (line, asserted) {
            (ResetLine::System, true) => self.probe.target_reset_assert()?,
            (ResetLine::System, false) => self.probe.target_reset_deassert()?,
            (ResetLine::Test, true) => self.probe.test_reset_assert()?,
            (ResetLine::Test, false) => self.probe.test_reset_deassert()?,
        }

        // Resetting the TAP also resets the selection.
        if line == ResetLine::Test {
            self.selected = None;
        }

        Ok(())
    }
}

fn word(bits: &CapturedBits) -> Result<u32, TransportError> {
    if bits.len() < WORD_LEN as usize {
        return Err(TransportError::ShortCapture(bits.len(), WORD_LEN as usize));
    }
    Ok(bits[..WORD_LEN as usize].load_le::<u32>())
}

/// The word aligned address range covering `len` bytes at `address`.
fn word_span(address: u32, len: usize) -> Result<(u32, u32), TransportError> {
    let end = u32::try_from(len)
        .ok()
        .and_then(|len| address.checked_add(len))
        .and_then(|end| end.checked_add(3))
        .ok_or(TransportError::InvalidLength { address, len })?;

    Ok((address & !3, end & !3))
}
