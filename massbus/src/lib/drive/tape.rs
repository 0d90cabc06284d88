//! The TM78 formatter with a single TU78 transport.
//!
//! The formatter takes commands through two kinds of register. Motion
//! commands (rewind, space, write mark, sense and so on) arrive in one of
//! four per-slave motion registers and are answered in the motion interrupt
//! register. Data transfers arrive in the data command register and are
//! answered in the data interrupt register; the host is actually
//! interrupted by its data channel when the transfer ends, so the interrupt
//! code has to be in place before any data moves. Every data command ends
//! with exactly one transfer, empty if nothing could be sent.

use log::{debug, info, log_enabled, trace, warn, Level};
use std::cmp::Ordering;
use std::path::Path;

use massbus_utils::octprint::pretty_print_octal_halves_zero;
use massbus_utils::words::to_bcd;

use super::DriveBase;
use super::tape_protocol::*;
use crate::bitfiddler::{self, PackingMode};
use crate::catalog::TapeType;
use crate::command::CommandWord;
use crate::error::{MassbusError, MassbusResult};
use crate::storage::{ShareMode, TapeRecord, TapeStorage};

/// A TM78 formatter on the bus. Only slave transport 0 exists.
pub struct TapeDrive {
    pub(super) base: DriveBase,
    kind: TapeType,
    storage: Box<dyn TapeStorage>,
    buffer: Vec<u8>,
}

impl TapeDrive {
    pub(super) fn new(base: DriveBase, kind: TapeType, storage: Box<dyn TapeStorage>) -> Self {
        let mut drive = TapeDrive {
            base,
            kind,
            storage,
            buffer: Vec::new(),
        };
        drive.clear();
        drive
    }

    pub(super) fn attach(&mut self, path: &Path, read_only: bool, share: ShareMode) -> MassbusResult<()> {
        if self.base.image.is_some() {
            self.detach();
        }
        self.storage.open(path, read_only, share)
            .map_err(|source| MassbusError::Attach { path: path.display().to_string(), source })?;
        let granted = self.storage.is_read_only();
        self.base.attached(path, granted, share);
        self.clear();
        info!("Unit {} ({}) loaded with '{}'{}.", self.base.unit, self.kind.descriptor.name,
              path.display(), if granted { " write locked" } else { "" });
        Ok(())
    }

    pub(super) fn detach(&mut self) {
        if self.base.image.is_none() {
            return;
        }
        if self.base.online {
            self.go_offline();
        }
        self.storage.close();
        self.base.image = None;
        info!("Unit {} unloaded.", self.base.unit);
    }

    // The host finds out about write protection on its next sense.
    pub(super) fn set_read_only(&mut self, read_only: bool) {
        self.base.read_only = read_only;
    }

    pub(super) fn set_serial(&mut self, serial: u16) {
        self.base.serial = serial;
        self.base.set_reg(REG_SN, to_bcd(serial));
    }

    /// Bring the transport online and tell the host with an ONLINE motion
    /// interrupt. Unit status isn't touched; the host senses for it.
    pub(super) fn go_online(&mut self) -> MassbusResult<()> {
        if self.base.image.is_none() {
            return Err(MassbusError::NotAttached(format!("unit {}", self.base.unit)));
        }
        if self.base.online {
            return Ok(());
        }
        self.base.online = true;
        self.motion_interrupt(0, IC_ONLINE);
        info!("Unit {} online.", self.base.unit);
        Ok(())
    }

    /// A real transport just goes quiet; the host notices at its next command.
    pub(super) fn go_offline(&mut self) {
        if !self.base.online {
            return;
        }
        self.base.online = false;
        info!("Unit {} offline.", self.base.unit);
    }

    /// Reset the whole formatter.
    pub(super) fn clear(&mut self) {
        let b = &self.base;
        b.set_reg(REG_CS, CS_DVA);
        b.set_reg(REG_DIC, DIC_DPR);
        for slave in 0..SLAVES {
            b.set_reg(REG_NCS0 + slave, 0);
        }
        b.set_reg(REG_NIC, 0);
        b.set_reg(REG_DT, self.kind.descriptor.type_code);
        b.set_reg(REG_US, 0);
        b.set_reg(REG_SN, 0);
    }

    /// Rewind at the operator's request. An online transport drops offline
    /// for the rewind and comes back with an ONLINE interrupt, which sends
    /// the host off to sense the new position.
    pub fn rewind_manually(&mut self) -> MassbusResult<()> {
        if self.base.image.is_none() {
            return Err(MassbusError::NotAttached(format!("unit {}", self.base.unit)));
        }
        let was_online = self.base.online;
        self.go_offline();
        self.storage.rewind()?;
        debug!("Unit {} rewound.", self.base.unit);
        if was_online {
            self.go_online()?;
        }
        Ok(())
    }

    /// Fill in the unit status and serial number for `slave`. Slaves other
    /// than 0 read as all zeros, which is how the host learns they are
    /// missing.
    fn set_status(&self, slave: u8) {
        let b = &self.base;
        b.set_reg(REG_DT, self.kind.descriptor.type_code);
        if slave != 0 {
            b.set_reg(REG_US, 0);
            b.set_reg(REG_SN, 0);
            return;
        }
        let mut status = US_AVAIL | US_PRES | US_PE;
        if b.online {
            status |= US_ONL | US_RDY;
            if self.storage.is_at_bot() {
                status |= US_BOT;
            }
            if self.storage.is_at_eot() {
                status |= US_EOT;
            }
            if b.read_only {
                status |= US_FPT;
            }
        }
        b.set_reg(REG_US, status);
        b.set_reg(REG_SN, to_bcd(b.serial));
    }

    fn motion_interrupt(&self, slave: u8, code: u8) {
        let value = (slave as u16 & TC_SLAVE_MASK) << IC_SLAVE_SHIFT | code as u16;
        trace!("Unit {}: motion interrupt {:06o}.", self.base.unit, value);
        self.base.set_reg(REG_NIC, value);
    }

    fn data_interrupt(&self, code: u8) {
        self.data_failure(code, 0);
    }

    fn data_failure(&self, code: u8, failure: u8) {
        let value = DIC_DPR | (failure as u16) << IC_FAILURE_SHIFT | code as u16;
        trace!("Unit {}: data interrupt {:06o}.", self.base.unit, value);
        self.base.set_reg(REG_DIC, value);
    }

    /// Write back the repeat count still outstanding.
    fn set_motion_count(&self, slave: u8, count: u8) {
        let register = REG_NCS0 + slave;
        let low = self.base.reg(register) & 0o377;
        self.base.set_reg(register, (count as u16) << NCS_COUNT_SHIFT | low);
    }

    fn clear_motion_go(&self, slave: u8) {
        self.base.clear_bits(REG_NCS0 + slave, NCS_GO);
    }

    /// Complete a motion command on slave 0.
    fn finish_motion(&self, remaining: u8, code: u8) {
        self.set_motion_count(0, remaining);
        self.clear_motion_go(0);
        self.motion_interrupt(0, code);
    }

    /// Fail a data command. The empty transfer lets the host's channel
    /// complete.
    fn abort_transfer(&self, code: u8) {
        self.data_interrupt(code);
        self.base.interface.empty_transfer();
    }

    fn abort_unreadable(&self) {
        self.data_failure(IC_UNREADABLE, FAILURE_UNREADABLE);
        self.base.interface.empty_transfer();
    }

    /// Check the transport is online, telling the host if not.
    fn check_online(&self, motion: bool) -> bool {
        if self.base.online {
            return true;
        }
        if motion {
            self.clear_motion_go(0);
            self.motion_interrupt(0, IC_OFFLINE);
        } else {
            self.abort_transfer(IC_OFFLINE);
        }
        false
    }

    /// Check the transport is online and has a write ring.
    fn check_writable(&self, motion: bool) -> bool {
        if !self.check_online(motion) {
            return false;
        }
        if !self.base.read_only {
            return true;
        }
        if motion {
            self.clear_motion_go(0);
            self.motion_interrupt(0, IC_FILE_PROTECT);
        } else {
            self.abort_transfer(IC_FILE_PROTECT);
        }
        false
    }

    pub(super) fn dispatch(&mut self, cmd: CommandWord) -> MassbusResult<()> {
        trace!("Unit {}: {:?}", self.base.unit, cmd);
        if cmd.end_of_block() {
            trace!("Unit {}: end of block ignored.", self.base.unit);
            return Ok(());
        }
        match cmd.register() {
            REG_CS => self.transfer_command(cmd.function()),
            register @ REG_NCS0..=REG_NCS3 => {
                let count = (self.base.reg(register) >> NCS_COUNT_SHIFT) as u8;
                self.motion_command(register - REG_NCS0, cmd.function(), count)
            }
            REG_HC => {
                if self.base.reg(REG_HC) & HC_CLEAR != 0 {
                    debug!("Unit {}: formatter clear ignored.", self.base.unit);
                }
                Ok(())
            }
            register => Err(MassbusError::Protocol(
                format!("unit {}: command through register {:02o}", self.base.unit, register))),
        }
    }

    fn motion_command(&mut self, slave: u8, function: u8, count: u8) -> MassbusResult<()> {
        if slave != 0 {
            // Sense has to work on every slave: it's how the host probes.
            if function == MF_SENSE {
                self.sense(slave);
            } else {
                debug!("Unit {}: motion command {:02o} for missing slave {}.",
                       self.base.unit, function, slave);
                self.clear_motion_go(slave);
                self.motion_interrupt(slave, IC_NOT_AVAILABLE);
            }
            return Ok(());
        }

        let count = count.max(1);
        match function {
            MF_SENSE => {
                self.sense(0);
                Ok(())
            }
            MF_NOP => {
                self.finish_motion(0, IC_DONE);
                Ok(())
            }
            MF_WRITE_MARK_PE | MF_WRITE_MARK_GCR => self.write_marks(count),
            MF_SPACE_FORWARD_RECORD | MF_SPACE_FORWARD_EITHER => self.space(count, false, false),
            MF_SPACE_REVERSE_RECORD | MF_SPACE_REVERSE_EITHER => self.space(count, true, false),
            MF_SPACE_FORWARD_FILE => self.space(count, false, true),
            MF_SPACE_REVERSE_FILE => self.space(count, true, true),
            MF_REWIND => self.rewind(),
            MF_UNLOAD => self.unload(),
            MF_ERASE_GAP_PE | MF_ERASE_GAP_GCR | MF_DATA_SECURITY_ERASE => self.erase(),
            other => {
                self.clear_motion_go(0);
                self.motion_interrupt(0, IC_FORMATTER_FAULT);
                Err(MassbusError::Protocol(
                    format!("unit {}: unimplemented motion command {:02o}", self.base.unit, other)))
            }
        }
    }

    fn sense(&self, slave: u8) {
        debug!("Unit {}: sense slave {}.", self.base.unit, slave);
        self.set_status(slave);
        self.clear_motion_go(slave);
        self.motion_interrupt(slave, IC_DONE);
    }

    /// Report a failed motion command and pass the error up.
    fn motion_failed(&self, remaining: u8, err: std::io::Error) -> MassbusError {
        self.finish_motion(remaining, IC_BAD_TAPE);
        err.into()
    }

    fn rewind(&mut self) -> MassbusResult<()> {
        if !self.check_online(true) {
            return Ok(());
        }
        debug!("Unit {}: rewind.", self.base.unit);
        let result = self.storage.rewind();
        if let Err(e) = result {
            return Err(self.motion_failed(0, e));
        }
        self.finish_motion(0, IC_DONE);
        Ok(())
    }

    /// Rewind, then drop offline and let go of the image. The unit stays on
    /// the bus and can be loaded again.
    fn unload(&mut self) -> MassbusResult<()> {
        if !self.check_online(true) {
            return Ok(());
        }
        debug!("Unit {}: unload.", self.base.unit);
        let result = self.storage.rewind();
        if let Err(e) = result {
            return Err(self.motion_failed(0, e));
        }
        self.finish_motion(0, IC_DONE);
        self.go_offline();
        self.detach();
        Ok(())
    }

    /// Space up to `count` records or files. A record space stops at a
    /// tape mark, and either kind stops at bad tape or the end of the tape.
    /// The number of spaces not done goes back to the host in the repeat
    /// count.
    fn space(&mut self, count: u8, reverse: bool, files: bool) -> MassbusResult<()> {
        if !self.check_online(true) {
            return Ok(());
        }
        debug!("Unit {}: space {} {} {}.", self.base.unit,
               if reverse { "reverse" } else { "forward" }, count,
               if files { "files" } else { "records" });
        let mut remaining = count;
        let code = loop {
            let result = match (files, reverse) {
                (false, false) => self.storage.space_forward_record(),
                (false, true) => self.storage.space_reverse_record(),
                (true, false) => self.storage.space_forward_file(),
                (true, true) => self.storage.space_reverse_file(),
            };
            let record = match result {
                Ok(record) => record,
                Err(e) => return Err(self.motion_failed(remaining, e)),
            };
            let progressed = match record {
                TapeRecord::Data(_) => true,
                TapeRecord::TapeMark => files,
                TapeRecord::EndOfTape | TapeRecord::BadTape => false,
            };
            if progressed {
                remaining -= 1;
                if remaining == 0 {
                    break IC_DONE;
                }
                continue;
            }
            break match record {
                TapeRecord::TapeMark => IC_TAPE_MARK,
                TapeRecord::BadTape => IC_BAD_TAPE,
                _ if reverse => IC_BOT,
                _ => IC_EOT,
            };
        };
        self.finish_motion(remaining, code);
        Ok(())
    }

    fn write_marks(&mut self, count: u8) -> MassbusResult<()> {
        if !self.check_writable(true) {
            return Ok(());
        }
        debug!("Unit {}: write {} tape mark(s).", self.base.unit, count);
        for done in 0..count {
            let result = self.storage.write_mark();
            if let Err(e) = result {
                return Err(self.motion_failed(count - done, e));
            }
        }
        self.finish_motion(0, IC_DONE);
        Ok(())
    }

    /// Erase from here to the end of the tape. The repeat count is ignored.
    fn erase(&mut self) -> MassbusResult<()> {
        if !self.check_writable(true) {
            return Ok(());
        }
        debug!("Unit {}: erase.", self.base.unit);
        let result = self.storage.truncate();
        if let Err(e) = result {
            let count = (self.base.reg(REG_NCS0) >> NCS_COUNT_SHIFT) as u8;
            return Err(self.motion_failed(count, e));
        }
        self.finish_motion(0, IC_DONE);
        Ok(())
    }

    fn transfer_command(&mut self, function: u8) -> MassbusResult<()> {
        if function == DF_EXTENDED_SENSE {
            return self.extended_sense();
        }
        let ready = match function {
            DF_READ_FORWARD | DF_READ_REVERSE => self.check_online(false),
            DF_WRITE_PE | DF_WRITE_GCR => self.check_writable(false),
            other => {
                self.abort_transfer(IC_FORMATTER_FAULT);
                return Err(MassbusError::Protocol(
                    format!("unit {}: unimplemented transfer command {:02o}", self.base.unit, other)));
            }
        };
        if !ready {
            return Ok(());
        }

        let tc = self.base.reg(REG_TC);
        let slave = tc & TC_SLAVE_MASK;
        let format = ((tc & TC_FORMAT_MASK) >> TC_FORMAT_SHIFT) as u8;
        let records = (tc & TC_RECORD_COUNT_MASK) >> TC_RECORD_COUNT_SHIFT;
        let bytes = match self.base.reg(REG_BC) {
            0 => ZERO_BYTE_COUNT,
            n => n as usize,
        };
        trace!("Unit {}: format {:o}, {} bytes.", self.base.unit, format, bytes);

        let refuse = |drive: &Self, why: String| {
            drive.abort_transfer(IC_FORMATTER_FAULT);
            Err(MassbusError::Protocol(format!("unit {}: {}", drive.base.unit, why)))
        };
        if slave != 0 {
            return refuse(self, format!("data transfer on slave {}", slave));
        }
        let mode = match PackingMode::try_from(format) {
            Ok(mode) => mode,
            Err(e) => {
                self.abort_transfer(IC_FORMATTER_FAULT);
                return Err(e.into());
            }
        };
        if tc & TC_SKIP_COUNT_MASK != 0 {
            return refuse(self, "byte skip count not supported".to_string());
        }
        if records > 1 {
            return refuse(self, format!("record count {} not supported", records));
        }

        match function {
            DF_READ_FORWARD => self.read(mode, bytes, false),
            DF_READ_REVERSE => self.read(mode, bytes, true),
            _ => self.write(mode, bytes),
        }
    }

    fn clear_record_count(&self) {
        self.base.clear_bits(REG_TC, TC_RECORD_COUNT_MASK);
    }

    /// Read one record and send it to the host. Records come off the
    /// storage in forward byte order either way; for a reverse read the
    /// codec produces the half-words in the order the host expects.
    fn read(&mut self, mode: PackingMode, wanted: usize, reverse: bool) -> MassbusResult<()> {
        if reverse && self.storage.is_at_bot() {
            warn!("Unit {}: read reverse at load point.", self.base.unit);
            self.abort_transfer(IC_BOT);
            return Ok(());
        }

        let failure = match self.storage.read_forward_record(&mut self.buffer) {
            Ok(TapeRecord::Data(length)) => Ok(length as usize),
            Ok(TapeRecord::TapeMark) => Err(IC_TAPE_MARK),
            Ok(TapeRecord::EndOfTape) => Err(IC_EOT),
            Ok(TapeRecord::BadTape) => {
                warn!("Unit {}: unreadable record.", self.base.unit);
                Err(IC_UNREADABLE)
            }
            Err(e) => {
                self.base.set_reg(REG_BC, 0);
                self.abort_unreadable();
                return Err(e.into());
            }
        };
        let length = match failure {
            Ok(length) => length.min(MAX_RECORD),
            Err(IC_UNREADABLE) => {
                self.base.set_reg(REG_BC, 0);
                self.abort_unreadable();
                return Ok(());
            }
            Err(code) => {
                trace!("Unit {}: read stopped with code {:02o}.", self.base.unit, code);
                self.base.set_reg(REG_BC, 0);
                self.abort_transfer(code);
                return Ok(());
            }
        };

        let code = match length.cmp(&wanted) {
            Ordering::Less => IC_SHORT_RECORD,
            Ordering::Greater => IC_LONG_RECORD,
            Ordering::Equal => IC_DONE,
        };
        // The channel may interrupt the host as soon as the last word is
        // in the FIFO, so every register has to be final before then.
        self.clear_record_count();
        self.base.set_reg(REG_BC, if code == IC_DONE { length as u16 } else { 0 });
        self.data_interrupt(code);

        self.buffer.truncate(length);
        self.buffer.resize(mode.padded_len(length), 0);
        let halves = bitfiddler::encode(mode, &self.buffer, reverse);
        debug!("Unit {}: read {} bytes {} as {} half-words.", self.base.unit, length,
               if reverse { "reverse" } else { "forward" }, halves.len());
        if log_enabled!(Level::Trace) {
            trace!("Record:\n{}", pretty_print_octal_halves_zero(&halves));
        }
        self.base.interface.write_data(&halves, code != IC_DONE)?;
        Ok(())
    }

    /// Take one record from the host and write it. The status has to be
    /// set before the data arrives: the channel signals completion as soon
    /// as the host has sent the last word.
    fn write(&mut self, mode: PackingMode, bytes: usize) -> MassbusResult<()> {
        let halves = mode.halves_for_bytes(bytes);
        self.clear_record_count();
        self.data_interrupt(IC_DONE);

        let words = self.base.interface.read_data(halves)?;
        let mut data = bitfiddler::decode(mode, &words)?;
        data.truncate(bytes);
        debug!("Unit {}: write {} bytes from {} half-words.", self.base.unit, data.len(), halves);
        self.storage.write_record(&data)?;
        Ok(())
    }

    /// The formatter's error log. Nothing is logged, so it's always zeros.
    fn extended_sense(&mut self) -> MassbusResult<()> {
        trace!("Unit {}: extended sense.", self.base.unit);
        self.data_interrupt(IC_DONE);
        self.base.interface.write_data(&[0; EXTENDED_SENSE_HALVES], false)?;
        Ok(())
    }
}
