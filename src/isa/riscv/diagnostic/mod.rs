//! Per-instruction diagnostic records and the sinks that consume them.

mod addr_history;

use std::{cell::RefCell, fmt, rc::Rc};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use smallvec::SmallVec;

use crate::{
    config::arch_config::{REG_NAME, VREG_NAME, WordType},
    isa::riscv::csr_reg::{PrivilegeLevel, csr_name},
};

pub use addr_history::{AddressHistory, PeriodSample};

/// Register class tag, stored in the low nibble of a packed register key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RegClass {
    Integer = 0,
    Float = 1,
    Vector = 2,
    VectorConfig = 3,
    Csr = 4,
}

impl RegClass {
    pub fn key(self, index: u16) -> u64 {
        (index as u64) << 4 | u8::from(self) as u64
    }

    /// Split a packed register key into class and index.
    ///
    /// # Panics
    /// On a class tag outside the known set; such a key can only come from a corrupted record.
    pub fn from_key(key: u64) -> (RegClass, u16) {
        let tag = (key & 0xf) as u8;
        match RegClass::try_from(tag) {
            Ok(class) => (class, (key >> 4) as u16),
            Err(_) => panic!("unrecognized register class tag {tag:#x}"),
        }
    }
}

/// A register value of power-of-two width, at least 8 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagValue {
    bits: u32,
    bytes: SmallVec<[u8; 16]>,
}

impl DiagValue {
    /// # Panics
    /// If `bits` is not a power of two of at least 8.
    pub fn from_bytes(bits: u32, le_bytes: &[u8]) -> Self {
        assert!(
            bits >= 8 && bits.is_power_of_two(),
            "diagnostic value width {bits} is not a power of two"
        );
        let len = (bits / 8) as usize;
        let mut bytes: SmallVec<[u8; 16]> = SmallVec::from_slice(&le_bytes[..len.min(le_bytes.len())]);
        bytes.resize(len, 0);
        Self { bits, bytes }
    }

    pub fn from_word(bits: u32, value: u64) -> Self {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&value.to_le_bytes());
        Self::from_bytes(bits, &buf)
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Low 64 bits of the value.
    pub fn low_word(&self) -> u64 {
        let mut buf = [0u8; 8];
        let n = self.bytes.len().min(8);
        buf[..n].copy_from_slice(&self.bytes[..n]);
        u64::from_le_bytes(buf)
    }
}

impl fmt::Display for DiagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in self.bytes.iter().rev() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegWrite {
    pub class: RegClass,
    pub index: u16,
    pub value: DiagValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemAccess {
    pub addr: WordType,
    pub value: u64,
    pub size: u8,
}

/// Everything one instruction changed, rebuilt before every execution.
#[derive(Debug, Clone)]
pub struct DiagnosticRecord {
    pub reg_writes: SmallVec<[RegWrite; 2]>,
    pub mem_reads: SmallVec<[MemAccess; 2]>,
    pub mem_writes: SmallVec<[MemAccess; 2]>,
    pub is_branch: bool,
    pub taken: bool,
    pub prv: PrivilegeLevel,
    pub xlen: u32,
    pub flen: u32,
}

impl Default for DiagnosticRecord {
    fn default() -> Self {
        Self {
            reg_writes: SmallVec::new(),
            mem_reads: SmallVec::new(),
            mem_writes: SmallVec::new(),
            is_branch: false,
            taken: false,
            prv: PrivilegeLevel::M,
            xlen: 64,
            flen: 0,
        }
    }
}

impl DiagnosticRecord {
    pub fn reset(&mut self, prv: PrivilegeLevel, xlen: u32, flen: u32) {
        self.reg_writes.clear();
        self.mem_reads.clear();
        self.mem_writes.clear();
        self.is_branch = false;
        self.taken = false;
        self.prv = prv;
        self.xlen = xlen;
        self.flen = flen;
    }

    /// Record a register write, replacing an earlier write to the same register.
    pub fn log_reg_write(&mut self, class: RegClass, index: u16, value: DiagValue) {
        match self
            .reg_writes
            .iter_mut()
            .find(|w| w.class == class && w.index == index)
        {
            Some(w) => w.value = value,
            None => self.reg_writes.push(RegWrite {
                class,
                index,
                value,
            }),
        }
    }

    pub fn log_mem_read(&mut self, addr: WordType, value: u64, size: u8) {
        self.mem_reads.push(MemAccess { addr, value, size });
    }

    pub fn log_mem_write(&mut self, addr: WordType, value: u64, size: u8) {
        self.mem_writes.push(MemAccess { addr, value, size });
    }

    pub fn log_branch(&mut self, taken: bool) {
        self.is_branch = true;
        self.taken = taken;
    }

    /// Data addresses touched by the instruction, stores first.
    pub fn touched_addresses(&self) -> impl Iterator<Item = WordType> + '_ {
        self.mem_writes
            .iter()
            .chain(self.mem_reads.iter())
            .map(|a| a.addr)
    }
}

/// Vector configuration at commit time of a vector instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorSnapshot {
    pub sew: u32,
    pub lmul_log2: i32,
    pub vl: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct CommitRecord<'a> {
    pub hart_id: u64,
    pub pc: WordType,
    pub insn: u32,
    pub record: &'a DiagnosticRecord,
    pub vector: Option<VectorSnapshot>,
}

/// Flat per-instruction event for external trace consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub pc: WordType,
    pub size: u8,
    pub addresses: SmallVec<[WordType; 4]>,
    pub is_branch: bool,
    pub taken: bool,
}

/// Region and configuration markers recognised in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    RoiBegin,
    RoiEnd,
    VectorConfig { vl: u64, vtype: u64 },
}

impl Marker {
    const ROI_BEGIN_INSN: u32 = 0x0010_0013; // addi zero, zero, 1
    const ROI_END_INSN: u32 = 0x0020_0013; // addi zero, zero, 2

    pub fn from_insn(insn: u32) -> Option<Marker> {
        match insn {
            Self::ROI_BEGIN_INSN => Some(Marker::RoiBegin),
            Self::ROI_END_INSN => Some(Marker::RoiEnd),
            _ => None,
        }
    }
}

/// Consumer of per-instruction diagnostics. Only [`DiagnosticSink::commit`] is mandatory.
pub trait DiagnosticSink {
    fn commit(&mut self, rec: &CommitRecord<'_>);

    fn instruction(&mut self, _event: &TraceEvent) {}

    fn marker(&mut self, _marker: Marker) {}
}

/// Owned copy of a [`CommitRecord`].
#[derive(Debug, Clone)]
pub struct CommitEntry {
    pub pc: WordType,
    pub insn: u32,
    pub prv: PrivilegeLevel,
    pub reg_writes: Vec<RegWrite>,
    pub mem_reads: Vec<MemAccess>,
    pub mem_writes: Vec<MemAccess>,
    pub vector: Option<VectorSnapshot>,
}

#[derive(Debug, Default)]
pub struct Recording {
    pub commits: Vec<CommitEntry>,
    pub events: Vec<TraceEvent>,
    pub markers: Vec<Marker>,
}

/// Sink that keeps everything it sees. Clone by ref.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Rc<RefCell<Recording>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&Recording) -> R) -> R {
        f(&self.inner.borrow())
    }

    pub fn commit_count(&self) -> usize {
        self.inner.borrow().commits.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.commits.clear();
        inner.events.clear();
        inner.markers.clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn commit(&mut self, rec: &CommitRecord<'_>) {
        self.inner.borrow_mut().commits.push(CommitEntry {
            pc: rec.pc,
            insn: rec.insn,
            prv: rec.record.prv,
            reg_writes: rec.record.reg_writes.to_vec(),
            mem_reads: rec.record.mem_reads.to_vec(),
            mem_writes: rec.record.mem_writes.to_vec(),
            vector: rec.vector,
        });
    }

    fn instruction(&mut self, event: &TraceEvent) {
        self.inner.borrow_mut().events.push(event.clone());
    }

    fn marker(&mut self, marker: Marker) {
        self.inner.borrow_mut().markers.push(marker);
    }
}

/// Sink that writes one trace line per committed instruction through `log`.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    fn reg_name(class: RegClass, index: u16) -> String {
        match class {
            RegClass::Integer => REG_NAME[index as usize & 31].to_string(),
            RegClass::Float => format!("f{index}"),
            RegClass::Vector => VREG_NAME[index as usize & 31].to_string(),
            RegClass::VectorConfig | RegClass::Csr => csr_name(index)
                .map(str::to_string)
                .unwrap_or_else(|| format!("csr{index:#x}")),
        }
    }
}

impl DiagnosticSink for LogSink {
    fn commit(&mut self, rec: &CommitRecord<'_>) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }

        let mut line = format!(
            "core {:3}: {} {:#018x} ({:#010x})",
            rec.hart_id,
            u8::from(rec.record.prv),
            rec.pc,
            rec.insn
        );
        if let Some(v) = rec.vector {
            line.push_str(&format!(" e{} m{} l{}", v.sew, v.lmul_log2, v.vl));
        }
        for w in &rec.record.reg_writes {
            line.push_str(&format!(" {} {}", Self::reg_name(w.class, w.index), w.value));
        }
        for a in &rec.record.mem_reads {
            line.push_str(&format!(" mem {:#018x}", a.addr));
        }
        for a in &rec.record.mem_writes {
            line.push_str(&format!(
                " mem {:#018x} {:#0width$x}",
                a.addr,
                a.value,
                width = a.size as usize * 2 + 2
            ));
        }
        log::trace!("{line}");
    }

    fn marker(&mut self, marker: Marker) {
        log::info!("marker: {marker:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reg_key_roundtrip() {
        let key = RegClass::Vector.key(12);
        assert_eq!(RegClass::from_key(key), (RegClass::Vector, 12));
        assert_eq!(RegClass::from_key(RegClass::Csr.key(0x300)), (RegClass::Csr, 0x300));
    }

    #[test]
    #[should_panic(expected = "unrecognized register class")]
    fn test_unknown_class_tag() {
        RegClass::from_key(0x17);
    }

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn test_non_power_of_two_width() {
        DiagValue::from_word(48, 0);
    }

    #[test]
    fn test_diag_value_display() {
        assert_eq!(DiagValue::from_word(32, 0xdead_beef).to_string(), "0xdeadbeef");
        assert_eq!(
            DiagValue::from_word(64, 0x1).to_string(),
            "0x0000000000000001"
        );
        let wide = DiagValue::from_bytes(128, &[0xff; 16]);
        assert_eq!(wide.to_string().len(), 2 + 32);
        assert_eq!(wide.low_word(), u64::MAX);
    }

    #[test]
    fn test_record_replaces_same_register() {
        let mut rec = DiagnosticRecord::default();
        rec.log_reg_write(RegClass::Integer, 5, DiagValue::from_word(64, 1));
        rec.log_reg_write(RegClass::Integer, 5, DiagValue::from_word(64, 2));
        rec.log_reg_write(RegClass::Csr, 5, DiagValue::from_word(64, 3));
        assert_eq!(rec.reg_writes.len(), 2);
        assert_eq!(rec.reg_writes[0].value.low_word(), 2);

        rec.log_mem_read(0x10, 0, 8);
        rec.log_mem_write(0x20, 0, 8);
        assert_eq!(rec.touched_addresses().collect::<Vec<_>>(), vec![0x20, 0x10]);

        rec.reset(PrivilegeLevel::U, 64, 0);
        assert!(rec.reg_writes.is_empty());
        assert!(rec.mem_reads.is_empty());
        assert_eq!(rec.prv, PrivilegeLevel::U);
    }

    #[test]
    fn test_markers() {
        assert_eq!(Marker::from_insn(0x0010_0013), Some(Marker::RoiBegin));
        assert_eq!(Marker::from_insn(0x0020_0013), Some(Marker::RoiEnd));
        assert_eq!(Marker::from_insn(0x0000_0013), None);
    }

    #[test]
    fn test_recording_sink_shares_state() {
        let sink = RecordingSink::new();
        let mut handle: Box<dyn DiagnosticSink> = Box::new(sink.clone());
        let rec = DiagnosticRecord::default();
        handle.commit(&CommitRecord {
            hart_id: 0,
            pc: 0x8000_0000,
            insn: 0x13,
            record: &rec,
            vector: None,
        });
        handle.marker(Marker::RoiBegin);
        assert_eq!(sink.commit_count(), 1);
        sink.with(|r| assert_eq!(r.markers, vec![Marker::RoiBegin]));
    }
}
