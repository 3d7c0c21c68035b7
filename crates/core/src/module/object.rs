//! Object-file parsing for [`FileModuleLoader`].
//!
//! Mach-O headers (thin and fat, 32- and 64-bit, either byte order) are read
//! directly; only the CPU type, subtype and `LC_UUID` load command are
//! needed. ELF images go through `xmas-elf`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use devlink_protocol::Architecture;
use devlink_protocol::arch::elf::{EM_386, EM_AARCH64, EM_ARM, EM_LOONGARCH, EM_X86_64};
use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;
use xmas_elf::ElfFile;

use super::{LoadError, ModuleImage, ModuleLoader, ModuleSpec, ObjectFormat};

const MH_MAGIC: u32 = 0xfeed_face;
const MH_MAGIC_64: u32 = 0xfeed_facf;
const FAT_MAGIC: u32 = 0xcafe_babe;
const FAT_MAGIC_64: u32 = 0xcafe_babf;
const LC_UUID: u32 = 0x1b;
const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

const MACH_HEADER_SIZE: usize = 28;
const MACH_HEADER_64_SIZE: usize = 32;
const FAT_ARCH_SIZE: usize = 20;
const FAT_ARCH_64_SIZE: usize = 32;

/// Reads module images from the local filesystem.
///
/// The outcome of parsing the most recently read file is kept, so trying
/// each architecture of one executable in turn reads it once. The entry is
/// reused while the file's length and modification time are unchanged.
#[derive(Debug, Default)]
pub struct FileModuleLoader {
	last: Mutex<Option<Parsed>>,
	#[cfg(test)]
	reads: std::sync::atomic::AtomicUsize,
}

#[derive(Debug)]
struct Parsed {
	path: PathBuf,
	len: u64,
	modified: Option<SystemTime>,
	outcome: Result<Arc<[Slice]>, Arc<LoadError>>,
}

impl Clone for FileModuleLoader {
	fn clone(&self) -> Self {
		Self::default()
	}
}

impl FileModuleLoader {
	pub fn new() -> Self {
		Self::default()
	}

	fn slices(&self, path: &Path) -> Result<Arc<[Slice]>, LoadError> {
		let meta = fs::metadata(path)?;
		let modified = meta.modified().ok();

		let mut last = self.last.lock();
		if let Some(parsed) = last
			.as_ref()
			.filter(|p| p.path == path && p.len == meta.len() && p.modified == modified)
		{
			return parsed.outcome.clone().map_err(|e| reissue(&e));
		}

		let data = fs::read(path)?;
		#[cfg(test)]
		self.reads.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
		let outcome: Result<Arc<[Slice]>, Arc<LoadError>> =
			parse_slices(path, &data).map(Arc::from).map_err(Arc::new);
		if let Ok(slices) = &outcome {
			trace!(target = "devlink", path = %path.display(), slices = slices.len(), "parsed object file");
		}

		*last = Some(Parsed {
			path: path.to_path_buf(),
			len: meta.len(),
			modified,
			outcome: outcome.clone(),
		});
		outcome.map_err(|e| reissue(&e))
	}
}

/// Copies a cached parse failure for another caller.
fn reissue(err: &LoadError) -> LoadError {
	match err {
		LoadError::Io(e) => LoadError::Io(io::Error::new(e.kind(), e.to_string())),
		LoadError::UnknownFormat(path) => LoadError::UnknownFormat(path.clone()),
		LoadError::Malformed { path, reason } => LoadError::Malformed {
			path: path.clone(),
			reason: reason.clone(),
		},
		LoadError::NoMatchingSlice(path) => LoadError::NoMatchingSlice(path.clone()),
	}
}

impl ModuleLoader for FileModuleLoader {
	fn load(&self, spec: &ModuleSpec) -> Result<ModuleImage, LoadError> {
		let slices = self.slices(&spec.path)?;

		slices
			.iter()
			.find_map(|slice| {
				let architecture = match spec.architecture {
					Some(forced) => slice.target.matches(forced).then_some(forced)?,
					None => slice.target.detect()?,
				};
				if spec.uuid.is_some() && slice.uuid != spec.uuid {
					return None;
				}
				Some(ModuleImage {
					path: spec.path.clone(),
					architecture,
					uuid: slice.uuid,
					format: slice.target.format(),
					offset: slice.offset,
					size: slice.size,
				})
			})
			.ok_or_else(|| LoadError::NoMatchingSlice(spec.path.clone()))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
	MachO { cputype: u32, cpusubtype: u32 },
	Elf { machine: u16 },
}

impl Target {
	fn matches(self, arch: Architecture) -> bool {
		match self {
			Self::MachO { cputype, cpusubtype } => arch.matches_macho(cputype, cpusubtype),
			Self::Elf { machine } => arch.matches_elf(machine),
		}
	}

	/// Most specific architecture describing this slice.
	fn detect(self) -> Option<Architecture> {
		match self {
			Self::MachO { .. } => Architecture::ALL.into_iter().find(|arch| self.matches(*arch)),
			Self::Elf { machine } => match machine {
				EM_AARCH64 => Some(Architecture::Arm64),
				EM_ARM => Some(Architecture::Arm),
				EM_386 => Some(Architecture::X86),
				EM_X86_64 => Some(Architecture::X86_64),
				EM_LOONGARCH => Some(Architecture::Loong64),
				_ => None,
			},
		}
	}

	fn format(self) -> ObjectFormat {
		match self {
			Self::MachO { .. } => ObjectFormat::MachO,
			Self::Elf { .. } => ObjectFormat::Elf,
		}
	}
}

#[derive(Debug)]
struct Slice {
	target: Target,
	uuid: Option<Uuid>,
	offset: u64,
	size: u64,
}

#[derive(Debug, Clone, Copy)]
enum Endian {
	Little,
	Big,
}

fn read_u32(data: &[u8], at: usize, endian: Endian) -> Option<u32> {
	let bytes: [u8; 4] = data.get(at..at.checked_add(4)?)?.try_into().ok()?;
	Some(match endian {
		Endian::Little => u32::from_le_bytes(bytes),
		Endian::Big => u32::from_be_bytes(bytes),
	})
}

fn read_u64(data: &[u8], at: usize, endian: Endian) -> Option<u64> {
	let bytes: [u8; 8] = data.get(at..at.checked_add(8)?)?.try_into().ok()?;
	Some(match endian {
		Endian::Little => u64::from_le_bytes(bytes),
		Endian::Big => u64::from_be_bytes(bytes),
	})
}

fn malformed(path: &Path, reason: impl Into<String>) -> LoadError {
	LoadError::Malformed {
		path: path.to_path_buf(),
		reason: reason.into(),
	}
}

fn parse_slices(path: &Path, data: &[u8]) -> Result<Vec<Slice>, LoadError> {
	if data.starts_with(ELF_MAGIC) {
		return parse_elf(path, data).map(|slice| vec![slice]);
	}

	match read_u32(data, 0, Endian::Big) {
		Some(FAT_MAGIC) => parse_fat(path, data, false),
		Some(FAT_MAGIC_64) => parse_fat(path, data, true),
		Some(_) => match macho_endian(data) {
			Some(_) => parse_macho(path, data, 0).map(|slice| vec![slice]),
			None => Err(LoadError::UnknownFormat(path.to_path_buf())),
		},
		None => Err(LoadError::UnknownFormat(path.to_path_buf())),
	}
}

fn macho_endian(data: &[u8]) -> Option<(Endian, bool)> {
	for endian in [Endian::Little, Endian::Big] {
		match read_u32(data, 0, endian)? {
			MH_MAGIC => return Some((endian, false)),
			MH_MAGIC_64 => return Some((endian, true)),
			_ => {}
		}
	}
	None
}

/// Parses a thin Mach-O image that starts `offset` bytes into the file.
fn parse_macho(path: &Path, data: &[u8], offset: u64) -> Result<Slice, LoadError> {
	let (endian, is_64) = macho_endian(data).ok_or_else(|| LoadError::UnknownFormat(path.to_path_buf()))?;
	let header_size = if is_64 { MACH_HEADER_64_SIZE } else { MACH_HEADER_SIZE };
	if data.len() < header_size {
		return Err(malformed(path, "Mach-O header truncated"));
	}

	let field = |at| read_u32(data, at, endian).ok_or_else(|| malformed(path, "Mach-O header truncated"));
	let cputype = field(4)?;
	let cpusubtype = field(8)?;
	let ncmds = field(16)?;

	let mut uuid = None;
	let mut cursor = header_size;
	for _ in 0..ncmds {
		let cmd = read_u32(data, cursor, endian).ok_or_else(|| malformed(path, "load command truncated"))?;
		let cmdsize =
			read_u32(data, cursor + 4, endian).ok_or_else(|| malformed(path, "load command truncated"))? as usize;
		if cmdsize < 8 {
			return Err(malformed(path, format!("load command size {cmdsize} is too small")));
		}
		if cmd == LC_UUID {
			let bytes: [u8; 16] = data
				.get(cursor + 8..cursor + 24)
				.and_then(|b| b.try_into().ok())
				.ok_or_else(|| malformed(path, "LC_UUID truncated"))?;
			uuid = Some(Uuid::from_bytes(bytes));
			break;
		}
		cursor = cursor
			.checked_add(cmdsize)
			.ok_or_else(|| malformed(path, "load command size overflows"))?;
	}

	Ok(Slice {
		target: Target::MachO { cputype, cpusubtype },
		uuid,
		offset,
		size: data.len() as u64,
	})
}

/// Fat headers are always big-endian.
fn parse_fat(path: &Path, data: &[u8], is_64: bool) -> Result<Vec<Slice>, LoadError> {
	let count = read_u32(data, 4, Endian::Big).ok_or_else(|| malformed(path, "fat header truncated"))? as usize;
	let entry_size = if is_64 { FAT_ARCH_64_SIZE } else { FAT_ARCH_SIZE };

	let mut slices = Vec::with_capacity(count.min(16));
	for index in 0..count {
		let at = 8 + index * entry_size;
		let truncated = || malformed(path, format!("fat_arch {index} truncated"));
		let (offset, size) = if is_64 {
			(
				read_u64(data, at + 8, Endian::Big).ok_or_else(truncated)?,
				read_u64(data, at + 16, Endian::Big).ok_or_else(truncated)?,
			)
		} else {
			(
				u64::from(read_u32(data, at + 8, Endian::Big).ok_or_else(truncated)?),
				u64::from(read_u32(data, at + 12, Endian::Big).ok_or_else(truncated)?),
			)
		};

		let body = usize::try_from(offset)
			.ok()
			.zip(usize::try_from(size).ok())
			.and_then(|(start, len)| data.get(start..start.checked_add(len)?))
			.ok_or_else(|| malformed(path, format!("fat_arch {index} lies outside the file")))?;
		slices.push(parse_macho(path, body, offset)?);
	}
	Ok(slices)
}

fn parse_elf(path: &Path, data: &[u8]) -> Result<Slice, LoadError> {
	let elf = ElfFile::new(data).map_err(|reason| malformed(path, reason))?;
	Ok(Slice {
		target: Target::Elf {
			machine: raw_machine(elf.header.pt2.machine().as_machine()),
		},
		uuid: None,
		offset: 0,
		size: data.len() as u64,
	})
}

/// Recovers the raw `e_machine` value; `xmas_elf` keeps the field private.
fn raw_machine(machine: xmas_elf::header::Machine) -> u16 {
	use xmas_elf::header::Machine;
	match machine {
		Machine::None => 0x00,
		Machine::Sparc => 0x02,
		Machine::X86 => 0x03,
		Machine::Mips => 0x08,
		Machine::PowerPC => 0x14,
		Machine::Arm => 0x28,
		Machine::SuperH => 0x2A,
		Machine::Ia64 => 0x32,
		Machine::X86_64 => 0x3E,
		Machine::AArch64 => 0xB7,
		Machine::RISC_V => 0xF3,
		Machine::BPF => 0xF7,
		Machine::Other(other) => other,
	}
}

#[cfg(test)]
pub(crate) mod fixtures {
	use devlink_protocol::arch::macho::{CPU_SUBTYPE_ARM_V7, CPU_SUBTYPE_ARM64_ALL, CPU_TYPE_ARM, CPU_TYPE_ARM64};

	use super::*;

	pub fn thin(cputype: u32, cpusubtype: u32, uuid: Option<[u8; 16]>) -> Vec<u8> {
		let (ncmds, sizeofcmds) = if uuid.is_some() { (1u32, 24u32) } else { (0, 0) };
		let mut out = Vec::new();
		for word in [MH_MAGIC_64, cputype, cpusubtype, 2, ncmds, sizeofcmds, 0, 0] {
			out.extend(word.to_le_bytes());
		}
		if let Some(uuid) = uuid {
			out.extend(LC_UUID.to_le_bytes());
			out.extend(24u32.to_le_bytes());
			out.extend(uuid);
		}
		out
	}

	pub fn arm64(uuid: Option<[u8; 16]>) -> Vec<u8> {
		thin(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64_ALL, uuid)
	}

	pub fn armv7(uuid: Option<[u8; 16]>) -> Vec<u8> {
		thin(CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7, uuid)
	}

	pub fn fat(slices: &[Vec<u8>]) -> Vec<u8> {
		let header_len = 8 + slices.len() * FAT_ARCH_SIZE;
		let mut out = Vec::new();
		out.extend(FAT_MAGIC.to_be_bytes());
		out.extend((slices.len() as u32).to_be_bytes());

		let mut offset = header_len.next_multiple_of(16);
		for slice in slices {
			out.extend(slice[4..8].iter().rev());
			out.extend(slice[8..12].iter().rev());
			out.extend((offset as u32).to_be_bytes());
			out.extend((slice.len() as u32).to_be_bytes());
			out.extend(4u32.to_be_bytes());
			offset = (offset + slice.len()).next_multiple_of(16);
		}
		for slice in slices {
			out.resize(out.len().next_multiple_of(16), 0);
			out.extend(slice);
		}
		out
	}

	pub fn elf64(machine: u16) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend(ELF_MAGIC);
		out.extend([2, 1, 1, 0]);
		out.resize(16, 0);
		out.extend(2u16.to_le_bytes());
		out.extend(machine.to_le_bytes());
		out.extend(1u32.to_le_bytes());
		out.extend([0u8; 24]);
		out.extend(0u32.to_le_bytes());
		for half in [64u16, 56, 0, 64, 0, 0] {
			out.extend(half.to_le_bytes());
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use super::fixtures::*;
	use super::*;

	const UUID_A: [u8; 16] = [0xa1; 16];
	const UUID_B: [u8; 16] = [0xb2; 16];

	fn write(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
		let path = dir.path().join(name);
		fs::write(&path, bytes).unwrap();
		path
	}

	#[test]
	fn file_is_read_once_across_attempts() {
		let dir = tempfile::tempdir().unwrap();
		let path = write(&dir, "Demo", &fat(&[armv7(None), arm64(Some(UUID_A))]));
		let loader = FileModuleLoader::new();

		for arch in [Architecture::Arm64e, Architecture::Arm64, Architecture::Armv7s, Architecture::Armv7] {
			let _ = loader.load(&ModuleSpec::new(&path).with_architecture(arch));
		}
		assert_eq!(loader.reads.load(std::sync::atomic::Ordering::Relaxed), 1);

		write(&dir, "Demo", &arm64(Some(UUID_B)));
		let spec = ModuleSpec::new(&path).with_architecture(Architecture::Armv7);
		assert!(matches!(loader.load(&spec), Err(LoadError::NoMatchingSlice(_))));
		assert_eq!(loader.reads.load(std::sync::atomic::Ordering::Relaxed), 2);
	}

	#[test]
	fn parse_failure_is_remembered() {
		let dir = tempfile::tempdir().unwrap();
		let path = write(&dir, "Demo", b"not an object file");
		let loader = FileModuleLoader::new();

		for arch in [Architecture::Arm64e, Architecture::Arm64] {
			let spec = ModuleSpec::new(&path).with_architecture(arch);
			assert!(matches!(loader.load(&spec), Err(LoadError::UnknownFormat(_))));
		}
		assert_eq!(loader.reads.load(std::sync::atomic::Ordering::Relaxed), 1);
	}

	#[test]
	fn thin_macho_reports_arch_and_uuid() {
		let dir = tempfile::tempdir().unwrap();
		let path = write(&dir, "Demo", &arm64(Some(UUID_A)));

		let image = FileModuleLoader::new().load(&ModuleSpec::new(&path)).unwrap();
		assert_eq!(image.architecture, Architecture::Arm64);
		assert_eq!(image.uuid, Some(Uuid::from_bytes(UUID_A)));
		assert_eq!(image.format, ObjectFormat::MachO);
	}

	#[test]
	fn forced_architecture_must_match() {
		let dir = tempfile::tempdir().unwrap();
		let path = write(&dir, "Demo", &arm64(None));

		let spec = ModuleSpec::new(&path).with_architecture(Architecture::Armv7);
		assert!(matches!(FileModuleLoader::new().load(&spec), Err(LoadError::NoMatchingSlice(_))));

		let spec = ModuleSpec::new(&path).with_architecture(Architecture::Arm64);
		assert_eq!(FileModuleLoader::new().load(&spec).unwrap().architecture, Architecture::Arm64);
	}

	#[test]
	fn fat_file_selects_slice_by_architecture() {
		let dir = tempfile::tempdir().unwrap();
		let path = write(&dir, "Demo", &fat(&[armv7(Some(UUID_A)), arm64(Some(UUID_B))]));

		let spec = ModuleSpec::new(&path).with_architecture(Architecture::Arm64);
		let image = FileModuleLoader::new().load(&spec).unwrap();
		assert_eq!(image.uuid, Some(Uuid::from_bytes(UUID_B)));
		assert!(image.offset > 0);

		let spec = ModuleSpec::new(&path).with_architecture(Architecture::Armv7);
		assert_eq!(FileModuleLoader::new().load(&spec).unwrap().uuid, Some(Uuid::from_bytes(UUID_A)));
	}

	#[test]
	fn uuid_selects_slice_without_architecture() {
		let dir = tempfile::tempdir().unwrap();
		let path = write(&dir, "Demo", &fat(&[armv7(Some(UUID_A)), arm64(Some(UUID_B))]));

		let spec = ModuleSpec::new(&path).with_uuid(Uuid::from_bytes(UUID_B));
		assert_eq!(FileModuleLoader::new().load(&spec).unwrap().architecture, Architecture::Arm64);

		let spec = ModuleSpec::new(&path).with_uuid(Uuid::from_bytes([0; 16]));
		assert!(FileModuleLoader::new().load(&spec).is_err());
	}

	#[test]
	fn elf_machine_is_matched() {
		let dir = tempfile::tempdir().unwrap();
		let path = write(&dir, "libdemo.so", &elf64(EM_AARCH64));

		let image = FileModuleLoader::new().load(&ModuleSpec::new(&path)).unwrap();
		assert_eq!(image.format, ObjectFormat::Elf);
		assert_eq!(image.architecture, Architecture::Arm64);

		let spec = ModuleSpec::new(&path).with_architecture(Architecture::X86_64);
		assert!(FileModuleLoader::new().load(&spec).is_err());
	}

	#[test]
	fn garbage_is_unknown_format() {
		let dir = tempfile::tempdir().unwrap();
		let path = write(&dir, "notes.txt", b"just some text");
		assert!(matches!(
			FileModuleLoader::new().load(&ModuleSpec::new(&path)),
			Err(LoadError::UnknownFormat(_))
		));
	}

	#[test]
	fn truncated_load_commands_are_malformed() {
		let dir = tempfile::tempdir().unwrap();
		let mut bytes = arm64(Some(UUID_A));
		bytes.truncate(40);
		let path = write(&dir, "Demo", &bytes);
		assert!(matches!(
			FileModuleLoader::new().load(&ModuleSpec::new(&path)),
			Err(LoadError::Malformed { .. })
		));
	}

	#[test]
	fn missing_file_is_io_error() {
		let spec = ModuleSpec::new("/nonexistent/Demo");
		assert!(matches!(FileModuleLoader::new().load(&spec), Err(LoadError::Io(_))));
	}
}
