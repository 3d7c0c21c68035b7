//! Instruction-set architectures and their object-file identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::Abi;

/// Mach-O CPU type and subtype constants used for slice matching.
pub mod macho {
	pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;
	pub const CPU_ARCH_ABI64_32: u32 = 0x0200_0000;
	pub const CPU_SUBTYPE_MASK: u32 = 0xff00_0000;

	pub const CPU_TYPE_X86: u32 = 7;
	pub const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
	pub const CPU_TYPE_ARM: u32 = 12;
	pub const CPU_TYPE_ARM64: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;
	pub const CPU_TYPE_ARM64_32: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64_32;

	pub const CPU_SUBTYPE_ARM_V6: u32 = 6;
	pub const CPU_SUBTYPE_ARM_V7: u32 = 9;
	pub const CPU_SUBTYPE_ARM_V7S: u32 = 11;
	pub const CPU_SUBTYPE_ARM_V7K: u32 = 12;
	pub const CPU_SUBTYPE_ARM64_ALL: u32 = 0;
	pub const CPU_SUBTYPE_ARM64_V8: u32 = 1;
	pub const CPU_SUBTYPE_ARM64E: u32 = 2;
}

/// ELF `e_machine` values used for image matching.
pub mod elf {
	pub const EM_386: u16 = 3;
	pub const EM_ARM: u16 = 40;
	pub const EM_X86_64: u16 = 62;
	pub const EM_AARCH64: u16 = 183;
	pub const EM_LOONGARCH: u16 = 258;
}

/// A target architecture a module image can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
	#[serde(rename = "arm64e")]
	Arm64e,
	#[serde(rename = "arm64")]
	Arm64,
	#[serde(rename = "arm64_32")]
	Arm64_32,
	#[serde(rename = "armv7s")]
	Armv7s,
	#[serde(rename = "armv7k")]
	Armv7k,
	#[serde(rename = "armv7")]
	Armv7,
	#[serde(rename = "armv6")]
	Armv6,
	/// Any 32-bit ARM variant.
	#[serde(rename = "arm")]
	Arm,
	#[serde(rename = "i386")]
	X86,
	#[serde(rename = "x86_64")]
	X86_64,
	#[serde(rename = "loongarch64")]
	Loong64,
}

/// Error returned when parsing an unknown architecture name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown architecture '{0}'")]
pub struct UnknownArchitecture(pub String);

impl Architecture {
	pub const ALL: [Architecture; 11] = [
		Self::Arm64e,
		Self::Arm64,
		Self::Arm64_32,
		Self::Armv7s,
		Self::Armv7k,
		Self::Armv7,
		Self::Armv6,
		Self::Arm,
		Self::X86,
		Self::X86_64,
		Self::Loong64,
	];

	/// Canonical architecture name, as printed in diagnostics.
	pub fn name(self) -> &'static str {
		match self {
			Self::Arm64e => "arm64e",
			Self::Arm64 => "arm64",
			Self::Arm64_32 => "arm64_32",
			Self::Armv7s => "armv7s",
			Self::Armv7k => "armv7k",
			Self::Armv7 => "armv7",
			Self::Armv6 => "armv6",
			Self::Arm => "arm",
			Self::X86 => "i386",
			Self::X86_64 => "x86_64",
			Self::Loong64 => "loongarch64",
		}
	}

	/// Device ABI required to run code built for this architecture.
	pub fn abi(self) -> Abi {
		match self {
			Self::Arm64e | Self::Arm64 | Self::Arm64_32 => Abi::ARM64,
			Self::Armv7s | Self::Armv7k | Self::Armv7 | Self::Armv6 | Self::Arm => Abi::ARM,
			Self::X86 => Abi::X86,
			Self::X86_64 => Abi::X64,
			Self::Loong64 => Abi::LOONG64,
		}
	}

	/// Returns `true` if a Mach-O slice with this CPU type/subtype satisfies
	/// the architecture. Capability bits in `cpusubtype` are ignored.
	pub fn matches_macho(self, cputype: u32, cpusubtype: u32) -> bool {
		use crate::arch::macho::*;

		let subtype = cpusubtype & !CPU_SUBTYPE_MASK;
		match self {
			Self::Arm64e => cputype == CPU_TYPE_ARM64 && subtype == CPU_SUBTYPE_ARM64E,
			Self::Arm64 => {
				cputype == CPU_TYPE_ARM64
					&& matches!(subtype, CPU_SUBTYPE_ARM64_ALL | CPU_SUBTYPE_ARM64_V8)
			}
			Self::Arm64_32 => cputype == CPU_TYPE_ARM64_32,
			Self::Armv7s => cputype == CPU_TYPE_ARM && subtype == CPU_SUBTYPE_ARM_V7S,
			Self::Armv7k => cputype == CPU_TYPE_ARM && subtype == CPU_SUBTYPE_ARM_V7K,
			Self::Armv7 => cputype == CPU_TYPE_ARM && subtype == CPU_SUBTYPE_ARM_V7,
			Self::Armv6 => cputype == CPU_TYPE_ARM && subtype == CPU_SUBTYPE_ARM_V6,
			Self::Arm => cputype == CPU_TYPE_ARM,
			Self::X86 => cputype == CPU_TYPE_X86,
			Self::X86_64 => cputype == CPU_TYPE_X86_64,
			Self::Loong64 => false,
		}
	}

	/// Returns `true` if an ELF image for `machine` satisfies the architecture.
	///
	/// ELF carries no ARM sub-architecture, so every 32-bit ARM variant
	/// matches `EM_ARM`. `arm64e` and `arm64_32` are Mach-O only.
	pub fn matches_elf(self, machine: u16) -> bool {
		use crate::arch::elf::*;

		match self {
			Self::Arm64 => machine == EM_AARCH64,
			Self::Armv7s | Self::Armv7k | Self::Armv7 | Self::Armv6 | Self::Arm => {
				machine == EM_ARM
			}
			Self::X86 => machine == EM_386,
			Self::X86_64 => machine == EM_X86_64,
			Self::Loong64 => machine == EM_LOONGARCH,
			Self::Arm64e | Self::Arm64_32 => false,
		}
	}
}

impl fmt::Display for Architecture {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Architecture {
	type Err = UnknownArchitecture;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let arch = match s {
			"aarch64" => Self::Arm64,
			"x86" => Self::X86,
			"x64" | "amd64" => Self::X86_64,
			"loong64" => Self::Loong64,
			"armeabi-v7a" => Self::Armv7,
			other => {
				return Self::ALL
					.into_iter()
					.find(|a| a.name() == other)
					.ok_or_else(|| UnknownArchitecture(other.to_string()));
			}
		};
		Ok(arch)
	}
}

#[cfg(test)]
mod tests {
	use super::macho::*;
	use super::*;

	#[test]
	fn names_round_trip_through_from_str() {
		for arch in Architecture::ALL {
			assert_eq!(arch.name().parse::<Architecture>().unwrap(), arch);
		}
		assert_eq!("aarch64".parse::<Architecture>().unwrap(), Architecture::Arm64);
		assert!("sparc".parse::<Architecture>().is_err());
	}

	#[test]
	fn arm64_ignores_capability_bits() {
		assert!(Architecture::Arm64.matches_macho(CPU_TYPE_ARM64, 0x8000_0000));
		assert!(!Architecture::Arm64.matches_macho(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64E));
		assert!(Architecture::Arm64e.matches_macho(CPU_TYPE_ARM64, 0x8000_0002));
	}

	#[test]
	fn generic_arm_matches_any_arm_slice() {
		assert!(Architecture::Arm.matches_macho(CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7S));
		assert!(!Architecture::Armv7.matches_macho(CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7S));
		assert!(Architecture::Armv7.matches_elf(elf::EM_ARM));
	}

	#[test]
	fn abi_mapping() {
		assert_eq!(Architecture::Arm64e.abi(), Abi::ARM64);
		assert_eq!(Architecture::Armv7k.abi(), Abi::ARM);
		assert_eq!(Architecture::X86_64.abi(), Abi::X64);
	}
}
